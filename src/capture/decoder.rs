//! Pixel-format decoding into displayable images.
//!
//! Decoding is a collaborator seam: processors hold a `Box<dyn ImageDecoder>`
//! and applications may plug in device-specific converters. [`BasicDecoder`]
//! covers the common wire formats and always produces one of `Mono8`,
//! `Mono16` or `Bgr8`.

use jpeg_decoder::Decoder;

use crate::error::{Error, Result};
use crate::image::{Image, PixelFormat};

/// Converts a wire-format image into a displayable one.
pub trait ImageDecoder: Send {
    fn decode(&self, image: &Image) -> Result<Image>;
}

/// Built-in decoder: JPEG, YUV 4:2:2 (both byte orders), RGB swap and
/// mono bit-depth widening. Bayer and float coordinate formats are out of
/// scope and fail with [`Error::UnsupportedFormat`].
#[derive(Debug, Default)]
pub struct BasicDecoder;

impl ImageDecoder for BasicDecoder {
    fn decode(&self, image: &Image) -> Result<Image> {
        if image.is_empty() {
            return Err(Error::EmptyImage);
        }
        match image.format() {
            PixelFormat::Jpeg => decode_jpeg(image),
            PixelFormat::Yuv422 => yuv422_to_bgr(image, ByteOrder::Yuyv),
            PixelFormat::Yuv422Uyvy => yuv422_to_bgr(image, ByteOrder::Uyvy),
            PixelFormat::Rgb8 => swap_rgb_bgr(image),
            PixelFormat::Mono10 => widen_mono(image, 6),
            PixelFormat::Mono12 => widen_mono(image, 4),
            // Already displayable; hand back an owned copy.
            PixelFormat::Mono8 | PixelFormat::Mono16 | PixelFormat::Bgr8 => Ok(Image::derived(
                image,
                image.as_bytes().to_vec(),
                image.width(),
                image.height(),
                image.format(),
            )),
            other => Err(Error::UnsupportedFormat(other)),
        }
    }
}

fn expect_size(image: &Image, bytes_per_pixel: usize) -> Result<()> {
    let expected = image.width() as usize * image.height() as usize * bytes_per_pixel;
    if image.size() != expected {
        return Err(Error::Geometry {
            width: image.width(),
            height: image.height(),
            size: image.size(),
            format: image.format(),
        });
    }
    Ok(())
}

fn decode_jpeg(image: &Image) -> Result<Image> {
    let mut decoder = Decoder::new(image.as_bytes());
    let pixels = decoder.decode().map_err(|e| Error::Decode(e.to_string()))?;
    let info = decoder
        .info()
        .ok_or_else(|| Error::Decode("jpeg stream carries no header info".into()))?;
    let (width, height) = (info.width as u32, info.height as u32);
    match info.pixel_format {
        jpeg_decoder::PixelFormat::L8 => {
            Ok(Image::derived(image, pixels, width, height, PixelFormat::Mono8))
        }
        jpeg_decoder::PixelFormat::RGB24 => {
            let mut bgr = pixels;
            for px in bgr.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            Ok(Image::derived(image, bgr, width, height, PixelFormat::Bgr8))
        }
        other => Err(Error::Decode(format!("unhandled jpeg pixel format {other:?}"))),
    }
}

enum ByteOrder {
    /// [Y0 U Y1 V]
    Yuyv,
    /// [U Y0 V Y1]
    Uyvy,
}

/// BT.601 limited-range YUV 4:2:2 to BGR.
fn yuv422_to_bgr(image: &Image, order: ByteOrder) -> Result<Image> {
    expect_size(image, 2)?;
    let src = image.as_bytes();
    let mut bgr = Vec::with_capacity(src.len() / 2 * 3);
    for quad in src.chunks_exact(4) {
        let (y0, u, y1, v) = match order {
            ByteOrder::Yuyv => (quad[0], quad[1], quad[2], quad[3]),
            ByteOrder::Uyvy => (quad[1], quad[0], quad[3], quad[2]),
        };
        for y in [y0, y1] {
            let c = y as i32 - 16;
            let d = u as i32 - 128;
            let e = v as i32 - 128;
            let r = (298 * c + 409 * e + 128) >> 8;
            let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
            let b = (298 * c + 516 * d + 128) >> 8;
            bgr.push(b.clamp(0, 255) as u8);
            bgr.push(g.clamp(0, 255) as u8);
            bgr.push(r.clamp(0, 255) as u8);
        }
    }
    Ok(Image::derived(image, bgr, image.width(), image.height(), PixelFormat::Bgr8))
}

fn swap_rgb_bgr(image: &Image) -> Result<Image> {
    expect_size(image, 3)?;
    let mut bgr = image.as_bytes().to_vec();
    for px in bgr.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
    Ok(Image::derived(image, bgr, image.width(), image.height(), PixelFormat::Bgr8))
}

/// MSB-align a 10/12-bit sample held in a 16-bit container.
fn widen_mono(image: &Image, shift: u32) -> Result<Image> {
    expect_size(image, 2)?;
    let widened: Vec<u8> = image
        .as_u16_samples()?
        .iter()
        .flat_map(|v| (v << shift).to_le_bytes())
        .collect();
    Ok(Image::derived(image, widened, image.width(), image.height(), PixelFormat::Mono16))
}
