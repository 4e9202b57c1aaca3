//! Depth colorization, lens undistortion and the ToF quadrature kernel.
//!
//! Colorization and undistortion are collaborator seams like decoding:
//! processors hold trait objects and applications may substitute their own
//! implementations. The built-ins cover the common case without any
//! device SDK present.

use crate::error::{Error, Result};
use crate::image::{Image, PixelFormat};

/// Camera calibration as reported by the device: a 3x3 row-major intrinsic
/// matrix and Brown–Conrady distortion coefficients in k1,k2,p1,p2,k3 order
/// (missing trailing coefficients read as zero).
#[derive(Debug, Clone)]
pub struct CalibrationData {
    pub width: u32,
    pub height: u32,
    pub intrinsics: [f32; 9],
    pub distortion: Vec<f32>,
}

/// Maps a canonical depth image to a false-color presentation.
pub trait DepthColorizer: Send {
    fn colorize(&self, image: &Image) -> Result<Image>;
}

/// Built-in colorizer: clamps depth (after scale-unit conversion) into a
/// millimeter range and maps it onto a blue-to-red ramp. Zero depth renders
/// black, matching the convention that zero means "no measurement".
#[derive(Debug, Clone)]
pub struct RampColorizer {
    pub min_mm: f32,
    pub max_mm: f32,
    /// Device depth scale: raw sample * scale_unit = millimeters.
    pub scale_unit: f32,
}

impl Default for RampColorizer {
    fn default() -> Self {
        Self {
            min_mm: 300.0,
            max_mm: 3000.0,
            scale_unit: 1.0,
        }
    }
}

impl DepthColorizer for RampColorizer {
    fn colorize(&self, image: &Image) -> Result<Image> {
        if image.format() != PixelFormat::Coord3dC16 {
            return Err(Error::UnsupportedFormat(image.format()));
        }
        let samples = image.as_u16_samples()?;
        let span = (self.max_mm - self.min_mm).max(1.0);
        let mut bgr = Vec::with_capacity(samples.len() * 3);
        for sample in samples {
            if sample == 0 {
                bgr.extend_from_slice(&[0, 0, 0]);
                continue;
            }
            let mm = sample as f32 * self.scale_unit;
            let t = ((mm - self.min_mm) / span).clamp(0.0, 1.0);
            // Near = red, far = blue, green peaking in the middle.
            let r = (255.0 * (1.0 - t)) as u8;
            let g = (255.0 * (1.0 - (2.0 * t - 1.0).abs())) as u8;
            let b = (255.0 * t) as u8;
            bgr.extend_from_slice(&[b, g, r]);
        }
        Ok(Image::derived(
            image,
            bgr,
            image.width(),
            image.height(),
            PixelFormat::Bgr8,
        ))
    }
}

/// Applies a lens-undistortion transform.
pub trait Undistorter: Send {
    fn undistort(&self, calib: &CalibrationData, image: &Image) -> Result<Image>;
}

/// Built-in pinhole undistorter: for every output pixel, projects through
/// the Brown–Conrady model and samples the distorted source with
/// nearest-neighbor. Out-of-frame lookups write zero.
#[derive(Debug, Default)]
pub struct PinholeUndistorter;

impl Undistorter for PinholeUndistorter {
    fn undistort(&self, calib: &CalibrationData, image: &Image) -> Result<Image> {
        let bpp = match image.format() {
            PixelFormat::Mono8 => 1,
            PixelFormat::Mono16 | PixelFormat::Coord3dC16 => 2,
            PixelFormat::Bgr8 => 3,
            other => return Err(Error::UnsupportedFormat(other)),
        };
        let (width, height) = (image.width() as usize, image.height() as usize);
        if image.size() != width * height * bpp {
            return Err(Error::Geometry {
                width: image.width(),
                height: image.height(),
                size: image.size(),
                format: image.format(),
            });
        }

        let [fx, _, cx, _, fy, cy, ..] = calib.intrinsics;
        if fx == 0.0 || fy == 0.0 {
            return Err(Error::Undistort("intrinsic focal length is zero".into()));
        }
        let coeff = |i: usize| calib.distortion.get(i).copied().unwrap_or(0.0);
        let (k1, k2, p1, p2, k3) = (coeff(0), coeff(1), coeff(2), coeff(3), coeff(4));

        let src = image.as_bytes();
        let mut dst = vec![0u8; src.len()];
        for v in 0..height {
            for u in 0..width {
                let x = (u as f32 - cx) / fx;
                let y = (v as f32 - cy) / fy;
                let r2 = x * x + y * y;
                let radial = 1.0 + r2 * (k1 + r2 * (k2 + r2 * k3));
                let xd = x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
                let yd = y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
                let su = (fx * xd + cx).round() as i64;
                let sv = (fy * yd + cy).round() as i64;
                if su < 0 || sv < 0 || su >= width as i64 || sv >= height as i64 {
                    continue;
                }
                let from = (sv as usize * width + su as usize) * bpp;
                let to = (v * width + u) * bpp;
                dst[to..to + bpp].copy_from_slice(&src[from..from + bpp]);
            }
        }
        Ok(Image::derived(
            image,
            dst,
            image.width(),
            image.height(),
            image.format(),
        ))
    }
}

/// Derive an intensity image from four phase-shifted ToF measurement planes.
///
/// The buffer stacks four `width * height` 16-bit planes in device order
/// [phase180 | phase90 | phase0 | phase270]. Per pixel:
/// `intensity = 2 * sqrt((phase90 - phase270)^2 + (phase0 - phase180)^2)`,
/// saturated to 16 bits. Pixels are independent of their neighbors.
pub fn phase_intensity(image: &Image) -> Result<Image> {
    if image.format() != PixelFormat::TofIrFourGroupMono16 {
        return Err(Error::UnsupportedFormat(image.format()));
    }
    let pixels = image.width() as usize * image.height() as usize;
    let samples = image.as_u16_samples()?;
    if samples.len() != pixels * 4 {
        return Err(Error::Geometry {
            width: image.width(),
            height: image.height(),
            size: image.size(),
            format: image.format(),
        });
    }

    let phase180 = &samples[..pixels];
    let phase90 = &samples[pixels..2 * pixels];
    let phase0 = &samples[2 * pixels..3 * pixels];
    let phase270 = &samples[3 * pixels..];

    let mut out = Vec::with_capacity(pixels * 2);
    for i in 0..pixels {
        let deltsin = phase90[i] as i64 - phase270[i] as i64;
        let deltcos = phase0[i] as i64 - phase180[i] as i64;
        let modulus = ((deltsin * deltsin + deltcos * deltcos) as f64).sqrt() as i64 * 2;
        out.extend_from_slice(&(modulus.min(u16::MAX as i64) as u16).to_le_bytes());
    }
    Ok(Image::derived(
        image,
        out,
        image.width(),
        image.height(),
        PixelFormat::Mono16,
    ))
}
