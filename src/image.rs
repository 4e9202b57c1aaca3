//! Typed pixel buffers with owned-or-shared backing storage.
//!
//! An [`Image`] either owns its pixel data outright or holds a zero-copy
//! slice of a frame arena ([`bytes::Bytes`]). Cloning always materializes an
//! independent owned copy, so a clone survives the arena that backed its
//! source. All 16-bit sample data is little-endian.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Wire-level pixel formats reported by the device, plus the canonical
/// formats the pipeline derives ([`PixelFormat::Coord3dC16`] for depth,
/// `Mono8`/`Mono16`/`Bgr8` for display).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Mono8,
    Mono10,
    Mono12,
    Mono16,
    BayerGbrg8,
    BayerBggr8,
    BayerGrbg8,
    BayerRggb8,
    /// YUV 4:2:2, YUYV byte order.
    Yuv422,
    /// YUV 4:2:2, UYVY byte order.
    Yuv422Uyvy,
    Rgb8,
    Bgr8,
    Jpeg,
    /// Canonical depth: one 16-bit coordinate value per pixel.
    Coord3dC16,
    /// Interleaved XYZ triplets, 16 bits per channel.
    Coord3dAbc16,
    /// Interleaved XYZ triplets, 32-bit float per channel.
    Coord3dAbc32f,
    /// Four phase-shifted ToF measurement planes stacked in one buffer,
    /// 16 bits per sample. Plane order: phase180, phase90, phase0, phase270.
    TofIrFourGroupMono16,
}

impl PixelFormat {
    /// Bytes of buffer per reported pixel, `None` for opaque (compressed)
    /// formats whose size is not a function of geometry.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Mono8
            | PixelFormat::BayerGbrg8
            | PixelFormat::BayerBggr8
            | PixelFormat::BayerGrbg8
            | PixelFormat::BayerRggb8 => Some(1),
            PixelFormat::Mono10
            | PixelFormat::Mono12
            | PixelFormat::Mono16
            | PixelFormat::Yuv422
            | PixelFormat::Yuv422Uyvy
            | PixelFormat::Coord3dC16 => Some(2),
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => Some(3),
            PixelFormat::Coord3dAbc16 => Some(6),
            PixelFormat::TofIrFourGroupMono16 => Some(8),
            PixelFormat::Coord3dAbc32f => Some(12),
            PixelFormat::Jpeg => None,
        }
    }

    pub fn is_opaque(self) -> bool {
        self.bytes_per_pixel().is_none()
    }
}

/// One physical sensing stream of the capture device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ComponentId {
    Depth,
    IrLeft,
    IrRight,
    Color,
}

impl ComponentId {
    pub const ALL: [ComponentId; 4] = [
        ComponentId::Depth,
        ComponentId::IrLeft,
        ComponentId::IrRight,
        ComponentId::Color,
    ];
}

/// Per-image capture status reported by the device. Sub-images that did not
/// capture cleanly carry the raw device code and are dropped at the frame
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStatus {
    Ok,
    Failed(i32),
}

impl ImageStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, ImageStatus::Ok)
    }
}

#[derive(Debug)]
enum PixelBuffer {
    Owned(Vec<u8>),
    Shared(Bytes),
}

impl PixelBuffer {
    fn as_slice(&self) -> &[u8] {
        match self {
            PixelBuffer::Owned(data) => data,
            PixelBuffer::Shared(data) => data,
        }
    }
}

/// A rectangular pixel buffer plus format metadata.
#[derive(Debug)]
pub struct Image {
    buffer: PixelBuffer,
    width: u32,
    height: u32,
    format: PixelFormat,
    component: ComponentId,
    status: ImageStatus,
    /// Device capture timestamp, microseconds.
    timestamp: u64,
    /// Frame sequence index assigned by the device.
    sequence: u64,
}

impl Image {
    /// Wrap a shared slice of a frame arena. No allocation; the arena stays
    /// alive as long as this view (or any clone of the underlying `Bytes`).
    #[allow(clippy::too_many_arguments)]
    pub fn view(
        data: Bytes,
        width: u32,
        height: u32,
        component: ComponentId,
        format: PixelFormat,
        status: ImageStatus,
        timestamp: u64,
        sequence: u64,
    ) -> Self {
        Self {
            buffer: PixelBuffer::Shared(data),
            width,
            height,
            format,
            component,
            status,
            timestamp,
            sequence,
        }
    }

    /// Allocate an owned, zero-initialized buffer of exactly `size` bytes.
    /// The caller guarantees `size` matches the geometry, or accepts an
    /// opaque/compressed size.
    pub fn new_owned(
        width: u32,
        height: u32,
        component: ComponentId,
        format: PixelFormat,
        size: usize,
    ) -> Self {
        Self {
            buffer: PixelBuffer::Owned(vec![0; size]),
            width,
            height,
            format,
            component,
            status: ImageStatus::Ok,
            timestamp: 0,
            sequence: 0,
        }
    }

    /// Adopt `data` as an owned buffer.
    pub fn from_vec(
        data: Vec<u8>,
        width: u32,
        height: u32,
        component: ComponentId,
        format: PixelFormat,
    ) -> Self {
        Self {
            buffer: PixelBuffer::Owned(data),
            width,
            height,
            format,
            component,
            status: ImageStatus::Ok,
            timestamp: 0,
            sequence: 0,
        }
    }

    /// An owned image derived from `src`: new pixels, geometry and format,
    /// same component, status, timestamp and sequence.
    pub fn derived(
        src: &Image,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Self {
        Self {
            buffer: PixelBuffer::Owned(data),
            width,
            height,
            format,
            component: src.component,
            status: src.status,
            timestamp: src.timestamp,
            sequence: src.sequence,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Total buffer size in bytes.
    pub fn size(&self) -> usize {
        self.buffer.as_slice().len()
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn component(&self) -> ComponentId {
        self.component
    }

    pub fn status(&self) -> ImageStatus {
        self.status
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// True when this image owns its pixel data (as opposed to sharing a
    /// frame arena).
    pub fn is_owned(&self) -> bool {
        matches!(self.buffer, PixelBuffer::Owned(_))
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.as_slice().is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Samples as little-endian u16 values. Fails for buffers of odd length.
    pub fn as_u16_samples(&self) -> Result<Vec<u16>> {
        let bytes = self.as_bytes();
        if bytes.len() % 2 != 0 {
            return Err(Error::Geometry {
                width: self.width,
                height: self.height,
                size: bytes.len(),
                format: self.format,
            });
        }
        Ok(bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect())
    }

    /// Resample in place. Supported for Rgb8/Bgr8/Mono8/Mono16/Coord3dC16;
    /// coordinate data uses nearest-neighbor so depth values never blend,
    /// everything else a triangle filter. Any other format fails and leaves
    /// the image untouched.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        use image::imageops::{self, FilterType};
        use image::{ImageBuffer, Luma, Rgb};

        if self.is_empty() {
            return Err(Error::EmptyImage);
        }

        let geometry = |format| Error::Geometry {
            width: self.width,
            height: self.height,
            size: self.size(),
            format,
        };

        let resized: Vec<u8> = match self.format {
            PixelFormat::Mono8 => {
                let src: ImageBuffer<Luma<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(self.width, self.height, self.as_bytes().to_vec())
                        .ok_or_else(|| geometry(self.format))?;
                imageops::resize(&src, width, height, FilterType::Triangle).into_raw()
            }
            // Resampling is per-channel, so BGR can ride the RGB pixel type.
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => {
                let src: ImageBuffer<Rgb<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(self.width, self.height, self.as_bytes().to_vec())
                        .ok_or_else(|| geometry(self.format))?;
                imageops::resize(&src, width, height, FilterType::Triangle).into_raw()
            }
            PixelFormat::Mono16 | PixelFormat::Coord3dC16 => {
                let samples = self.as_u16_samples()?;
                let src: ImageBuffer<Luma<u16>, Vec<u16>> =
                    ImageBuffer::from_raw(self.width, self.height, samples)
                        .ok_or_else(|| geometry(self.format))?;
                let filter = if self.format == PixelFormat::Coord3dC16 {
                    FilterType::Nearest
                } else {
                    FilterType::Triangle
                };
                imageops::resize(&src, width, height, filter)
                    .into_raw()
                    .iter()
                    .flat_map(|v| v.to_le_bytes())
                    .collect()
            }
            other => return Err(Error::UnsupportedFormat(other)),
        };

        self.width = width;
        self.height = height;
        self.buffer = PixelBuffer::Owned(resized);
        Ok(())
    }
}

impl Clone for Image {
    /// Always a deep copy: the clone owns a fresh buffer regardless of
    /// whether the source shared a frame arena.
    fn clone(&self) -> Self {
        Self {
            buffer: PixelBuffer::Owned(self.as_bytes().to_vec()),
            width: self.width,
            height: self.height,
            format: self.format,
            component: self.component,
            status: self.status,
            timestamp: self.timestamp,
            sequence: self.sequence,
        }
    }
}
