use thiserror::Error;

use crate::image::{ComponentId, PixelFormat};

/// Failures surfaced by the frame pipeline.
///
/// Per-component failures are recoverable: the dispatcher skips the failing
/// component for the cycle and keeps running. Nothing here ever propagates
/// back to the acquisition side.
#[derive(Error, Debug)]
pub enum Error {
    #[error("image has no pixel data")]
    EmptyImage,

    #[error("unsupported pixel format {0:?}")]
    UnsupportedFormat(PixelFormat),

    #[error("no decoder registered, cannot convert {0:?}")]
    MissingDecoder(PixelFormat),

    #[error("calibration data is absent")]
    MissingCalibration,

    #[error(
        "sub-image {component:?} out of bounds: offset {offset} + size {size} > payload {payload}"
    )]
    BadDescriptor {
        component: ComponentId,
        offset: usize,
        size: usize,
        payload: usize,
    },

    #[error("buffer size {size} does not match {width}x{height} {format:?}")]
    Geometry {
        width: u32,
        height: u32,
        size: usize,
        format: PixelFormat,
    },

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("depth colorization failed: {0}")]
    Colorize(String),

    #[error("undistortion failed: {0}")]
    Undistort(String),

    #[error("display sink failed: {0}")]
    Sink(String),
}

pub type Result<T> = std::result::Result<T, Error>;
