//! Per-stream image processing stages.
//!
//! One [`ImageProcessor`] serves one physical component. It holds the latest
//! image it derived (overwritten on every parse, never accumulated) and
//! publishes it to the display hub on flush. The parse behavior is a closed
//! set of variants plus one boxed extension point, selected by
//! [`ParseStage`], instead of an inheritance chain.

use std::sync::Arc;

use crate::capture::decoder::{BasicDecoder, ImageDecoder};
use crate::display::hub::DisplayHub;
use crate::error::{Error, Result};
use crate::image::{Image, PixelFormat};
use crate::pipeline::transform::{
    phase_intensity, CalibrationData, DepthColorizer, PinholeUndistorter, RampColorizer,
    Undistorter,
};

/// Custom per-device parse step. The decoder argument is the processor's
/// own decode collaborator, for stages that want to fall back on it.
pub trait ImageStage: Send {
    fn apply(&mut self, image: &Image, decoder: Option<&dyn ImageDecoder>) -> Result<Image>;
}

/// How a processor turns an incoming component view into its current image.
pub enum ParseStage {
    /// Depth pass-through, ABC16 depth-plane extraction, decode otherwise.
    Standard,
    /// Four-plane ToF quadrature to intensity; falls back to `Standard` for
    /// any other format.
    PhaseIntensity,
    Custom(Box<dyn ImageStage>),
}

/// Pipeline stage for one stream: parse, optional depth render and
/// undistortion, flush to a display window.
pub struct ImageProcessor {
    window: String,
    hub: Arc<DisplayHub>,
    stage: ParseStage,
    decoder: Option<Box<dyn ImageDecoder>>,
    colorizer: Box<dyn DepthColorizer>,
    undistorter: Box<dyn Undistorter>,
    calibration: Option<CalibrationData>,
    current: Option<Image>,
}

impl ImageProcessor {
    pub fn new(window: impl Into<String>, hub: Arc<DisplayHub>) -> Self {
        Self {
            window: window.into(),
            hub,
            stage: ParseStage::Standard,
            decoder: Some(Box::new(BasicDecoder)),
            colorizer: Box::new(RampColorizer::default()),
            undistorter: Box::new(PinholeUndistorter),
            calibration: None,
            current: None,
        }
    }

    pub fn with_stage(mut self, stage: ParseStage) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_calibration(mut self, calibration: CalibrationData) -> Self {
        self.calibration = Some(calibration);
        self
    }

    pub fn with_decoder(mut self, decoder: Box<dyn ImageDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Drop the decode collaborator; raw sensor formats then fail parse
    /// with [`Error::MissingDecoder`].
    pub fn without_decoder(mut self) -> Self {
        self.decoder = None;
        self
    }

    pub fn with_colorizer(mut self, colorizer: Box<dyn DepthColorizer>) -> Self {
        self.colorizer = colorizer;
        self
    }

    pub fn with_undistorter(mut self, undistorter: Box<dyn Undistorter>) -> Self {
        self.undistorter = undistorter;
        self
    }

    pub fn window(&self) -> &str {
        &self.window
    }

    /// Latest derived image, if any parse succeeded since construction.
    pub fn image(&self) -> Option<&Image> {
        self.current.as_ref()
    }

    /// Derive and store this processor's current image from a component
    /// view. The stored image always owns its pixels, so it outlives the
    /// frame that carried the view.
    pub fn parse(&mut self, image: &Image) -> Result<()> {
        if image.is_empty() {
            return Err(Error::EmptyImage);
        }
        let derived = match &mut self.stage {
            ParseStage::Standard => standard_parse(image, self.decoder.as_deref())?,
            ParseStage::PhaseIntensity => {
                if image.format() == PixelFormat::TofIrFourGroupMono16 {
                    phase_intensity(image)?
                } else {
                    standard_parse(image, self.decoder.as_deref())?
                }
            }
            ParseStage::Custom(stage) => stage.apply(image, self.decoder.as_deref())?,
        };
        self.current = Some(derived);
        Ok(())
    }

    /// Map the current canonical depth image to false color, replacing it.
    pub fn render_depth(&mut self) -> Result<()> {
        let current = self.current.as_ref().ok_or(Error::EmptyImage)?;
        if current.format() != PixelFormat::Coord3dC16 {
            return Err(Error::UnsupportedFormat(current.format()));
        }
        self.current = Some(self.colorizer.colorize(current)?);
        Ok(())
    }

    /// Undistort the current image through the calibration supplied at
    /// construction. The current image is only replaced on success.
    pub fn undistort(&mut self) -> Result<()> {
        let calibration = self.calibration.as_ref().ok_or(Error::MissingCalibration)?;
        let current = self.current.as_ref().ok_or(Error::EmptyImage)?;
        self.current = Some(self.undistorter.undistort(calibration, current)?);
        Ok(())
    }

    /// Publish the current image to the display hub and report any pending
    /// key code. Depth images are rendered to false color on the way out.
    /// No current image, or a format the display cannot take, is not an
    /// error: the flush is simply skipped.
    pub fn flush(&mut self) -> Result<Option<i32>> {
        let format = match self.current.as_ref() {
            Some(image) => image.format(),
            None => return Ok(None),
        };
        if format == PixelFormat::Coord3dC16 {
            self.render_depth()?;
        }
        let Some(image) = self.current.as_ref() else {
            return Ok(None);
        };
        match image.format() {
            PixelFormat::Mono8
            | PixelFormat::Mono16
            | PixelFormat::Bgr8
            | PixelFormat::TofIrFourGroupMono16 => {
                Ok(self.hub.update_window(&self.window, image))
            }
            other => {
                tracing::warn!(window = %self.window, format = ?other,
                    "unknown image encoding format, not presenting");
                Ok(None)
            }
        }
    }

    /// Detach this processor's window from the hub.
    pub fn clear(&mut self) {
        self.hub.close_window(&self.window);
    }
}

impl Drop for ImageProcessor {
    fn drop(&mut self) {
        self.clear();
    }
}

fn standard_parse(image: &Image, decoder: Option<&dyn ImageDecoder>) -> Result<Image> {
    match image.format() {
        // Already canonical depth.
        PixelFormat::Coord3dC16 => Ok(image.clone()),
        // Keep only the third interleaved channel: the depth plane.
        PixelFormat::Coord3dAbc16 => {
            let samples = image.as_u16_samples()?;
            let pixels = image.width() as usize * image.height() as usize;
            if samples.len() != pixels * 3 {
                return Err(Error::Geometry {
                    width: image.width(),
                    height: image.height(),
                    size: image.size(),
                    format: image.format(),
                });
            }
            let depth: Vec<u8> = samples
                .chunks_exact(3)
                .flat_map(|xyz| xyz[2].to_le_bytes())
                .collect();
            Ok(Image::derived(
                image,
                depth,
                image.width(),
                image.height(),
                PixelFormat::Coord3dC16,
            ))
        }
        format => match decoder {
            Some(decoder) => decoder.decode(image),
            None => Err(Error::MissingDecoder(format)),
        },
    }
}
