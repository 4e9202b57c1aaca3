pub mod capture;
pub mod display;
pub mod error;
pub mod image;
pub mod pipeline;
pub mod storage;
pub mod utils;

use std::path::Path;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

pub use capture::frame::{CaptureDescriptor, Frame, SubImage};
pub use error::{Error, Result};
pub use image::{ComponentId, Image, ImageStatus, PixelFormat};
pub use pipeline::{ErrorPolicy, FrameDispatcher, ImageProcessor, ParseStage};

/// Global configuration that can be atomically swapped at runtime.
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bounded frame queue depth; the oldest frame is dropped on overflow.
    pub queue_capacity: usize,
    /// Worker sleep between polls of an empty queue.
    pub idle_poll_ms: u64,
    pub error_policy: ErrorPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub width: u32,
    pub height: u32,
    /// Stop after this many frames; `None` streams until 'q'.
    pub frame_limit: Option<u64>,
    /// Run the left-IR stream through the ToF phase-to-intensity stage.
    pub tof_phase_ir: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            source: SourceConfig::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: pipeline::DEFAULT_QUEUE_CAPACITY,
            idle_poll_ms: 1,
            error_policy: ErrorPolicy::Log,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            frame_limit: None,
            tof_phase_ir: false,
        }
    }
}

impl Config {
    /// Layer an optional TOML file under `FATHOM_`-prefixed environment
    /// variables (`FATHOM_PIPELINE__QUEUE_CAPACITY=8`).
    pub fn load(path: Option<&Path>) -> std::result::Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder
            .add_source(config::Environment::with_prefix("FATHOM").separator("__"))
            .build()?
            .try_deserialize()
    }
}
