pub mod dispatcher;
pub mod processor;
pub mod queue;
pub mod transform;

pub use dispatcher::{ErrorPolicy, FrameDispatcher, KeyEvent, ProcessingError};
pub use processor::{ImageProcessor, ImageStage, ParseStage};
pub use queue::{FrameQueue, QueueStats, DEFAULT_QUEUE_CAPACITY};
pub use transform::{
    phase_intensity, CalibrationData, DepthColorizer, PinholeUndistorter, RampColorizer,
    Undistorter,
};
