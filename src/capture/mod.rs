pub mod decoder;
pub mod frame;
pub mod source;

pub use decoder::{BasicDecoder, ImageDecoder};
pub use frame::{CaptureDescriptor, Frame, SubImage};
pub use source::{BufferPool, FrameSource, StreamSpec, SyntheticSource};
