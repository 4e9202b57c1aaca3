pub mod hub;
pub mod sink;

pub use hub::DisplayHub;
pub use sink::{DisplaySink, LogSink, NullSink, PresentRecord, TestSink};
