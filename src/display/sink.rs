//! Presentation seam for the display hub.
//!
//! Rendering is a non-goal of the pipeline: the hub forwards every window
//! update to one injected [`DisplaySink`], and the process decides whether
//! that is a real window system, a log line, or a test recorder.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::image::{Image, PixelFormat};

/// Platform presentation collaborator. All calls arrive on the hub's one
/// background thread, never concurrently.
pub trait DisplaySink: Send {
    fn present(&mut self, name: &str, image: &Image) -> Result<()>;

    /// Pending keyboard input, if the sink observed any since the last poll.
    fn poll_key(&mut self) -> Option<i32> {
        None
    }

    /// The named window is gone; release whatever backs it.
    fn close(&mut self, _name: &str) {}
}

/// Discards everything. For headless deployments.
#[derive(Debug, Default)]
pub struct NullSink;

impl DisplaySink for NullSink {
    fn present(&mut self, _name: &str, _image: &Image) -> Result<()> {
        Ok(())
    }
}

/// Logs one debug line per present. The demo binary's default.
#[derive(Debug, Default)]
pub struct LogSink;

impl DisplaySink for LogSink {
    fn present(&mut self, name: &str, image: &Image) -> Result<()> {
        tracing::debug!(
            window = name,
            width = image.width(),
            height = image.height(),
            format = ?image.format(),
            "present"
        );
        Ok(())
    }

    fn close(&mut self, name: &str) {
        tracing::debug!(window = name, "window closed");
    }
}

/// One recorded present call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentRecord {
    pub window: String,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Default)]
struct TestSinkState {
    presents: Vec<PresentRecord>,
    closed: Vec<String>,
    keys: VecDeque<i32>,
}

/// Records presents and replays scripted key codes. Cloning shares the
/// state, so tests keep one handle while the hub owns the other.
#[derive(Debug, Clone, Default)]
pub struct TestSink {
    state: Arc<Mutex<TestSinkState>>,
}

impl TestSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a key code for the next `poll_key`.
    pub fn script_key(&self, code: i32) {
        self.state.lock().unwrap().keys.push_back(code);
    }

    pub fn presents(&self) -> Vec<PresentRecord> {
        self.state.lock().unwrap().presents.clone()
    }

    pub fn closed_windows(&self) -> Vec<String> {
        self.state.lock().unwrap().closed.clone()
    }

    /// Presents recorded for one window.
    pub fn presents_for(&self, window: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .presents
            .iter()
            .filter(|p| p.window == window)
            .count()
    }
}

impl DisplaySink for TestSink {
    fn present(&mut self, name: &str, image: &Image) -> Result<()> {
        self.state.lock().unwrap().presents.push(PresentRecord {
            window: name.to_string(),
            format: image.format(),
            width: image.width(),
            height: image.height(),
        });
        Ok(())
    }

    fn poll_key(&mut self) -> Option<i32> {
        self.state.lock().unwrap().keys.pop_front()
    }

    fn close(&mut self, name: &str) {
        self.state.lock().unwrap().closed.push(name.to_string());
    }
}
