//! Process-wide display multiplexer.
//!
//! Many processors, across potentially many dispatchers, render into one
//! [`DisplayHub`]. The hub owns a single background thread and funnels every
//! [`DisplaySink`] call through it, so a platform toolkit that demands
//! thread affinity only ever sees one thread. The hub is an ordinary value
//! the application constructs at startup and injects wherever it is needed;
//! there is no hidden global.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::display::sink::DisplaySink;
use crate::image::Image;

const PUMP_INTERVAL: Duration = Duration::from_millis(1);

struct HubShared {
    windows: Mutex<BTreeMap<String, Image>>,
    /// Windows whose destruction is deferred to the hub thread.
    closing: Mutex<BTreeSet<String>>,
    /// Last key observed by the sink, 0 when none is pending.
    pending_key: AtomicI32,
    running: AtomicBool,
}

pub struct DisplayHub {
    shared: Arc<HubShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DisplayHub {
    /// Start the hub over the given sink. The background thread runs until
    /// the hub is dropped.
    pub fn new(mut sink: Box<dyn DisplaySink>) -> Self {
        let shared = Arc::new(HubShared {
            windows: Mutex::new(BTreeMap::new()),
            closing: Mutex::new(BTreeSet::new()),
            pending_key: AtomicI32::new(0),
            running: AtomicBool::new(true),
        });

        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("display-hub".into())
            .spawn(move || {
                while thread_shared.running.load(Ordering::Acquire) {
                    {
                        let windows = thread_shared.windows.lock().unwrap();
                        for (name, image) in windows.iter() {
                            if image.is_empty() {
                                continue;
                            }
                            if let Err(e) = sink.present(name, image) {
                                tracing::warn!(window = %name, error = %e, "present failed");
                            }
                        }
                    }

                    if let Some(key) = sink.poll_key() {
                        if key > 0 {
                            thread_shared.pending_key.store(key, Ordering::Release);
                        }
                    }

                    let closing: Vec<String> = {
                        let mut set = thread_shared.closing.lock().unwrap();
                        std::mem::take(&mut *set).into_iter().collect()
                    };
                    for name in closing {
                        sink.close(&name);
                    }

                    thread::sleep(PUMP_INTERVAL);
                }
            })
            .expect("spawn display hub thread");

        Self {
            shared,
            thread: Mutex::new(Some(thread)),
        }
    }

    /// Replace the window's latest image (deep copy) and hand back any
    /// pending key code, clearing it.
    pub fn update_window(&self, name: &str, image: &Image) -> Option<i32> {
        {
            let mut windows = self.shared.windows.lock().unwrap();
            windows.insert(name.to_string(), image.clone());
        }
        match self.shared.pending_key.swap(0, Ordering::AcqRel) {
            0 => None,
            key => Some(key),
        }
    }

    /// Detach a window. The sink's own teardown happens on the hub thread.
    pub fn close_window(&self, name: &str) {
        let removed = self.shared.windows.lock().unwrap().remove(name).is_some();
        if removed {
            self.shared.closing.lock().unwrap().insert(name.to_string());
        }
    }

    pub fn window_count(&self) -> usize {
        self.shared.windows.lock().unwrap().len()
    }
}

impl Drop for DisplayHub {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::sink::TestSink;
    use crate::image::{ComponentId, PixelFormat};

    fn mono_image() -> Image {
        Image::from_vec(vec![1, 2, 3, 4], 2, 2, ComponentId::IrLeft, PixelFormat::Mono8)
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..500 {
            if done() {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("hub thread made no progress");
    }

    #[test]
    fn updated_windows_are_presented_on_the_hub_thread() {
        let sink = TestSink::new();
        let hub = DisplayHub::new(Box::new(sink.clone()));
        hub.update_window("depth", &mono_image());
        wait_until(|| sink.presents_for("depth") > 0);
        assert_eq!(hub.window_count(), 1);
    }

    #[test]
    fn scripted_key_is_returned_once_then_cleared() {
        let sink = TestSink::new();
        let hub = DisplayHub::new(Box::new(sink.clone()));
        hub.update_window("color", &mono_image());
        sink.script_key(113);
        wait_until(|| hub.update_window("color", &mono_image()) == Some(113));
        assert_eq!(hub.update_window("color", &mono_image()), None);
    }

    #[test]
    fn close_is_deferred_to_the_hub_thread() {
        let sink = TestSink::new();
        let hub = DisplayHub::new(Box::new(sink.clone()));
        hub.update_window("Left-IR", &mono_image());
        hub.close_window("Left-IR");
        wait_until(|| sink.closed_windows() == vec!["Left-IR".to_string()]);
        assert_eq!(hub.window_count(), 0);
    }

    #[test]
    fn closing_an_unknown_window_is_a_no_op() {
        let sink = TestSink::new();
        let hub = DisplayHub::new(Box::new(sink.clone()));
        hub.close_window("never-opened");
        thread::sleep(Duration::from_millis(10));
        assert!(sink.closed_windows().is_empty());
    }
}
