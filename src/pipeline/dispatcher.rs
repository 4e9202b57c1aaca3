//! Frame fan-out: bounded queue plus a dedicated worker thread.
//!
//! The acquisition thread calls [`FrameDispatcher::update`] and returns
//! immediately; the worker pops frames in FIFO order, routes each component
//! view to its registered processor, flushes every processor (so stale
//! windows persist), and forwards key codes into a typed channel. A
//! dispatcher runs from construction until drop; there is no restart.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::capture::frame::Frame;
use crate::display::hub::DisplayHub;
use crate::error::Error;
use crate::image::{ComponentId, Image};
use crate::pipeline::processor::ImageProcessor;
use crate::pipeline::queue::{FrameQueue, QueueStats, DEFAULT_QUEUE_CAPACITY};

/// What the worker does with per-component processing failures. Neither
/// mode stops the worker or reaches the acquisition side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Log at warn level and move on.
    #[default]
    Log,
    /// Log, and also deliver on the channel from
    /// [`FrameDispatcher::processing_errors`].
    Surface,
}

/// Keyboard input observed by a display sink, forwarded off the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: i32,
}

/// A per-component failure the worker swallowed, surfaced on request.
#[derive(Debug)]
pub struct ProcessingError {
    pub component: ComponentId,
    pub sequence: u64,
    pub error: Error,
}

struct Shared {
    queue: FrameQueue,
    registry: Mutex<BTreeMap<ComponentId, ImageProcessor>>,
    stop: AtomicBool,
}

pub struct FrameDispatcher {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    key_rx: flume::Receiver<KeyEvent>,
    error_rx: flume::Receiver<ProcessingError>,
}

/// Parse order within one frame. Depth goes last, matching the device
/// convention that its window updates after the IR and color ones.
const PARSE_ORDER: [ComponentId; 4] = [
    ComponentId::IrLeft,
    ComponentId::IrRight,
    ComponentId::Color,
    ComponentId::Depth,
];

impl FrameDispatcher {
    /// Default dispatcher: capacity-4 queue, 1 ms idle poll, log-only error
    /// policy, one standard processor per component.
    pub fn new(hub: Arc<DisplayHub>) -> Self {
        Self::with_options(hub, DEFAULT_QUEUE_CAPACITY, Duration::from_millis(1), ErrorPolicy::Log)
    }

    pub fn with_options(
        hub: Arc<DisplayHub>,
        queue_capacity: usize,
        idle_poll: Duration,
        policy: ErrorPolicy,
    ) -> Self {
        let mut registry = BTreeMap::new();
        registry.insert(ComponentId::Depth, ImageProcessor::new("depth", Arc::clone(&hub)));
        registry.insert(ComponentId::IrLeft, ImageProcessor::new("Left-IR", Arc::clone(&hub)));
        registry.insert(ComponentId::IrRight, ImageProcessor::new("Right-IR", Arc::clone(&hub)));
        registry.insert(ComponentId::Color, ImageProcessor::new("color", hub));

        let shared = Arc::new(Shared {
            queue: FrameQueue::new(queue_capacity),
            registry: Mutex::new(registry),
            stop: AtomicBool::new(false),
        });

        let (key_tx, key_rx) = flume::unbounded();
        let (error_tx, error_rx) = flume::unbounded();

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("frame-dispatch".into())
            .spawn(move || worker_loop(worker_shared, key_tx, error_tx, idle_poll, policy))
            .expect("spawn dispatcher worker");

        Self {
            shared,
            worker: Some(worker),
            key_rx,
            error_rx,
        }
    }

    /// Replace the processor serving one component. Takes effect on the
    /// next frame the worker processes.
    pub fn set_processor(&self, component: ComponentId, processor: ImageProcessor) {
        self.shared
            .registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(component, processor);
    }

    /// Best-effort, non-blocking enqueue. An empty frame is a no-op; a full
    /// queue silently evicts the oldest entry. Never fails.
    pub fn update(&self, frame: Arc<Frame>) {
        if frame.is_empty() {
            return;
        }
        if let Some(evicted) = self.shared.queue.push(frame) {
            tracing::debug!(sequence = evicted.sequence(), "dropped oldest queued frame");
        }
    }

    /// Key codes observed by display sinks, in arrival order.
    pub fn key_events(&self) -> flume::Receiver<KeyEvent> {
        self.key_rx.clone()
    }

    /// Swallowed per-component failures. Only delivered under
    /// [`ErrorPolicy::Surface`].
    pub fn processing_errors(&self) -> flume::Receiver<ProcessingError> {
        self.error_rx.clone()
    }

    /// Deep copy of a processor's latest derived image.
    pub fn current_image(&self, component: ComponentId) -> Option<Image> {
        self.shared
            .registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&component)
            .and_then(|proc| proc.image().cloned())
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.shared.queue.stats()
    }
}

impl Drop for FrameDispatcher {
    /// Stop the worker and join it. Frames still queued are discarded
    /// without a final flush.
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    shared: Arc<Shared>,
    key_tx: flume::Sender<KeyEvent>,
    error_tx: flume::Sender<ProcessingError>,
    idle_poll: Duration,
    policy: ErrorPolicy,
) {
    while !shared.stop.load(Ordering::Acquire) {
        let Some(frame) = shared.queue.pop() else {
            thread::sleep(idle_poll);
            continue;
        };
        let cycle_start = Instant::now();

        let mut registry = shared.registry.lock().unwrap_or_else(|e| e.into_inner());
        for component in PARSE_ORDER {
            let Some(image) = frame.image(component) else {
                continue;
            };
            let Some(processor) = registry.get_mut(&component) else {
                continue;
            };
            if let Err(error) = processor.parse(image) {
                report(&error_tx, policy, component, frame.sequence(), error, "parse");
            }
        }

        // Every registered processor flushes, fed this cycle or not, so
        // windows for quiet streams keep their last image.
        for (component, processor) in registry.iter_mut() {
            match processor.flush() {
                Ok(Some(code)) => {
                    let _ = key_tx.send(KeyEvent { code });
                }
                Ok(None) => {}
                Err(error) => {
                    report(&error_tx, policy, *component, frame.sequence(), error, "flush");
                }
            }
        }
        drop(registry);

        metrics::histogram!("dispatch_cycle_us")
            .record(cycle_start.elapsed().as_micros() as f64);
    }
}

fn report(
    error_tx: &flume::Sender<ProcessingError>,
    policy: ErrorPolicy,
    component: ComponentId,
    sequence: u64,
    error: Error,
    op: &str,
) {
    tracing::warn!(?component, sequence, %error, "{op} failed");
    if policy == ErrorPolicy::Surface {
        let _ = error_tx.send(ProcessingError { component, sequence, error });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{CaptureDescriptor, SubImage};
    use crate::display::sink::TestSink;
    use crate::image::{ImageStatus, PixelFormat};

    fn hub() -> (TestSink, Arc<DisplayHub>) {
        let sink = TestSink::new();
        let hub = Arc::new(DisplayHub::new(Box::new(sink.clone())));
        (sink, hub)
    }

    fn depth_frame(values: &[u16], width: u32, height: u32, sequence: u64) -> Arc<Frame> {
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let descriptor = CaptureDescriptor {
            data: &payload,
            images: vec![SubImage {
                component: ComponentId::Depth,
                format: PixelFormat::Coord3dC16,
                width,
                height,
                offset: 0,
                size: payload.len(),
                status: ImageStatus::Ok,
                timestamp: sequence * 33_333,
                sequence,
            }],
        };
        Arc::new(Frame::new(&descriptor).unwrap())
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if done() {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("worker made no progress");
    }

    #[test]
    fn empty_frame_update_is_a_no_op() {
        let (_sink, hub) = hub();
        let dispatcher = FrameDispatcher::new(hub);
        let empty = Arc::new(Frame::new(&CaptureDescriptor { data: &[], images: vec![] }).unwrap());
        dispatcher.update(empty);
        assert_eq!(dispatcher.queue_stats().pushed, 0);
    }

    #[test]
    fn worker_processes_a_queued_depth_frame() {
        let (_sink, hub) = hub();
        let dispatcher = FrameDispatcher::new(hub);
        dispatcher.update(depth_frame(&[100, 200, 300, 400], 2, 2, 1));
        wait_until(|| dispatcher.queue_stats().popped == 1);
    }

    #[test]
    fn surfaced_errors_reach_the_channel() {
        let (_sink, hub) = hub();
        let dispatcher = FrameDispatcher::with_options(
            hub,
            4,
            Duration::from_millis(1),
            ErrorPolicy::Surface,
        );
        // A Bayer color view has no built-in decode path, so parse fails.
        let payload = vec![0u8; 4];
        let descriptor = CaptureDescriptor {
            data: &payload,
            images: vec![SubImage {
                component: ComponentId::Color,
                format: PixelFormat::BayerRggb8,
                width: 2,
                height: 2,
                offset: 0,
                size: 4,
                status: ImageStatus::Ok,
                timestamp: 0,
                sequence: 9,
            }],
        };
        let errors = dispatcher.processing_errors();
        dispatcher.update(Arc::new(Frame::new(&descriptor).unwrap()));
        let err = errors.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(err.component, ComponentId::Color);
        assert_eq!(err.sequence, 9);
        assert!(matches!(err.error, Error::UnsupportedFormat(PixelFormat::BayerRggb8)));
    }

    #[test]
    fn one_component_failure_does_not_block_the_others() {
        let (_sink, hub) = hub();
        let dispatcher = FrameDispatcher::new(hub);
        let mut payload = vec![0u8; 4];
        payload.extend_from_slice(&500u16.to_le_bytes());
        payload.extend_from_slice(&600u16.to_le_bytes());
        let descriptor = CaptureDescriptor {
            data: &payload,
            images: vec![
                SubImage {
                    component: ComponentId::Color,
                    format: PixelFormat::BayerRggb8,
                    width: 2,
                    height: 2,
                    offset: 0,
                    size: 4,
                    status: ImageStatus::Ok,
                    timestamp: 0,
                    sequence: 3,
                },
                SubImage {
                    component: ComponentId::Depth,
                    format: PixelFormat::Coord3dC16,
                    width: 2,
                    height: 1,
                    offset: 4,
                    size: 4,
                    status: ImageStatus::Ok,
                    timestamp: 0,
                    sequence: 3,
                },
            ],
        };
        dispatcher.update(Arc::new(Frame::new(&descriptor).unwrap()));
        wait_until(|| dispatcher.current_image(ComponentId::Depth).is_some());
        assert!(dispatcher.current_image(ComponentId::Color).is_none());
    }

    #[test]
    fn key_codes_are_forwarded_from_the_sink() {
        let (sink, hub) = hub();
        let dispatcher = FrameDispatcher::new(hub);
        let keys = dispatcher.key_events();
        sink.script_key(113);
        // Keep frames flowing so a flush happens after the key lands.
        for seq in 0..50 {
            dispatcher.update(depth_frame(&[100, 200, 300, 400], 2, 2, seq));
            if let Ok(event) = keys.recv_timeout(Duration::from_millis(50)) {
                assert_eq!(event.code, 113);
                return;
            }
        }
        panic!("key event never arrived");
    }

    #[test]
    fn replaced_processor_serves_the_next_frame() {
        let (sink, hub) = hub();
        let dispatcher = FrameDispatcher::new(Arc::clone(&hub));
        dispatcher.set_processor(
            ComponentId::Depth,
            ImageProcessor::new("depth-alt", hub),
        );
        dispatcher.update(depth_frame(&[100, 200, 300, 400], 2, 2, 1));
        wait_until(|| sink.presents_for("depth-alt") > 0);
    }
}
