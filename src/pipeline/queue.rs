//! Bounded frame queue with drop-oldest backpressure.
//!
//! One producer (the acquisition thread) and one consumer (the dispatcher
//! worker) share the queue through a single lock. Overflow is not an error:
//! the oldest frame is evicted so the newest always gets in, and survivors
//! keep their arrival order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam::utils::CachePadded;
use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

use crate::capture::frame::Frame;

pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// Bounded FIFO of frame handles with overwrite-oldest push.
pub struct FrameQueue {
    ring: Mutex<HeapRb<Arc<Frame>>>,
    capacity: usize,
    stats: CachePadded<Counters>,
}

#[derive(Default)]
struct Counters {
    pushed: AtomicU64,
    popped: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of queue activity since construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub pushed: u64,
    pub popped: u64,
    pub dropped: u64,
    pub len: usize,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(HeapRb::new(capacity)),
            capacity,
            stats: CachePadded::new(Counters::default()),
        }
    }

    /// Append a frame, evicting the oldest entry when full. Returns the
    /// evicted frame, if any. Never blocks beyond the queue lock.
    pub fn push(&self, frame: Arc<Frame>) -> Option<Arc<Frame>> {
        let evicted = {
            let mut ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
            // The entire eviction policy is this one call.
            ring.push_overwrite(frame)
        };
        self.stats.pushed.fetch_add(1, Ordering::Relaxed);
        if evicted.is_some() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("frame_queue_dropped").increment(1);
        }
        evicted
    }

    /// Remove and return the oldest frame.
    pub fn pop(&self) -> Option<Arc<Frame>> {
        let frame = {
            let mut ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
            ring.try_pop()
        };
        if frame.is_some() {
            self.stats.popped.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    pub fn len(&self) -> usize {
        self.ring
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pushed: self.stats.pushed.load(Ordering::Relaxed),
            popped: self.stats.popped.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            len: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{CaptureDescriptor, SubImage};
    use crate::image::{ComponentId, ImageStatus, PixelFormat};

    fn frame(sequence: u64) -> Arc<Frame> {
        let payload = [0u8; 4];
        let descriptor = CaptureDescriptor {
            data: &payload,
            images: vec![SubImage {
                component: ComponentId::Depth,
                format: PixelFormat::Mono8,
                width: 4,
                height: 1,
                offset: 0,
                size: 4,
                status: ImageStatus::Ok,
                timestamp: sequence * 1_000,
                sequence,
            }],
        };
        Arc::new(Frame::new(&descriptor).unwrap())
    }

    #[test]
    fn capacity_plus_one_pushes_evict_exactly_the_oldest() {
        let queue = FrameQueue::new(4);
        for seq in 0..5 {
            queue.push(frame(seq));
        }
        assert_eq!(queue.len(), 4);

        // Survivors are the most recent four, in arrival order.
        let order: Vec<u64> = std::iter::from_fn(|| queue.pop())
            .map(|f| f.sequence())
            .collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
    }

    #[test]
    fn push_reports_the_evicted_frame() {
        let queue = FrameQueue::new(2);
        assert!(queue.push(frame(0)).is_none());
        assert!(queue.push(frame(1)).is_none());
        let evicted = queue.push(frame(2)).expect("oldest must be evicted");
        assert_eq!(evicted.sequence(), 0);
    }

    #[test]
    fn counters_track_pushes_pops_and_drops() {
        let queue = FrameQueue::new(2);
        for seq in 0..3 {
            queue.push(frame(seq));
        }
        queue.pop();
        let stats = queue.stats();
        assert_eq!(stats.pushed, 3);
        assert_eq!(stats.popped, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.len, 1);
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let queue = FrameQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(frame(0));
        queue.push(frame(1));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().sequence(), 1);
    }
}
