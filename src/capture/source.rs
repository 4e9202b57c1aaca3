//! Device seam and a deterministic synthetic camera.
//!
//! Real hardware sits behind [`FrameSource`]: the pipeline only ever sees
//! completed [`Frame`]s. [`BufferPool`] models the device buffer contract —
//! a small fixed set of capture buffers that must be handed back after each
//! frame is snapshotted. [`SyntheticSource`] drives the pipeline without
//! hardware, for the demo binary and the integration tests.

use std::sync::Arc;

use crate::capture::frame::{CaptureDescriptor, Frame, SubImage};
use crate::error::Result;
use crate::image::{ComponentId, ImageStatus, PixelFormat};

/// Produces capture frames. `Ok(None)` means the stream ended.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Arc<Frame>>>;
}

/// Fixed set of recyclable capture buffers. Every acquired buffer must be
/// released once the payload has been copied into a frame; the pool does
/// not grow.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Vec<Vec<u8>>,
}

impl BufferPool {
    pub fn new(count: usize, buffer_size: usize) -> Self {
        Self {
            buffers: (0..count).map(|_| vec![0u8; buffer_size]).collect(),
        }
    }

    pub fn acquire(&mut self) -> Option<Vec<u8>> {
        self.buffers.pop()
    }

    pub fn release(&mut self, buffer: Vec<u8>) {
        self.buffers.push(buffer);
    }

    pub fn available(&self) -> usize {
        self.buffers.len()
    }
}

/// One component stream the synthetic device delivers per frame.
#[derive(Debug, Clone)]
pub struct StreamSpec {
    pub component: ComponentId,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

impl StreamSpec {
    fn byte_size(&self) -> usize {
        let bpp = self.format.bytes_per_pixel().unwrap_or(1);
        self.width as usize * self.height as usize * bpp
    }
}

/// Deterministic multi-component frame generator. Depth ramps with the
/// sequence number so motion is visible; the ToF stream carries four phase
/// planes with a fixed quadrature offset.
pub struct SyntheticSource {
    streams: Vec<StreamSpec>,
    pool: BufferPool,
    sequence: u64,
    frame_limit: Option<u64>,
}

impl SyntheticSource {
    /// Two pool buffers, like a double-buffered device.
    pub fn new(streams: Vec<StreamSpec>, frame_limit: Option<u64>) -> Self {
        let payload_size: usize = streams.iter().map(StreamSpec::byte_size).sum();
        Self {
            streams,
            pool: BufferPool::new(2, payload_size),
            sequence: 0,
            frame_limit,
        }
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    fn fill_stream(spec: &StreamSpec, buffer: &mut [u8], sequence: u64) {
        let (width, height) = (spec.width as usize, spec.height as usize);
        match spec.format {
            PixelFormat::Coord3dC16 => {
                for y in 0..height {
                    for x in 0..width {
                        let depth = 400 + ((x + y + sequence as usize * 3) % 2200) as u16;
                        let at = (y * width + x) * 2;
                        buffer[at..at + 2].copy_from_slice(&depth.to_le_bytes());
                    }
                }
            }
            PixelFormat::Mono8 => {
                for y in 0..height {
                    for x in 0..width {
                        buffer[y * width + x] = ((x ^ y) as u64 + sequence) as u8;
                    }
                }
            }
            PixelFormat::Bgr8 => {
                for y in 0..height {
                    for x in 0..width {
                        let at = (y * width + x) * 3;
                        buffer[at] = (x * 255 / width.max(1)) as u8;
                        buffer[at + 1] = (y * 255 / height.max(1)) as u8;
                        buffer[at + 2] = sequence as u8;
                    }
                }
            }
            PixelFormat::TofIrFourGroupMono16 => {
                // Plane order [phase180 | phase90 | phase0 | phase270] with a
                // constant quadrature offset, so intensity is uniform per frame.
                let pixels = width * height;
                for (plane, base) in [(0usize, 500u16), (1, 800), (2, 700), (3, 600)] {
                    for i in 0..pixels {
                        let at = (plane * pixels + i) * 2;
                        let value = base + (sequence % 50) as u16;
                        buffer[at..at + 2].copy_from_slice(&value.to_le_bytes());
                    }
                }
            }
            // Everything else gets a flat fill; good enough for a fake device.
            _ => {
                for (i, byte) in buffer.iter_mut().enumerate() {
                    *byte = (i as u64 + sequence) as u8;
                }
            }
        }
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<Arc<Frame>>> {
        if let Some(limit) = self.frame_limit {
            if self.sequence >= limit {
                return Ok(None);
            }
        }
        let Some(mut buffer) = self.pool.acquire() else {
            // Both device buffers are out; a real driver would stall here.
            tracing::warn!("synthetic capture pool exhausted");
            return Ok(None);
        };

        self.sequence += 1;
        let timestamp = self.sequence * 33_333;

        let mut images = Vec::with_capacity(self.streams.len());
        let mut offset = 0;
        for spec in &self.streams {
            let size = spec.byte_size();
            Self::fill_stream(spec, &mut buffer[offset..offset + size], self.sequence);
            images.push(SubImage {
                component: spec.component,
                format: spec.format,
                width: spec.width,
                height: spec.height,
                offset,
                size,
                status: ImageStatus::Ok,
                timestamp,
                sequence: self.sequence,
            });
            offset += size;
        }

        let frame = Frame::new(&CaptureDescriptor { data: &buffer[..offset], images })?;
        // The frame owns its own copy; the capture buffer goes back now.
        self.pool.release(buffer);
        Ok(Some(Arc::new(frame)))
    }
}
