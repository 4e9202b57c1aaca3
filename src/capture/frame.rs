//! Capture-event snapshots with zero-copy component views.
//!
//! A [`Frame`] copies the device payload exactly once into a refcounted
//! arena and records an [`Image`] view per successfully captured component.
//! Views are `Bytes` slices of the arena, so they stay valid for as long as
//! anyone holds them; the device buffer itself can be recycled the moment
//! [`Frame::new`] returns.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::image::{ComponentId, Image, ImageStatus, PixelFormat};

/// Descriptor of one component's sub-image inside a raw capture payload.
#[derive(Debug, Clone)]
pub struct SubImage {
    pub component: ComponentId,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Byte offset of this sub-image within the payload.
    pub offset: usize,
    /// Byte size of this sub-image.
    pub size: usize,
    /// Device capture status; failed sub-images never become views.
    pub status: ImageStatus,
    /// Device capture timestamp, microseconds.
    pub timestamp: u64,
    /// Device frame sequence index.
    pub sequence: u64,
}

/// One capture event as reported by the device: a borrowed contiguous
/// payload plus per-component sub-image descriptors. The borrow ends when
/// [`Frame::new`] returns, so the buffer can go straight back to the pool.
#[derive(Debug)]
pub struct CaptureDescriptor<'a> {
    pub data: &'a [u8],
    pub images: Vec<SubImage>,
}

/// Immutable snapshot of one capture event.
///
/// Owns a single arena holding the entire payload; per-component images are
/// zero-copy views into it. Deliberately not `Clone` — duplicating the
/// payload is never required, consumers share a frame through `Arc<Frame>`.
#[derive(Debug)]
pub struct Frame {
    arena: Bytes,
    images: BTreeMap<ComponentId, Image>,
    timestamp: u64,
    sequence: u64,
}

impl Frame {
    /// Build a frame from a raw capture descriptor.
    ///
    /// The payload is copied once. Sub-images with a failed status are
    /// omitted; a sub-image pointing outside the payload fails the whole
    /// construction with [`Error::BadDescriptor`].
    pub fn new(descriptor: &CaptureDescriptor<'_>) -> Result<Frame> {
        let arena = Bytes::copy_from_slice(descriptor.data);
        let mut images = BTreeMap::new();
        let mut timestamp = 0;
        let mut sequence = 0;

        for sub in &descriptor.images {
            if !sub.status.is_ok() {
                tracing::debug!(component = ?sub.component, status = ?sub.status,
                    "skipping failed sub-image");
                continue;
            }
            let end = sub.offset.checked_add(sub.size).filter(|&e| e <= arena.len());
            let Some(end) = end else {
                return Err(Error::BadDescriptor {
                    component: sub.component,
                    offset: sub.offset,
                    size: sub.size,
                    payload: arena.len(),
                });
            };
            if images.is_empty() {
                timestamp = sub.timestamp;
                sequence = sub.sequence;
            }
            images.insert(
                sub.component,
                Image::view(
                    arena.slice(sub.offset..end),
                    sub.width,
                    sub.height,
                    sub.component,
                    sub.format,
                    sub.status,
                    sub.timestamp,
                    sub.sequence,
                ),
            );
        }

        Ok(Frame { arena, images, timestamp, sequence })
    }

    /// View for one component, `None` when the device did not deliver it.
    pub fn image(&self, component: ComponentId) -> Option<&Image> {
        self.images.get(&component)
    }

    pub fn depth_image(&self) -> Option<&Image> {
        self.image(ComponentId::Depth)
    }

    pub fn color_image(&self) -> Option<&Image> {
        self.image(ComponentId::Color)
    }

    pub fn left_ir_image(&self) -> Option<&Image> {
        self.image(ComponentId::IrLeft)
    }

    pub fn right_ir_image(&self) -> Option<&Image> {
        self.image(ComponentId::IrRight)
    }

    /// Components present in this frame, in stable [`ComponentId`] order.
    pub fn components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.images.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Total payload size in bytes.
    pub fn payload_size(&self) -> usize {
        self.arena.len()
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}
