//! Frame sampling
//!
//! Segment layout:
//! ```text
//! +----------------+---------------------------+---------
//! | frame_size (4) | payload [4, frame_size)   | unused
//! | u32 LE         | JPEG bytes                |
//! +----------------+---------------------------+---------
//! ```
//!
//! The payload is the half-open range `[4, frame_size)`, so `frame_size`
//! counts the 4-byte header. That slicing is an external compatibility
//! requirement with existing producers and must not change.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{RelayError, Result};

use super::segment::Segment;

/// Size of the `frame_size` header
pub const HEADER_LEN: usize = 4;

/// Owned copy of one frame payload
///
/// Never aliases the shared segment. Cheap to clone (`Bytes` is refcounted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSnapshot {
    data: Bytes,
}

impl FrameSnapshot {
    /// Payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// Payload length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty (`frame_size == 4`)
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Take the payload
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// Sample the current frame from `segment`
///
/// A single bounded copy; never waits for new data. Fails with
/// [`RelayError::CorruptFrame`] when `frame_size` is outside `[4, capacity]`.
pub fn read_frame(segment: &dyn Segment) -> Result<FrameSnapshot> {
    let capacity = segment.capacity();

    let mut header = [0u8; HEADER_LEN];
    if !segment.copy_out(0, &mut header) {
        return Err(RelayError::CorruptFrame {
            frame_size: 0,
            capacity,
        });
    }

    let frame_size = u32::from_le_bytes(header);
    let end = frame_size as usize;
    if end < HEADER_LEN || end > capacity {
        return Err(RelayError::CorruptFrame {
            frame_size,
            capacity,
        });
    }

    let mut payload = vec![0u8; end - HEADER_LEN];
    if !segment.copy_out(HEADER_LEN, &mut payload) {
        return Err(RelayError::CorruptFrame {
            frame_size,
            capacity,
        });
    }

    Ok(FrameSnapshot {
        data: Bytes::from(payload),
    })
}

/// Shared handle that sessions sample frames through
#[derive(Clone)]
pub struct FrameReader {
    segment: Arc<dyn Segment>,
}

impl FrameReader {
    pub fn new(segment: Arc<dyn Segment>) -> Self {
        Self { segment }
    }

    /// Sample the current frame
    pub fn read(&self) -> Result<FrameSnapshot> {
        read_frame(self.segment.as_ref())
    }

    /// Underlying segment
    pub fn segment(&self) -> &Arc<dyn Segment> {
        &self.segment
    }
}

impl std::fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReader")
            .field("segment", &self.segment.name())
            .field("capacity", &self.segment.capacity())
            .finish()
    }
}
