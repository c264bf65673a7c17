//! Read access to a fixed-size frame segment
//!
//! [`Segment`] is the seam between the frame reader and the memory it reads.
//! Production code uses [`SharedMemory`](super::SharedMemory); tests use
//! [`MemorySegment`], whose contents can be rewritten at any time.

use std::sync::Mutex;

use crate::error::{RelayError, Result};

use super::reader::HEADER_LEN;

/// A fixed-capacity byte region that frames are sampled from
///
/// Implementations must tolerate concurrent readers. They make no promise
/// about consistency with a concurrent writer: a copy may observe a torn mix
/// of old and new bytes.
pub trait Segment: Send + Sync {
    /// Name the segment was opened under
    fn name(&self) -> &str;

    /// Size of the region in bytes
    fn capacity(&self) -> usize;

    /// Copy `dst.len()` bytes starting at `offset` into `dst`
    ///
    /// Returns `false` without touching `dst` if the range does not fit.
    fn copy_out(&self, offset: usize, dst: &mut [u8]) -> bool;
}

/// Returns true if `[offset, offset + len)` lies inside `capacity`
pub(crate) fn range_fits(offset: usize, len: usize, capacity: usize) -> bool {
    offset
        .checked_add(len)
        .map(|end| end <= capacity)
        .unwrap_or(false)
}

/// In-process segment backed by a heap buffer
pub struct MemorySegment {
    name: String,
    buf: Mutex<Vec<u8>>,
}

impl MemorySegment {
    /// Create a zero-filled segment
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            buf: Mutex::new(vec![0; capacity]),
        }
    }

    /// Overwrite bytes at `offset`, truncating anything past the end
    pub fn write_at(&self, offset: usize, data: &[u8]) {
        let mut buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        if offset >= buf.len() {
            return;
        }
        let n = data.len().min(buf.len() - offset);
        buf[offset..offset + n].copy_from_slice(&data[..n]);
    }

    /// Set the little-endian `frame_size` header
    pub fn set_frame_size(&self, frame_size: u32) {
        self.write_at(0, &frame_size.to_le_bytes());
    }

    /// Write a complete record: payload at offset 4, then `frame_size = 4 + len`
    ///
    /// A payload that does not fit is rejected and the segment is untouched.
    pub fn write_frame(&self, payload: &[u8]) -> Result<()> {
        let end = HEADER_LEN + payload.len();
        if end > self.capacity() || end > u32::MAX as usize {
            return Err(RelayError::FrameTooLarge {
                len: payload.len(),
                capacity: self.capacity(),
            });
        }
        self.write_at(HEADER_LEN, payload);
        self.set_frame_size(end as u32);
        Ok(())
    }
}

impl Segment for MemorySegment {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> usize {
        self.buf.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn copy_out(&self, offset: usize, dst: &mut [u8]) -> bool {
        let buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        if !range_fits(offset, dst.len(), buf.len()) {
            return false;
        }
        dst.copy_from_slice(&buf[offset..offset + dst.len()]);
        true
    }
}
