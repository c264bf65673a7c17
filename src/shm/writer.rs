//! Producer side of the segment
//!
//! The encoder process normally owns this half. It lives here so the relay
//! can be exercised end to end without the real camera pipeline.

use std::io;
use std::os::fd::AsRawFd;

use crate::error::{RelayError, Result};

use super::mapping::{os_name, shm_open, Mapping};
use super::reader::HEADER_LEN;

/// Creates a named segment and publishes length-prefixed frames into it
pub struct SegmentWriter {
    name: String,
    mapping: Mapping,
}

impl SegmentWriter {
    /// Create (or reuse) the named segment and size it to `capacity`
    pub fn create(name: &str, capacity: usize) -> Result<Self> {
        let fd = shm_open(name, libc::O_CREAT | libc::O_RDWR, 0o600)?;

        let map_err = |source: io::Error| RelayError::Map {
            name: name.to_string(),
            source,
        };

        // SAFETY: fd is a valid shared memory descriptor.
        if unsafe { libc::ftruncate(fd.as_raw_fd(), capacity as libc::off_t) } != 0 {
            return Err(map_err(io::Error::last_os_error()));
        }

        let mapping =
            Mapping::map(&fd, capacity, libc::PROT_READ | libc::PROT_WRITE).map_err(map_err)?;

        tracing::debug!(segment = name, capacity = capacity, "Shared memory segment created");

        Ok(Self {
            name: name.to_string(),
            mapping,
        })
    }

    /// Segment name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Segment size in bytes
    pub fn capacity(&self) -> usize {
        self.mapping.len()
    }

    /// Publish one frame
    ///
    /// The payload goes in first and the header last, recording
    /// `frame_size = 4 + payload.len()`.
    pub fn write_frame(&self, payload: &[u8]) -> Result<()> {
        let end = HEADER_LEN + payload.len();
        if end > self.capacity() || end > u32::MAX as usize {
            return Err(RelayError::FrameTooLarge {
                len: payload.len(),
                capacity: self.capacity(),
            });
        }
        self.mapping.copy_in(HEADER_LEN, payload);
        self.mapping.copy_in(0, &(end as u32).to_le_bytes());
        Ok(())
    }

    /// Write raw bytes at `offset`; returns false if they do not fit
    pub fn write_at(&self, offset: usize, data: &[u8]) -> bool {
        self.mapping.copy_in(offset, data)
    }

    /// Remove the segment name; existing mappings stay valid
    pub fn unlink(&self) -> Result<()> {
        let c_name = os_name(&self.name)?;
        // SAFETY: valid NUL-terminated name.
        if unsafe { libc::shm_unlink(c_name.as_ptr()) } != 0 {
            return Err(RelayError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }
}
