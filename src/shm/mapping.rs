//! POSIX shared memory mapping
//!
//! The relay only ever maps an existing object read-only. Creating the object
//! is the producer's job (see [`SegmentWriter`](super::SegmentWriter)).

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr::NonNull;
use std::time::Duration;

use crate::error::{RelayError, Result};

use super::segment::{range_fits, Segment};

/// Convert a segment name to the form `shm_open` expects (single leading `/`)
pub(crate) fn os_name(name: &str) -> Result<CString> {
    let trimmed = name.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.contains('/') {
        return Err(RelayError::InvalidName(name.to_string()));
    }
    CString::new(format!("/{}", trimmed)).map_err(|_| RelayError::InvalidName(name.to_string()))
}

/// Open a shared memory object, mapping `ENOENT` to [`RelayError::NotFound`]
pub(crate) fn shm_open(name: &str, flags: libc::c_int, mode: libc::c_uint) -> Result<OwnedFd> {
    let c_name = os_name(name)?;

    // SAFETY: c_name is a valid NUL-terminated string for the duration of the call.
    let fd = unsafe { libc::shm_open(c_name.as_ptr(), flags, mode) };
    if fd < 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOENT) {
            return Err(RelayError::NotFound {
                name: name.to_string(),
            });
        }
        return Err(RelayError::Map {
            name: name.to_string(),
            source: err,
        });
    }

    // SAFETY: fd was just returned by shm_open and is owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// An `mmap`ed region, unmapped on drop
pub(crate) struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
}

// The region is plain bytes shared with other processes; all access goes
// through raw copies.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    pub(crate) fn map(fd: &OwnedFd, len: usize, prot: libc::c_int) -> io::Result<Self> {
        // SAFETY: mapping a valid fd; the kernel validates len and prot.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                prot,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let ptr = NonNull::new(ptr as *mut u8)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))?;
        Ok(Self { ptr, len })
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn copy_out(&self, offset: usize, dst: &mut [u8]) -> bool {
        if !range_fits(offset, dst.len(), self.len) {
            return false;
        }
        // SAFETY: range checked above. The producer may be writing the same
        // bytes concurrently; the copy can be torn but never leaves the region.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.ptr.as_ptr().add(offset),
                dst.as_mut_ptr(),
                dst.len(),
            );
        }
        true
    }

    /// Caller must hold a writable mapping
    pub(crate) fn copy_in(&self, offset: usize, src: &[u8]) -> bool {
        if !range_fits(offset, src.len(), self.len) {
            return false;
        }
        // SAFETY: range checked above, mapping created with PROT_WRITE.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.as_ptr().add(offset), src.len());
        }
        true
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: ptr/len came from a successful mmap and are unmapped once.
        let rc = unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len) };
        if rc != 0 {
            tracing::warn!(
                error = %io::Error::last_os_error(),
                "Failed to unmap shared memory"
            );
        }
    }
}

/// Read-only view onto a named shared memory segment
///
/// Every call to [`SharedMemory::open`] creates an independent mapping, so
/// opening the same name twice is fine and neither view depends on the other.
pub struct SharedMemory {
    name: String,
    mapping: Mapping,
}

impl SharedMemory {
    /// Open an existing segment and map `capacity` bytes read-only
    ///
    /// Never creates the segment. Fails with [`RelayError::NotFound`] if the
    /// producer has not created it yet, or [`RelayError::Map`] if it exists
    /// but cannot be mapped (permissions, object smaller than `capacity`).
    pub fn open(name: &str, capacity: usize) -> Result<Self> {
        let fd = shm_open(name, libc::O_RDONLY, 0)?;

        let map_err = |source: io::Error| RelayError::Map {
            name: name.to_string(),
            source,
        };

        // SAFETY: zeroed stat is a valid out-parameter for fstat.
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd.as_raw_fd(), &mut stat) } != 0 {
            return Err(map_err(io::Error::last_os_error()));
        }
        if (stat.st_size as u64) < capacity as u64 {
            return Err(map_err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "segment is {} bytes, expected at least {}",
                    stat.st_size, capacity
                ),
            )));
        }

        let mapping = Mapping::map(&fd, capacity, libc::PROT_READ).map_err(map_err)?;

        tracing::debug!(segment = name, capacity = capacity, "Shared memory mapped");

        Ok(Self {
            name: name.to_string(),
            mapping,
        })
    }
}

impl Segment for SharedMemory {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> usize {
        self.mapping.len()
    }

    fn copy_out(&self, offset: usize, dst: &mut [u8]) -> bool {
        self.mapping.copy_out(offset, dst)
    }
}

impl std::fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMemory")
            .field("name", &self.name)
            .field("capacity", &self.mapping.len())
            .finish()
    }
}

/// Retry policy for opening a segment whose producer may not be running yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenPolicy {
    /// Delay between attempts
    pub interval: Duration,
    /// Maximum attempts (0 = retry forever)
    pub max_attempts: u32,
}

impl Default for OpenPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_attempts: 0,
        }
    }
}

impl OpenPolicy {
    /// Try exactly once
    pub fn once() -> Self {
        Self {
            interval: Duration::ZERO,
            max_attempts: 1,
        }
    }
}

/// Open a segment, retrying at a fixed interval while it is missing or unmappable
pub async fn open_with_retry(name: &str, capacity: usize, policy: OpenPolicy) -> Result<SharedMemory> {
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        match SharedMemory::open(name, capacity) {
            Ok(shm) => {
                tracing::info!(segment = name, attempts = attempts, "Shared memory segment opened");
                return Ok(shm);
            }
            Err(e) if e.is_recoverable() => {
                if policy.max_attempts != 0 && attempts >= policy.max_attempts {
                    tracing::warn!(segment = name, attempts = attempts, error = %e, "Giving up on shared memory segment");
                    return Err(RelayError::SegmentUnavailable {
                        name: name.to_string(),
                        attempts,
                    });
                }
                tracing::debug!(segment = name, attempt = attempts, error = %e, "Segment not ready, retrying");
                tokio::time::sleep(policy.interval).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::SegmentWriter;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unique_name(tag: &str) -> String {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        format!(
            "relay_map_{}_{}_{}",
            tag,
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn test_os_name() {
        assert_eq!(os_name("seg").unwrap().to_str().unwrap(), "/seg");
        assert_eq!(os_name("/seg").unwrap().to_str().unwrap(), "/seg");
        assert!(matches!(os_name(""), Err(RelayError::InvalidName(_))));
        assert!(matches!(os_name("a/b"), Err(RelayError::InvalidName(_))));
        assert!(matches!(os_name("a\0b"), Err(RelayError::InvalidName(_))));
    }

    #[test]
    fn test_open_missing_segment() {
        let name = unique_name("missing");
        let result = SharedMemory::open(&name, 4096);
        assert!(matches!(result, Err(RelayError::NotFound { .. })));
    }

    #[test]
    fn test_open_smaller_than_capacity() {
        let name = unique_name("small");
        let writer = SegmentWriter::create(&name, 4096).unwrap();

        let result = SharedMemory::open(&name, 8192);
        assert!(matches!(result, Err(RelayError::Map { .. })));

        writer.unlink().unwrap();
    }

    #[test]
    fn test_open_twice_gives_independent_views() {
        let name = unique_name("twice");
        let writer = SegmentWriter::create(&name, 4096).unwrap();
        writer.write_frame(b"hello").unwrap();

        let first = SharedMemory::open(&name, 4096).unwrap();
        let second = SharedMemory::open(&name, 4096).unwrap();

        let mut a = [0u8; 5];
        assert!(first.copy_out(4, &mut a));
        drop(first);

        let mut b = [0u8; 5];
        assert!(second.copy_out(4, &mut b));
        assert_eq!(&a, b"hello");
        assert_eq!(&b, b"hello");
        assert_eq!(second.capacity(), 4096);

        writer.unlink().unwrap();
    }

    #[tokio::test]
    async fn test_open_with_retry_gives_up() {
        let name = unique_name("retry");
        let policy = OpenPolicy {
            interval: Duration::from_millis(1),
            max_attempts: 3,
        };

        let result = open_with_retry(&name, 4096, policy).await;
        assert!(matches!(
            result,
            Err(RelayError::SegmentUnavailable { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_open_with_retry_waits_for_producer() {
        let name = unique_name("late");
        let policy = OpenPolicy {
            interval: Duration::from_millis(5),
            max_attempts: 0,
        };

        let producer_name = name.clone();
        let producer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            SegmentWriter::create(&producer_name, 4096).unwrap()
        });

        let shm = open_with_retry(&name, 4096, policy).await.unwrap();
        assert_eq!(shm.capacity(), 4096);

        producer.await.unwrap().unlink().unwrap();
    }
}
