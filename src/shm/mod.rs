//! Shared memory transport
//!
//! An external producer creates a fixed-size POSIX shared memory object and
//! keeps overwriting it with the latest JPEG frame. The relay maps it
//! read-only once and every session samples it independently.
//!
//! There is no lock or sequence number shared with the producer, so a sample
//! can be torn. The only defence is the bounds check on the declared length.

pub mod mapping;
pub mod reader;
pub mod segment;
pub mod writer;

pub use mapping::{open_with_retry, OpenPolicy, SharedMemory};
pub use reader::{read_frame, FrameReader, FrameSnapshot, HEADER_LEN};
pub use segment::{MemorySegment, Segment};
pub use writer::SegmentWriter;
