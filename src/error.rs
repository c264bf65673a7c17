//! Error types
//!
//! Segment errors (`NotFound`, `Map`) are recoverable by retrying the open.
//! `CorruptFrame` only means "no frame this tick" and never reaches a client.

use std::io;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors produced by the relay
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Shared memory object does not exist (producer not started yet)
    #[error("shared memory segment not found: {name}")]
    NotFound { name: String },

    /// The segment exists but could not be mapped
    #[error("failed to map shared memory segment {name}: {source}")]
    Map {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Declared frame length is outside `[4, capacity]`
    #[error("corrupt frame: frame_size {frame_size} outside [4, {capacity}]")]
    CorruptFrame { frame_size: u32, capacity: usize },

    /// Segment name cannot be passed to the OS
    #[error("invalid segment name: {0:?}")]
    InvalidName(String),

    /// Segment stayed unavailable after the configured number of open attempts
    #[error("shared memory segment {name} unavailable after {attempts} attempts")]
    SegmentUnavailable { name: String, attempts: u32 },

    /// Frame payload does not fit in the segment (producer side)
    #[error("frame of {len} bytes does not fit in segment of {capacity} bytes")]
    FrameTooLarge { len: usize, capacity: usize },

    /// Relay stopped before the operation could complete
    #[error("relay is shutting down")]
    ShuttingDown,

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RelayError {
    /// Whether the caller may retry the failed operation
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RelayError::NotFound { .. } | RelayError::Map { .. } | RelayError::CorruptFrame { .. }
        )
    }
}
