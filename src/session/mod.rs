//! Client stream sessions
//!
//! A session is created per `/VideoStream` connection and owns nothing shared
//! except a clone of the frame reader. See [`StreamSession`].

pub mod context;
pub mod state;
pub mod stream;

pub use context::RelayContext;
pub use state::{SessionPhase, SessionState};
pub use stream::{SessionSummary, StopReason, StreamSession};
