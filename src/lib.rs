//! MJPEG relay over POSIX shared memory
//!
//! An external encoder writes the latest JPEG frame into a fixed-size shared
//! memory segment as `[frame_size: u32 LE][payload]`. This crate maps that
//! segment read-only and serves it to browsers as a
//! `multipart/x-mixed-replace` stream.
//!
//! # Architecture
//!
//! ```text
//!   encoder ──► /dev/shm/<name> ──► FrameReader ──┬─► StreamSession ──► client
//!   (external)   (mapped once)     (shared, RO)   ├─► StreamSession ──► client
//!                                                 └─► StreamSession ──► client
//! ```
//!
//! Every session samples the segment on its own timer, so clients never wait
//! on each other. There is no handshake with the producer: a sample is only
//! checked for a sane length and may be torn.
//!
//! # Example
//! ```no_run
//! use mjpeg_shm_relay::{RelayConfig, RelayServer};
//!
//! # async fn example() -> mjpeg_shm_relay::Result<()> {
//! let config = RelayConfig::default().segment("srm_viewer_web_armor");
//! RelayServer::new(config)?
//!     .run_until(async { let _ = tokio::signal::ctrl_c().await; })
//!     .await
//! # }
//! ```

pub mod error;
pub mod multipart;
pub mod server;
pub mod session;
pub mod shm;
pub mod stats;

pub use error::{RelayError, Result};
pub use server::{RelayConfig, RelayServer};
pub use session::{RelayContext, StreamSession};
pub use shm::{read_frame, FrameSnapshot, SharedMemory};
