//! Per-client stream session
//!
//! One session per `/VideoStream` connection. Each tick it samples the shared
//! segment, wraps the frame as a multipart part and hands it to the
//! connection's sink. Sessions pace themselves and never share mutable state,
//! so a stalled client only stalls its own loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::error::{RelayError, Result};
use crate::multipart::MultipartEncoder;
use crate::shm::FrameReader;
use crate::stats::SessionStats;

use super::context::RelayContext;
use super::state::{SessionPhase, SessionState};

/// Why a session stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Sink receiver dropped before or during a write
    ClientGone,
    /// Relay shutdown requested
    Shutdown,
}

/// Outcome of a finished session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: u64,
    pub phase: SessionPhase,
    pub reason: Option<StopReason>,
    pub stats: SessionStats,
}

/// A single client's paced frame stream
pub struct StreamSession {
    state: SessionState,
    reader: FrameReader,
    encoder: MultipartEncoder,
    interval: Duration,
    ctx: Arc<RelayContext>,
}

impl StreamSession {
    /// Create a session over an already-open reader
    pub fn new(ctx: Arc<RelayContext>, reader: FrameReader, peer_addr: Option<SocketAddr>) -> Self {
        let id = ctx.next_session_id();
        Self {
            state: SessionState::new(id, peer_addr),
            reader,
            encoder: MultipartEncoder,
            interval: ctx.config().frame_interval,
            ctx,
        }
    }

    /// Create a session, waiting for the shared segment if needed
    ///
    /// If the segment never becomes available the session ends `Errored` and
    /// the error is returned so the caller can report it to this client. A
    /// relay shutdown abandons the wait with [`RelayError::ShuttingDown`].
    pub async fn open(ctx: Arc<RelayContext>, peer_addr: Option<SocketAddr>) -> Result<Self> {
        let mut shutdown = ctx.shutdown_signal();
        let opened = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => Err(RelayError::ShuttingDown),
            reader = ctx.reader() => reader,
        };

        match opened {
            Ok(reader) => Ok(Self::new(ctx, reader, peer_addr)),
            Err(RelayError::ShuttingDown) => {
                tracing::debug!(peer = ?peer_addr, "Session abandoned: relay shutting down");
                Err(RelayError::ShuttingDown)
            }
            Err(e) => {
                let mut state = SessionState::new(ctx.next_session_id(), peer_addr);
                state.fail();
                ctx.stats().session_errored();
                tracing::warn!(
                    session_id = state.id,
                    peer = ?peer_addr,
                    phase = ?state.phase,
                    segment = %ctx.config().segment_name,
                    error = %e,
                    "Session errored: segment unavailable"
                );
                Err(e)
            }
        }
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    /// Stream until the client goes away or the relay shuts down
    ///
    /// Encoded parts are sent on `sink`. The receiver being dropped is how a
    /// disconnect is observed; it is noticed during the pacing wait as well as
    /// on the next send, so the loop never outlives its client by a tick.
    pub async fn run(mut self, sink: mpsc::Sender<Bytes>) -> SessionSummary {
        let mut shutdown = self.ctx.shutdown_signal();
        let reason;

        if !self.state.start_streaming() {
            return self.summary(None);
        }
        self.ctx.stats().session_started();

        tracing::debug!(
            session_id = self.state.id,
            peer = ?self.state.peer_addr,
            interval_ms = self.interval.as_millis() as u64,
            "Session streaming"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = sink.closed() => {
                    reason = StopReason::ClientGone;
                    break;
                }
                _ = shutdown_requested(&mut shutdown) => {
                    reason = StopReason::Shutdown;
                    break;
                }
                _ = ticker.tick() => {}
            }

            let snapshot = match self.reader.read() {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    self.state.stats.frames_skipped += 1;
                    self.ctx.stats().frame_skipped();
                    tracing::trace!(session_id = self.state.id, error = %e, "Skipping corrupt frame");
                    continue;
                }
            };

            let part = self.encoder.encode_snapshot(&snapshot);
            let len = part.len();

            // A slow client blocks here; shutdown still interrupts it.
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => {
                    reason = StopReason::Shutdown;
                    break;
                }
                sent = sink.send(part) => {
                    if sent.is_err() {
                        reason = StopReason::ClientGone;
                        break;
                    }
                }
            }

            self.state.stats.frames_sent += 1;
            self.state.stats.bytes_sent += len as u64;
            self.ctx.stats().frame_sent(len);
        }

        self.state.cancel();
        self.ctx.stats().session_ended();

        let summary = self.summary(Some(reason));
        tracing::debug!(
            session_id = summary.id,
            reason = ?reason,
            frames_sent = summary.stats.frames_sent,
            frames_skipped = summary.stats.frames_skipped,
            bytes_sent = summary.stats.bytes_sent,
            duration_ms = summary.stats.duration.as_millis() as u64,
            "Session cancelled"
        );
        summary
    }

    fn summary(&self, reason: Option<StopReason>) -> SessionSummary {
        SessionSummary {
            id: self.state.id,
            phase: self.state.phase,
            reason,
            stats: self.state.stats.clone(),
        }
    }
}

/// Resolves once shutdown is requested; never resolves if the sender is gone
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let requested = rx.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}
