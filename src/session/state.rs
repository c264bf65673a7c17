//! Session state machine
//!
//! `Created -> Streaming -> (Cancelled | Errored)`. Terminal phases are final;
//! a session object is never reused for another connection.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::stats::SessionStats;

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Connection accepted, no frame read yet
    Created,
    /// Sampling and emitting frames
    Streaming,
    /// Client went away, write failed, or the relay is shutting down
    Cancelled,
    /// Session-specific fatal condition (segment unavailable)
    Errored,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Cancelled | SessionPhase::Errored)
    }
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Unique session ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: Option<SocketAddr>,

    /// Current phase
    pub phase: SessionPhase,

    /// Connection accept time
    pub created_at: Instant,

    /// Time of the first tick
    pub streaming_started_at: Option<Instant>,

    /// Time the session reached a terminal phase
    pub ended_at: Option<Instant>,

    /// Counters for this session
    pub stats: SessionStats,
}

impl SessionState {
    pub fn new(id: u64, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Created,
            created_at: Instant::now(),
            streaming_started_at: None,
            ended_at: None,
            stats: SessionStats::new(),
        }
    }

    /// Created -> Streaming
    pub fn start_streaming(&mut self) -> bool {
        if self.phase != SessionPhase::Created {
            return false;
        }
        self.phase = SessionPhase::Streaming;
        self.streaming_started_at = Some(Instant::now());
        true
    }

    /// Move to Cancelled unless already terminal
    pub fn cancel(&mut self) -> bool {
        self.finish(SessionPhase::Cancelled)
    }

    /// Move to Errored unless already terminal
    pub fn fail(&mut self) -> bool {
        self.finish(SessionPhase::Errored)
    }

    fn finish(&mut self, phase: SessionPhase) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.phase = phase;
        let now = Instant::now();
        self.ended_at = Some(now);
        self.stats.duration = self.streaming_duration_at(now);
        true
    }

    fn streaming_duration_at(&self, now: Instant) -> Duration {
        self.streaming_started_at
            .map(|t| now.duration_since(t))
            .unwrap_or(Duration::ZERO)
    }

    /// Time spent streaming so far
    pub fn streaming_duration(&self) -> Duration {
        self.streaming_duration_at(self.ended_at.unwrap_or_else(Instant::now))
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == SessionPhase::Streaming
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_session_lifecycle() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5000);
        let mut state = SessionState::new(1, Some(addr));

        assert_eq!(state.phase, SessionPhase::Created);

        assert!(state.start_streaming());
        assert!(state.is_streaming());
        assert!(state.streaming_started_at.is_some());

        assert!(state.cancel());
        assert_eq!(state.phase, SessionPhase::Cancelled);
        assert!(state.ended_at.is_some());
    }

    #[test]
    fn test_terminal_phases_are_final() {
        let mut state = SessionState::new(1, None);
        state.start_streaming();
        state.fail();

        assert_eq!(state.phase, SessionPhase::Errored);
        assert!(!state.cancel());
        assert!(!state.start_streaming());
        assert_eq!(state.phase, SessionPhase::Errored);
    }

    #[test]
    fn test_cancel_before_streaming() {
        let mut state = SessionState::new(7, None);
        assert!(state.cancel());
        assert_eq!(state.phase, SessionPhase::Cancelled);
        assert_eq!(state.stats.duration, Duration::ZERO);
        assert!(!state.start_streaming());
    }

    #[test]
    fn test_phase_is_terminal() {
        assert!(!SessionPhase::Created.is_terminal());
        assert!(!SessionPhase::Streaming.is_terminal());
        assert!(SessionPhase::Cancelled.is_terminal());
        assert!(SessionPhase::Errored.is_terminal());
    }
}
