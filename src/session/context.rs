//! Relay context
//!
//! Built once at startup and shared by reference with every session. Holds
//! the configuration, the single read-only segment mapping, and the shutdown
//! signal. Sessions never write to anything in here except atomic counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, OnceCell, OwnedSemaphorePermit, Semaphore};

use crate::error::{RelayError, Result};
use crate::server::config::RelayConfig;
use crate::server::config_store::ConfigStore;
use crate::shm::{open_with_retry, FrameReader, Segment};
use crate::stats::RelayStats;

/// Shared state for all sessions
pub struct RelayContext {
    config: RelayConfig,
    reader: OnceCell<FrameReader>,
    config_store: ConfigStore,
    stats: RelayStats,
    next_session_id: AtomicU64,
    session_limit: Option<Arc<Semaphore>>,
    shutdown_tx: watch::Sender<bool>,
}

impl RelayContext {
    /// Create a context that maps the configured segment on first use
    ///
    /// The configuration is validated here, so every session can rely on a
    /// non-zero interval and channel capacity.
    pub fn new(config: RelayConfig) -> Result<Self> {
        config.validate()?;

        let session_limit = if config.max_sessions > 0 {
            Some(Arc::new(Semaphore::new(config.max_sessions)))
        } else {
            None
        };
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config_store: ConfigStore::new(config.config_path.clone()),
            config,
            reader: OnceCell::new(),
            stats: RelayStats::new(),
            next_session_id: AtomicU64::new(1),
            session_limit,
            shutdown_tx,
        })
    }

    /// Create a context over an already-open segment
    pub fn with_segment(config: RelayConfig, segment: Arc<dyn Segment>) -> Result<Self> {
        let ctx = Self::new(config)?;
        // The cell is fresh, so this cannot fail.
        let _ = ctx.reader.set(FrameReader::new(segment));
        Ok(ctx)
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config_store
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Frame reader over the shared segment
    ///
    /// The first caller opens the segment (retrying per the configured
    /// policy); concurrent callers wait for that attempt. Once mapped, the
    /// same mapping is handed to every session for the life of the process.
    pub async fn reader(&self) -> Result<FrameReader> {
        self.reader
            .get_or_try_init(|| async {
                let shm = open_with_retry(
                    &self.config.segment_name,
                    self.config.segment_capacity,
                    self.config.open_policy(),
                )
                .await?;
                Ok::<_, RelayError>(FrameReader::new(Arc::new(shm)))
            })
            .await
            .cloned()
    }

    /// Reader if the segment is already mapped
    pub fn try_reader(&self) -> Option<FrameReader> {
        self.reader.get().cloned()
    }

    /// Allocate a session ID
    pub fn next_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Reserve a session slot
    ///
    /// `Ok(None)` means there is no limit. `Err(())` means the limit is reached.
    pub fn try_acquire_session(&self) -> std::result::Result<Option<OwnedSemaphorePermit>, ()> {
        match self.session_limit {
            Some(ref sem) => sem.clone().try_acquire_owned().map(Some).map_err(|_| ()),
            None => Ok(None),
        }
    }

    /// Ask every session to stop
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Receiver that flips to `true` on shutdown
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}

impl std::fmt::Debug for RelayContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayContext")
            .field("config", &self.config)
            .field("segment_mapped", &self.reader.initialized())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::{MemorySegment, OpenPolicy};
    use std::time::Duration;

    #[tokio::test]
    async fn test_with_segment_is_ready() {
        let seg = Arc::new(MemorySegment::new("mem", 64));
        seg.write_frame(b"hi").unwrap();
        let ctx = RelayContext::with_segment(RelayConfig::default(), seg).unwrap();

        assert!(ctx.try_reader().is_some());
        let reader = ctx.reader().await.unwrap();
        assert_eq!(reader.read().unwrap().payload(), b"hi");
    }

    #[tokio::test]
    async fn test_missing_segment_reports_unavailable() {
        let config = RelayConfig::default()
            .segment(format!("relay_ctx_missing_{}", std::process::id()))
            .open_policy_with(OpenPolicy {
                interval: Duration::from_millis(1),
                max_attempts: 2,
            });
        let ctx = RelayContext::new(config).unwrap();

        assert!(ctx.try_reader().is_none());
        assert!(matches!(
            ctx.reader().await,
            Err(RelayError::SegmentUnavailable { attempts: 2, .. })
        ));
        // A later call tries again rather than caching the failure
        assert!(ctx.reader().await.is_err());
        assert!(ctx.try_reader().is_none());
    }

    #[test]
    fn test_session_ids_increase() {
        let ctx = RelayContext::new(RelayConfig::default()).unwrap();
        assert_eq!(ctx.next_session_id(), 1);
        assert_eq!(ctx.next_session_id(), 2);
    }

    #[test]
    fn test_session_limit() {
        let ctx = RelayContext::new(RelayConfig::default().max_sessions(1)).unwrap();

        let first = ctx.try_acquire_session().unwrap();
        assert!(first.is_some());
        assert!(ctx.try_acquire_session().is_err());

        drop(first);
        assert!(ctx.try_acquire_session().is_ok());
    }

    #[test]
    fn test_unlimited_sessions() {
        let ctx = RelayContext::new(RelayConfig::default()).unwrap();
        assert!(matches!(ctx.try_acquire_session(), Ok(None)));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let zero_interval = RelayConfig::default().frame_interval(Duration::ZERO);
        assert!(matches!(
            RelayContext::new(zero_interval),
            Err(RelayError::Config(_))
        ));

        let seg = Arc::new(MemorySegment::new("mem", 64));
        let mut zero_channel = RelayConfig::default();
        zero_channel.channel_capacity = 0;
        assert!(matches!(
            RelayContext::with_segment(zero_channel, seg),
            Err(RelayError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_signal() {
        let ctx = RelayContext::new(RelayConfig::default()).unwrap();
        let mut rx = ctx.shutdown_signal();
        assert!(!ctx.is_shutting_down());

        ctx.shutdown();
        rx.wait_for(|stop| *stop).await.unwrap();
        assert!(ctx.is_shutting_down());
    }
}
