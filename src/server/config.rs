//! Relay configuration
//!
//! Built with defaults plus builder methods, or loaded from TOML:
//! ```toml
//! [relay]
//! bind = "0.0.0.0:5000"
//! segment_name = "srm_viewer_web_armor"
//! segment_capacity = 1048576
//! frame_interval_ms = 25
//!
//! [viewer.web]
//! port = 5000   # used when [relay] has no bind address
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{RelayError, Result};
use crate::shm::{OpenPolicy, HEADER_LEN};

/// Segment name used by the encoder
pub const DEFAULT_SEGMENT_NAME: &str = "srm_viewer_web_armor";

/// Segment size used by the encoder (1 MiB)
pub const DEFAULT_SEGMENT_CAPACITY: usize = 0x100000;

/// 40 samples per second
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(25);

/// Relay configuration options
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,

    /// Shared memory object name
    pub segment_name: String,

    /// Bytes to map from the segment
    pub segment_capacity: usize,

    /// Delay between samples within one session
    pub frame_interval: Duration,

    /// Delay between attempts to open a missing segment
    pub open_retry_interval: Duration,

    /// Open attempts before a session gives up (0 = wait for the producer)
    pub open_max_attempts: u32,

    /// Maximum concurrent stream sessions (0 = unlimited)
    pub max_sessions: usize,

    /// Encoded segments buffered between a session and its socket
    pub channel_capacity: usize,

    /// Text file served by the config endpoints
    pub config_path: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            segment_name: DEFAULT_SEGMENT_NAME.to_string(),
            segment_capacity: DEFAULT_SEGMENT_CAPACITY,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            open_retry_interval: Duration::from_millis(500),
            open_max_attempts: 0,
            max_sessions: 0, // Unlimited
            channel_capacity: 1,
            config_path: PathBuf::from("config.toml"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    relay: RelaySection,
    #[serde(default)]
    viewer: ViewerSection,
}

#[derive(Debug, Default, Deserialize)]
struct RelaySection {
    bind: Option<SocketAddr>,
    segment_name: Option<String>,
    segment_capacity: Option<usize>,
    frame_interval_ms: Option<u64>,
    open_retry_interval_ms: Option<u64>,
    open_max_attempts: Option<u32>,
    max_sessions: Option<usize>,
    channel_capacity: Option<usize>,
    config_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ViewerSection {
    #[serde(default)]
    web: WebSection,
}

#[derive(Debug, Default, Deserialize)]
struct WebSection {
    port: Option<u16>,
}

impl RelayConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Parse TOML text on top of the defaults
    ///
    /// Unknown tables and keys are ignored, so the encoder's own config file
    /// can be used as is.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: FileConfig =
            toml::from_str(text).map_err(|e| RelayError::Config(e.to_string()))?;

        let mut config = Self::default();
        if let Some(port) = file.viewer.web.port {
            config.bind_addr.set_port(port);
        }

        let relay = file.relay;
        if let Some(bind) = relay.bind {
            config.bind_addr = bind;
        }
        if let Some(name) = relay.segment_name {
            config.segment_name = name;
        }
        if let Some(capacity) = relay.segment_capacity {
            config.segment_capacity = capacity;
        }
        if let Some(ms) = relay.frame_interval_ms {
            config.frame_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = relay.open_retry_interval_ms {
            config.open_retry_interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = relay.open_max_attempts {
            config.open_max_attempts = attempts;
        }
        if let Some(max) = relay.max_sessions {
            config.max_sessions = max;
        }
        if let Some(capacity) = relay.channel_capacity {
            config.channel_capacity = capacity;
        }
        if let Some(path) = relay.config_path {
            config.config_path = path;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// Unless `[relay] config_path` says otherwise, the loaded file is also
    /// the one the config endpoints read and write.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let has_own_path = toml::from_str::<FileConfig>(&text)
            .map(|f| f.relay.config_path.is_some())
            .unwrap_or(false);

        let mut config = Self::from_toml_str(&text)?;
        if !has_own_path {
            config.config_path = path.to_path_buf();
        }
        Ok(config)
    }

    /// Check invariants once at startup
    pub fn validate(&self) -> Result<()> {
        if self.segment_name.trim_start_matches('/').is_empty() {
            return Err(RelayError::Config("segment name is empty".into()));
        }
        if self.segment_capacity < HEADER_LEN {
            return Err(RelayError::Config(format!(
                "segment capacity {} is smaller than the {}-byte header",
                self.segment_capacity, HEADER_LEN
            )));
        }
        if self.segment_capacity > u32::MAX as usize {
            return Err(RelayError::Config(format!(
                "segment capacity {} exceeds u32 frame_size range",
                self.segment_capacity
            )));
        }
        if self.frame_interval.is_zero() {
            return Err(RelayError::Config("frame interval must be non-zero".into()));
        }
        if self.channel_capacity == 0 {
            return Err(RelayError::Config("channel capacity must be non-zero".into()));
        }
        Ok(())
    }

    /// Retry policy for opening the segment
    pub fn open_policy(&self) -> OpenPolicy {
        OpenPolicy {
            interval: self.open_retry_interval,
            max_attempts: self.open_max_attempts,
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the segment name
    pub fn segment(mut self, name: impl Into<String>) -> Self {
        self.segment_name = name.into();
        self
    }

    /// Set the segment capacity
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.segment_capacity = capacity;
        self
    }

    /// Set the per-session sampling interval
    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Set the open retry policy
    pub fn open_policy_with(mut self, policy: OpenPolicy) -> Self {
        self.open_retry_interval = policy.interval;
        self.open_max_attempts = policy.max_attempts;
        self
    }

    /// Set maximum concurrent sessions
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the config passthrough file
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();

        assert_eq!(config.bind_addr.port(), 5000);
        assert_eq!(config.segment_name, "srm_viewer_web_armor");
        assert_eq!(config.segment_capacity, 1024 * 1024);
        assert_eq!(config.frame_interval, Duration::from_millis(25));
        assert_eq!(config.max_sessions, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let config = RelayConfig::with_addr(addr);

        assert_eq!(config.bind_addr, addr);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = RelayConfig::default()
            .bind(addr)
            .segment("cam0")
            .capacity(4096)
            .frame_interval(Duration::from_millis(50))
            .open_policy_with(OpenPolicy {
                interval: Duration::from_millis(10),
                max_attempts: 3,
            })
            .max_sessions(8)
            .config_path("/tmp/viewer.toml");

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.segment_name, "cam0");
        assert_eq!(config.segment_capacity, 4096);
        assert_eq!(config.frame_interval, Duration::from_millis(50));
        assert_eq!(config.open_policy().max_attempts, 3);
        assert_eq!(config.max_sessions, 8);
        assert_eq!(config.config_path, PathBuf::from("/tmp/viewer.toml"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(RelayConfig::default().capacity(3).validate().is_err());
        assert!(RelayConfig::default().segment("").validate().is_err());
        assert!(RelayConfig::default().segment("/").validate().is_err());
        assert!(RelayConfig::default()
            .frame_interval(Duration::ZERO)
            .validate()
            .is_err());

        let mut config = RelayConfig::default();
        config.channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_relay_section() {
        let config = RelayConfig::from_toml_str(
            r#"
            [relay]
            bind = "127.0.0.1:7000"
            segment_name = "cam1"
            segment_capacity = 65536
            frame_interval_ms = 40
            open_max_attempts = 5
            max_sessions = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(config.segment_name, "cam1");
        assert_eq!(config.segment_capacity, 65536);
        assert_eq!(config.frame_interval, Duration::from_millis(40));
        assert_eq!(config.open_max_attempts, 5);
        assert_eq!(config.max_sessions, 2);
    }

    #[test]
    fn test_from_toml_viewer_port_fallback() {
        let config = RelayConfig::from_toml_str(
            r#"
            mode = "mono"

            [viewer.web]
            port = 8080

            [autoaim]
            enabled = true
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.segment_name, DEFAULT_SEGMENT_NAME);
    }

    #[test]
    fn test_from_toml_invalid() {
        assert!(matches!(
            RelayConfig::from_toml_str("[relay]\nsegment_capacity = 2\n"),
            Err(RelayError::Config(_))
        ));
        assert!(matches!(
            RelayConfig::from_toml_str("not toml ="),
            Err(RelayError::Config(_))
        ));
    }

    #[test]
    fn test_load_uses_file_as_config_path() {
        let path = std::env::temp_dir().join(format!("relay_cfg_{}.toml", std::process::id()));
        std::fs::write(&path, "[viewer.web]\nport = 6000\n").unwrap();

        let config = RelayConfig::load(&path).unwrap();
        assert_eq!(config.bind_addr.port(), 6000);
        assert_eq!(config.config_path, path);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            RelayConfig::load("/nonexistent/relay.toml"),
            Err(RelayError::Config(_))
        ));
    }
}
