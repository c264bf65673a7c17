//! mjpeg-shm-relay
//!
//! Run with: mjpeg-shm-relay [--config config.toml] [--bind ADDR] [--segment NAME]
//!
//! Open `http://<host>:<port>/` in a browser, or point any MJPEG client at
//! `/VideoStream`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mjpeg_shm_relay::{RelayConfig, RelayServer};

#[derive(Debug, Parser)]
#[command(name = "mjpeg-shm-relay", version, about)]
struct Cli {
    /// TOML config file ([relay] table, or [viewer.web] port)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Shared memory segment name
    #[arg(short, long)]
    segment: Option<String>,

    /// Segment size in bytes
    #[arg(long)]
    capacity: Option<usize>,

    /// Milliseconds between frames per client
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Maximum concurrent stream clients (0 = unlimited)
    #[arg(long)]
    max_sessions: Option<usize>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<RelayConfig> {
        let mut config = match self.config {
            Some(ref path) => RelayConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => RelayConfig::default(),
        };

        if let Some(bind) = self.bind {
            config = config.bind(bind);
        }
        if let Some(segment) = self.segment {
            config = config.segment(segment);
        }
        if let Some(capacity) = self.capacity {
            config = config.capacity(capacity);
        }
        if let Some(ms) = self.interval_ms {
            config = config.frame_interval(Duration::from_millis(ms));
        }
        if let Some(max) = self.max_sessions {
            config = config.max_sessions(max);
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config()?;
    tracing::debug!(config = ?config, "Configuration loaded");

    let server = RelayServer::new(config).context("invalid configuration")?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("relay server failed")?;

    Ok(())
}
