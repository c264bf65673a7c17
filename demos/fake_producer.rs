//! Stand-in for the encoder: publishes JPEG files into the shared segment
//!
//! Run with: cargo run --example fake_producer [SEGMENT_NAME] [JPEG...]
//!
//! Examples:
//!   cargo run --example fake_producer                              # placeholder payloads
//!   cargo run --example fake_producer srm_viewer_web_armor a.jpg b.jpg
//!
//! Files are cycled at ~30 fps until Ctrl+C, then the segment is unlinked.

use std::time::Duration;

use mjpeg_shm_relay::server::config::{DEFAULT_SEGMENT_CAPACITY, DEFAULT_SEGMENT_NAME};
use mjpeg_shm_relay::shm::SegmentWriter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let name = args.next().unwrap_or_else(|| DEFAULT_SEGMENT_NAME.to_string());

    let mut frames = Vec::new();
    for path in args {
        frames.push(std::fs::read(&path)?);
        tracing::info!(path = %path, "Loaded frame");
    }
    if frames.is_empty() {
        tracing::warn!("No JPEG files given; publishing placeholder payloads");
    }

    let writer = SegmentWriter::create(&name, DEFAULT_SEGMENT_CAPACITY)?;
    tracing::info!(segment = writer.name(), capacity = writer.capacity(), "Producing frames");

    let mut ticker = tokio::time::interval(Duration::from_millis(33));
    let mut counter: u64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {}
        }

        let result = if frames.is_empty() {
            writer.write_frame(format!("frame {}", counter).as_bytes())
        } else {
            writer.write_frame(&frames[(counter as usize) % frames.len()])
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Frame dropped");
        }
        counter += 1;
    }

    writer.unlink()?;
    tracing::info!(frames = counter, "Producer stopped");
    Ok(())
}
