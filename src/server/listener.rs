//! Relay HTTP server
//!
//! Binds the listener, serves the routes and ties the relay context's
//! shutdown signal to axum's graceful shutdown so open streams end promptly.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::error::Result;
use crate::server::config::RelayConfig;
use crate::server::routes;
use crate::session::RelayContext;

/// MJPEG relay server
pub struct RelayServer {
    ctx: Arc<RelayContext>,
}

impl RelayServer {
    /// Create a new server with the given configuration
    ///
    /// Fails if the configuration does not validate.
    pub fn new(config: RelayConfig) -> Result<Self> {
        Ok(Self::with_context(Arc::new(RelayContext::new(config)?)))
    }

    /// Create a server around an existing context
    pub fn with_context(ctx: Arc<RelayContext>) -> Self {
        Self { ctx }
    }

    /// Shared relay context
    pub fn context(&self) -> &Arc<RelayContext> {
        &self.ctx
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.ctx.config().bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the server fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.bind_addr()).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            addr = %addr,
            segment = %self.ctx.config().segment_name,
            capacity = self.ctx.config().segment_capacity,
            "MJPEG relay listening"
        );

        let warmup = self.spawn_segment_warmup();

        let ctx = Arc::clone(&self.ctx);
        let app = routes::router(Arc::clone(&self.ctx))
            .into_make_service_with_connect_info::<SocketAddr>();

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Shutdown signal received");
                ctx.shutdown();
            })
            .await;

        warmup.abort();
        result?;

        tracing::info!("MJPEG relay stopped");
        Ok(())
    }

    /// Open the segment in the background so the first viewer does not wait
    fn spawn_segment_warmup(&self) -> tokio::task::JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);

        tokio::spawn(async move {
            if ctx.try_reader().is_some() {
                return;
            }
            tracing::info!(
                segment = %ctx.config().segment_name,
                "Waiting for producer to create shared memory segment"
            );
            match ctx.reader().await {
                Ok(reader) => {
                    tracing::info!(segment = reader.segment().name(), "Shared memory segment ready")
                }
                Err(e) => tracing::error!(
                    segment = %ctx.config().segment_name,
                    error = %e,
                    "Shared memory segment unavailable"
                ),
            }
        })
    }
}
