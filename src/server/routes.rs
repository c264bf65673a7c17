//! HTTP routes
//!
//! - `GET /`            viewer page
//! - `GET /VideoStream` MJPEG stream, one session per request
//! - `GET /config`      config file text
//! - `POST /save`       overwrite config file (form field `content`)
//! - `GET /stats`       relay counters as JSON

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Form, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::multipart::CONTENT_TYPE;
use crate::session::{RelayContext, StreamSession};
use crate::stats::StatsSnapshot;

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Build the relay router
pub fn router(ctx: Arc<RelayContext>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/VideoStream", get(video_stream))
        .route("/config", get(read_config))
        .route("/save", post(save_config))
        .route("/stats", get(stats))
        .with_state(ctx)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn video_stream(
    State(ctx): State<Arc<RelayContext>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    if ctx.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "relay is shutting down").into_response();
    }

    let permit = match ctx.try_acquire_session() {
        Ok(permit) => permit,
        Err(()) => {
            ctx.stats().session_rejected();
            tracing::warn!(peer = %peer, "Stream rejected: session limit reached");
            return (StatusCode::SERVICE_UNAVAILABLE, "session limit reached").into_response();
        }
    };

    let session = match StreamSession::open(Arc::clone(&ctx), Some(peer)).await {
        Ok(session) => session,
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("video stream unavailable: {}", e),
            )
                .into_response();
        }
    };

    let session_id = session.id();
    let (tx, rx) = mpsc::channel::<Bytes>(ctx.config().channel_capacity);

    tokio::spawn(async move {
        let _permit = permit;
        let summary = session.run(tx).await;
        tracing::info!(
            session_id = summary.id,
            peer = %peer,
            reason = ?summary.reason,
            frames_sent = summary.stats.frames_sent,
            fps = summary.stats.frame_rate(),
            "Stream session ended"
        );
    });

    tracing::info!(session_id = session_id, peer = %peer, "Stream session started");

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<Bytes, Infallible>));
    (
        [
            (header::CONTENT_TYPE, CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store"),
        ],
        body,
    )
        .into_response()
}

async fn read_config(State(ctx): State<Arc<RelayContext>>) -> Response {
    match ctx.config_store().read().await {
        Ok(text) => text.into_response(),
        Err(e) => {
            tracing::warn!(path = %ctx.config_store().path().display(), error = %e, "Failed to read config file");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct SaveForm {
    content: String,
}

async fn save_config(
    State(ctx): State<Arc<RelayContext>>,
    Form(form): Form<SaveForm>,
) -> Response {
    match ctx.config_store().write(&form.content).await {
        Ok(()) => Json(serde_json::json!({ "status": "success" })).into_response(),
        Err(e) => {
            tracing::warn!(path = %ctx.config_store().path().display(), error = %e, "Failed to write config file");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "status": "error", "message": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn stats(State(ctx): State<Arc<RelayContext>>) -> Json<StatsSnapshot> {
    Json(ctx.stats().snapshot())
}
