//! HTTP listener for the peer.
//!
//! One endpoint serves two kinds of traffic:
//! - `REQSYNC /` carries a change notification, handed to the dispatcher
//! - `GET /<path>` downloads a file from the sync root (how the peer fetches)
//!
//! Each connection runs on its own task, so a slow fetch triggered by one
//! notification does not hold up the others.

use crate::dispatcher::SyncDispatcher;
use crate::notifier::SYNC_METHOD;
use anyhow::Result;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Request, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use mirror_core::{SyncResponse, now_secs_f64};
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Maximum notification body size (1MB); envelopes are a few hundred bytes.
pub const MAX_ENVELOPE_SIZE: usize = 1024 * 1024;

/// Shared listener state.
pub struct ListenerState {
    /// Receive-side engine
    pub dispatcher: SyncDispatcher,
    /// Ack mode (true) or echo mode (false)
    pub send_ack: bool,
    /// Directory served to the peer for fetches
    pub serve_dir: PathBuf,
}

/// Build the listener router.
pub fn router(state: Arc<ListenerState>) -> Router {
    Router::new()
        .fallback(handle_request)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind to an address and return the TCP listener.
pub async fn bind(listen_addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(listen_addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Serve until `shutdown` resolves. In-flight requests are allowed to finish.
pub async fn serve<F>(listener: TcpListener, state: Arc<ListenerState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Listener stopped");
    Ok(())
}

async fn handle_request(State(state): State<Arc<ListenerState>>, request: Request) -> Response {
    if request.method().as_str() == SYNC_METHOD {
        let body = match axum::body::to_bytes(request.into_body(), MAX_ENVELOPE_SIZE).await {
            Ok(body) => body,
            Err(e) => {
                debug!("Failed to read sync body: {}", e);
                return reply(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    vec![format!("could not read body: {}", e)],
                );
            }
        };
        return handle_sync(&state, body).await;
    }

    let method = request.method().clone();
    match method {
        Method::GET | Method::HEAD => {
            match ServeDir::new(&state.serve_dir).oneshot(request).await {
                Ok(response) => response.into_response(),
                Err(never) => match never {},
            }
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

async fn handle_sync(state: &ListenerState, body: Bytes) -> Response {
    let envelope: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            return reply(
                StatusCode::BAD_REQUEST,
                vec![format!("body is not valid JSON: {}", e)],
            );
        }
    };

    info!("Received REQSYNC: {}", envelope);
    let report = state.dispatcher.handle(&envelope).await;
    info!("Processed REQSYNC; errors: {:?}", report.errors);

    let response = if state.send_ack {
        SyncResponse::ack(report.errors, now_secs_f64())
    } else {
        SyncResponse::echo(report.errors, envelope)
    };
    (StatusCode::OK, Json(response)).into_response()
}

fn reply(status: StatusCode, errors: Vec<String>) -> Response {
    (status, Json(SyncResponse::ack(errors, now_secs_f64()))).into_response()
}
