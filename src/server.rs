use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::config::Config;
use crate::handler::{self, HandlerResponse};
use crate::telegram::Notifier;

// ── Shared state ───────────────────────────────────────────────────────────────

/// Immutable per-process state shared by every invocation.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(config: Config, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config: Arc::new(config),
            notifier,
        }
    }
}

// ── Handlers ───────────────────────────────────────────────────────────────────

/// Telegram posts the update directly; wrap it as `{"body": ...}` for the pipeline.
async fn webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let event = match std::str::from_utf8(&body) {
        Ok(text) => json!({ "body": text }),
        Err(_) => Value::Null,
    };
    let response = handler::handle(&event, &state.config, state.notifier.as_ref()).await;
    into_http(response)
}

/// Serverless-style invocation: the request body is the event itself and the
/// reply is the `{statusCode, body}` envelope.
async fn invoke(State(state): State<AppState>, body: Bytes) -> Json<HandlerResponse> {
    let event: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    Json(handler::handle(&event, &state.config, state.notifier.as_ref()).await)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn into_http(response: HandlerResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        response.body,
    )
        .into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/invoke", post(invoke))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            log_shutdown_signal(tokio::signal::ctrl_c().await);
        })
        .await
        .context("Server error")?;

    Ok(())
}

/// Returns whether a real Ctrl-C was received. A failed handler install is
/// logged and still ends the server.
fn log_shutdown_signal(result: std::io::Result<()>) -> bool {
    match result {
        Ok(()) => {
            info!("Shutdown signal received");
            true
        }
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            false
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
