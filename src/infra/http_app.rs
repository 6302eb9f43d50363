use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Json, Router};
use serde_json::json;

use crate::api::sse;
use crate::infra::config::Config;
use crate::infra::runtime::dispatcher::MessageDispatcher;
use crate::infra::runtime::session::SessionManager;
use crate::tools::registry::ToolRegistry;

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManager,
    pub dispatcher: Arc<MessageDispatcher>,
    pub keep_alive: Duration,
    pub outbound_buffer: usize,
}

impl AppState {
    pub fn new(cfg: &Config, registry: ToolRegistry) -> Self {
        Self {
            sessions: SessionManager::new(cfg.session_policy),
            dispatcher: Arc::new(MessageDispatcher::new(Arc::new(registry))),
            keep_alive: cfg.keep_alive(),
            outbound_buffer: cfg.outbound_buffer,
        }
    }
}

/// `/` + `/healthz` + `/status`, and the SSE session endpoint at `/sse`.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { Json(json!({ "hello": "world" })) }))
        .route("/healthz", get(|| async { "ok" }))
        .route("/status", get(sse::status))
        .route(sse::SSE_PATH, get(sse::open_stream).post(sse::post_message))
        .with_state(state)
}
