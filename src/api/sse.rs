//! HTTP legs of a session: `GET /sse` opens the outbound stream, `POST /sse`
//! carries one inbound message onto it.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_util::sync::WaitForCancellationFutureOwned;

use crate::core::error::GatewayError;
use crate::core::mcp::ProtocolMessage;
use crate::infra::http::sse::SseFrame;
use crate::infra::http_app::AppState;
use crate::infra::runtime::session::SessionManager;
use crate::infra::runtime::transport::{ChannelSink, CloseReason, SessionId};

pub const SSE_PATH: &str = "/sse";

/// Ends the session when the response stream is dropped, i.e. the client went away.
struct DisconnectGuard {
    sessions: SessionManager,
    id: SessionId,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self.sessions.end_session(&self.id, CloseReason::ClientDisconnected) {
            tracing::info!(session = %self.id, "SSE connection closed");
        }
    }
}

/// Outbound frames of one session; finishes once the session is closed.
struct SessionStream {
    frames: mpsc::Receiver<SseFrame>,
    closed: Pin<Box<WaitForCancellationFutureOwned>>,
    _guard: DisconnectGuard,
}

impl Stream for SessionStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.closed.as_mut().poll(cx).is_ready() {
            return Poll::Ready(None);
        }
        self.frames
            .poll_recv(cx)
            .map(|frame| frame.map(|f| Ok(f.into_event())))
    }
}

pub async fn open_stream(State(state): State<AppState>) -> Response {
    tracing::info!("SSE connection requested");
    let (sink, frames) = ChannelSink::channel(state.outbound_buffer);
    let session = match state.sessions.start_session(Box::new(sink)).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to start session");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() })))
                .into_response();
        }
    };

    let guard = DisconnectGuard { sessions: state.sessions.clone(), id: session.id().clone() };
    if let Err(e) = session
        .send_frame(SseFrame::endpoint(SSE_PATH, session.id().as_str()))
        .await
    {
        tracing::error!(session = %session.id(), error = %e, "failed to announce endpoint");
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() })))
            .into_response();
    }

    tokio::spawn(state.dispatcher.clone().run_session(session.clone()));
    tracing::info!(session = %session.id(), "SSE transport created");

    let stream = SessionStream {
        frames,
        closed: Box::pin(session.cancellation().cancelled_owned()),
        _guard: guard,
    };
    let sse = Sse::new(stream).keep_alive(KeepAlive::new().interval(state.keep_alive));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        sse,
    )
        .into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct PostTarget {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

pub async fn post_message(
    State(state): State<AppState>,
    Query(target): Query<PostTarget>,
    body: Bytes,
) -> Response {
    tracing::debug!(session = ?target.session_id, bytes = body.len(), "POST to /sse");
    match route_inbound(&state, &target, &body) {
        Ok(()) => (StatusCode::OK, "Accepted").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "inbound message rejected");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() })))
                .into_response()
        }
    }
}

fn route_inbound(state: &AppState, target: &PostTarget, body: &[u8]) -> Result<(), GatewayError> {
    let message = ProtocolMessage::from_wire(body)?;
    let id = target.session_id.as_deref().map(SessionId::from);
    state.sessions.deliver(id.as_ref(), message)?;
    Ok(())
}

pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let tools: Vec<String> = state.dispatcher.registry().list().into_iter().map(|t| t.name).collect();
    Json(json!({
        "policy": format!("{:?}", state.sessions.policy()),
        "sessions": state.sessions.snapshot(),
        "tools": tools,
    }))
}
