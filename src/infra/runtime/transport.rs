//! One logical duplex channel: an outbound SSE stream plus an inbound queue
//! fed by POSTed messages.

use std::fmt;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::error::TransportError;
use crate::core::mcp::ProtocolMessage;
use crate::infra::http::sse::SseFrame;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientDisconnected,
    Superseded,
    WriteFailed,
    Shutdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub opened_at: DateTime<Utc>,
    pub state: SessionState,
}

/// Write destination for outbound frames.
#[async_trait]
pub trait OutboundSink: Send {
    async fn write(&mut self, frame: SseFrame) -> Result<(), String>;
}

/// Sink backed by a bounded channel whose receiver feeds the HTTP response body.
pub struct ChannelSink {
    tx: mpsc::Sender<SseFrame>,
}

impl ChannelSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SseFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl OutboundSink for ChannelSink {
    async fn write(&mut self, frame: SseFrame) -> Result<(), String> {
        tracing::trace!(frame = %frame.encode().trim_end(), "frame queued");
        self.tx
            .send(frame)
            .await
            .map_err(|_| "event stream receiver dropped".to_string())
    }
}

pub struct SessionTransport {
    id: SessionId,
    opened_at: DateTime<Utc>,
    state: StdMutex<SessionState>,
    // Async lock held across a write: frames leave in the order `send` was called.
    sink: Mutex<Option<Box<dyn OutboundSink>>>,
    inbound_tx: mpsc::UnboundedSender<ProtocolMessage>,
    inbound_rx: StdMutex<Option<mpsc::UnboundedReceiver<ProtocolMessage>>>,
    cancel: CancellationToken,
}

impl SessionTransport {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            id: SessionId::generate(),
            opened_at: Utc::now(),
            state: StdMutex::new(SessionState::Connecting),
            sink: Mutex::new(None),
            inbound_tx,
            inbound_rx: StdMutex::new(Some(inbound_rx)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo { id: self.id.clone(), opened_at: self.opened_at, state: self.state() }
    }

    /// Fires once the session is closed, whatever the reason.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Bind the outbound sink and move Connecting -> Open.
    pub async fn open(&self, sink: Box<dyn OutboundSink>) -> Result<(), TransportError> {
        let mut slot = self.sink.lock().await;
        {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            match *state {
                SessionState::Connecting => *state = SessionState::Open,
                SessionState::Open => return Err(TransportError::AlreadyOpen(self.id.to_string())),
                SessionState::Closed => return Err(TransportError::SessionClosed(self.id.to_string())),
            }
        }
        *slot = Some(sink);
        tracing::info!(session = %self.id, "session open");
        Ok(())
    }

    /// Serialize `message` as one `message` frame on the outbound stream.
    pub async fn send(&self, message: &ProtocolMessage) -> Result<(), TransportError> {
        let frame = SseFrame::message(message).map_err(|e| TransportError::Write(e.to_string()))?;
        self.send_frame(frame).await
    }

    pub async fn send_frame(&self, frame: SseFrame) -> Result<(), TransportError> {
        if self.state() != SessionState::Open {
            return Err(self.closed_error());
        }
        let mut slot = self.sink.lock().await;
        // Re-check under the lock: close() may have run while we queued.
        if self.state() != SessionState::Open {
            slot.take();
            return Err(self.closed_error());
        }
        let Some(sink) = slot.as_mut() else {
            return Err(self.closed_error());
        };

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            res = sink.write(frame) => Some(res),
        };
        match outcome {
            Some(Ok(())) => Ok(()),
            None => {
                slot.take();
                Err(self.closed_error())
            }
            Some(Err(e)) => {
                slot.take();
                drop(slot);
                tracing::warn!(session = %self.id, error = %e, "outbound write failed; closing session");
                self.close(CloseReason::WriteFailed);
                Err(TransportError::Write(e))
            }
        }
    }

    /// Hand a POSTed message to this session's dispatch loop.
    pub fn accept_inbound(&self, message: ProtocolMessage) -> Result<(), TransportError> {
        if self.state() != SessionState::Open {
            return Err(self.closed_error());
        }
        self.inbound_tx.send(message).map_err(|_| self.closed_error())
    }

    /// The inbound queue; yields `Some` exactly once.
    pub fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<ProtocolMessage>> {
        self.inbound_rx.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    /// Move to Closed and release the sink. Returns false if already closed.
    pub fn close(&self, reason: CloseReason) -> bool {
        {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            if *state == SessionState::Closed {
                return false;
            }
            *state = SessionState::Closed;
        }
        self.cancel.cancel();
        // A sender holding the lock drops the sink itself on its re-check.
        if let Ok(mut slot) = self.sink.try_lock() {
            slot.take();
        }
        tracing::info!(session = %self.id, reason = ?reason, "session closed");
        true
    }

    fn closed_error(&self) -> TransportError {
        TransportError::SessionClosed(self.id.to_string())
    }
}

impl Default for SessionTransport {
    fn default() -> Self {
        Self::new()
    }
}
