use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Deserialize;

use crate::core::error::TransportError;
use crate::core::mcp::ProtocolMessage;
use crate::infra::runtime::transport::{
    CloseReason, OutboundSink, SessionId, SessionInfo, SessionTransport,
};

/// What happens to live sessions when a new stream is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPolicy {
    /// Last writer wins: a new session supersedes every other one.
    #[default]
    #[serde(rename = "single")]
    SingleActive,
    Concurrent,
}

impl FromStr for SessionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(SessionPolicy::SingleActive),
            "concurrent" => Ok(SessionPolicy::Concurrent),
            other => Err(format!("unknown session policy: {other}")),
        }
    }
}

#[derive(Default)]
struct Slots {
    sessions: HashMap<SessionId, Arc<SessionTransport>>,
    latest: Option<SessionId>,
}

/// Owns the live sessions and routes inbound traffic to them.
///
/// Start/end run under one mutex and never await while holding it.
#[derive(Clone, Default)]
pub struct SessionManager {
    policy: SessionPolicy,
    slots: Arc<Mutex<Slots>>,
}

impl SessionManager {
    pub fn new(policy: SessionPolicy) -> Self {
        Self { policy, slots: Arc::default() }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Open a new session on `sink` and make it the current one.
    pub async fn start_session(
        &self,
        sink: Box<dyn OutboundSink>,
    ) -> Result<Arc<SessionTransport>, TransportError> {
        let session = Arc::new(SessionTransport::new());
        session.open(sink).await?;

        let superseded: Vec<Arc<SessionTransport>> = {
            let mut slots = self.slots();
            let old = match self.policy {
                SessionPolicy::SingleActive => slots.sessions.drain().map(|(_, s)| s).collect(),
                SessionPolicy::Concurrent => Vec::new(),
            };
            slots.sessions.insert(session.id().clone(), session.clone());
            slots.latest = Some(session.id().clone());
            old
        };
        for old in superseded {
            tracing::info!(old = %old.id(), new = %session.id(), "superseding session");
            old.close(CloseReason::Superseded);
        }
        Ok(session)
    }

    /// Route `message` to the session named by `target`, or to the most recent one.
    pub fn deliver(
        &self,
        target: Option<&SessionId>,
        message: ProtocolMessage,
    ) -> Result<(), TransportError> {
        let session = match target {
            Some(id) => self.get(id),
            None => self.current(),
        };
        match session {
            Some(s) => s.accept_inbound(message),
            None => {
                tracing::warn!(session = ?target.map(SessionId::as_str), "no session for inbound message");
                Err(TransportError::NoSession)
            }
        }
    }

    /// Close and forget session `id`. Other sessions are never touched.
    pub fn end_session(&self, id: &SessionId, reason: CloseReason) -> bool {
        let removed = {
            let mut slots = self.slots();
            let removed = slots.sessions.remove(id);
            if slots.latest.as_ref() == Some(id) {
                slots.latest = slots
                    .sessions
                    .values()
                    .max_by_key(|s| s.info().opened_at)
                    .map(|s| s.id().clone());
            }
            removed
        };
        match removed {
            Some(s) => {
                s.close(reason);
                true
            }
            None => false,
        }
    }

    pub fn shutdown(&self) {
        let all: Vec<Arc<SessionTransport>> = {
            let mut slots = self.slots();
            slots.latest = None;
            slots.sessions.drain().map(|(_, s)| s).collect()
        };
        for s in all {
            s.close(CloseReason::Shutdown);
        }
    }

    pub fn current(&self) -> Option<Arc<SessionTransport>> {
        let slots = self.slots();
        slots.latest.as_ref().and_then(|id| slots.sessions.get(id)).cloned()
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionTransport>> {
        self.slots().sessions.get(id).cloned()
    }

    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let mut out: Vec<SessionInfo> = self.slots().sessions.values().map(|s| s.info()).collect();
        out.sort_by_key(|i| i.opened_at);
        out
    }
}
