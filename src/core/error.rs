use thiserror::Error;

/// Registration/lookup failures raised by the tool registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool already registered: {0}")]
    DuplicateTool(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

/// A tool handler failed (returned an error or panicked).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

/// Session lifecycle and outbound stream failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("session {0} is closed")]
    SessionClosed(String),
    #[error("session {0} is already open")]
    AlreadyOpen(String),
    #[error("no active session")]
    NoSession,
    #[error("outbound stream write failed: {0}")]
    Write(String),
}

/// Failures of an inbound (POST) exchange, mapped onto the HTTP status.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("malformed message: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Malformed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_displays_transport_errors() {
        assert_eq!(TransportError::NoSession.to_string(), "no active session");
        assert_eq!(
            TransportError::SessionClosed("abc".into()).to_string(),
            "session abc is closed"
        );
    }

    #[test]
    fn it_wraps_transport_errors_transparently() {
        let gw: GatewayError = TransportError::NoSession.into();
        assert_eq!(gw.to_string(), "no active session");
    }

    #[test]
    fn it_converts_from_serde_json() {
        let bad = serde_json::from_str::<serde_json::Value>("{ not-json }").unwrap_err();
        let gw: GatewayError = bad.into();
        assert!(matches!(gw, GatewayError::Malformed(_)));
    }
}
