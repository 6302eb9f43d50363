//! JSON-RPC-like protocol surface shared by the transport and the dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value as J;

pub const JSONRPC_VERSION: &str = "2.0";

pub const CODE_METHOD_NOT_FOUND: i32 = -32601;
pub const CODE_INVALID_PARAMS: i32 = -32602;
pub const CODE_TOOL_ERROR: i32 = -32000;

/// One unit of exchange in either direction. Requests carry `id` + `method`,
/// notifications only `method`, responses `id` + `result` or `error`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProtocolMessage {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<J>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<J>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<J>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Notification,
    Response,
    Invalid,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    pub code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownTool,
    InvalidInput,
    HandlerError,
    MethodNotFound,
}

impl ErrorKind {
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::UnknownTool | ErrorKind::MethodNotFound => CODE_METHOD_NOT_FOUND,
            ErrorKind::InvalidInput => CODE_INVALID_PARAMS,
            ErrorKind::HandlerError => CODE_TOOL_ERROR,
        }
    }
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { code: kind.code(), kind: Some(kind), message: message.into() }
    }
}

impl ProtocolMessage {
    pub fn request(id: J, method: impl Into<String>, params: J) -> Self {
        Self {
            jsonrpc: default_version(),
            id: Some(id),
            method: Some(method.into()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<J>) -> Self {
        Self {
            jsonrpc: default_version(),
            id: None,
            method: Some(method.into()),
            params,
            result: None,
            error: None,
        }
    }

    pub fn ok(id: J, result: J) -> Self {
        Self {
            jsonrpc: default_version(),
            id: Some(id),
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: J, error: ErrorInfo) -> Self {
        Self {
            jsonrpc: default_version(),
            id: Some(id),
            method: None,
            params: None,
            result: None,
            error: Some(error),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match (&self.id, &self.method) {
            (Some(_), Some(_)) => MessageKind::Request,
            (None, Some(_)) => MessageKind::Notification,
            (Some(_), None) if self.result.is_some() != self.error.is_some() => MessageKind::Response,
            _ => MessageKind::Invalid,
        }
    }

    /// Single-line JSON encoding; never contains a raw newline.
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_wire(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}

// --- Initialize result ---

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: J,
    pub server_info: ServerInfo,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
