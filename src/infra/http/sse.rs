//! Server-Sent-Events framing for the outbound leg of a session.

use axum::response::sse::Event;

use crate::core::mcp::ProtocolMessage;

pub const EVENT_ENDPOINT: &str = "endpoint";
pub const EVENT_MESSAGE: &str = "message";

/// One SSE frame: an event name plus a (possibly multi-line) data payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self { event: event.into(), data: data.into() }
    }

    /// Tells the client where to POST its messages for this session.
    pub fn endpoint(path: &str, session_id: &str) -> Self {
        Self::new(EVENT_ENDPOINT, format!("{path}?sessionId={session_id}"))
    }

    pub fn message(msg: &ProtocolMessage) -> Result<Self, serde_json::Error> {
        Ok(Self::new(EVENT_MESSAGE, msg.to_wire()?))
    }

    /// SSE text form. Every payload line keeps its own `data:` prefix.
    pub fn encode(&self) -> String {
        let mut out = format!("event: {}\n", self.event);
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line.strip_suffix('\r').unwrap_or(line));
            out.push('\n');
        }
        out.push('\n');
        out
    }

    /// axum splits `data` on newlines itself but rejects carriage returns.
    pub fn into_event(self) -> Event {
        Event::default()
            .event(self.event)
            .data(self.data.replace('\r', ""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_single_line_message() {
        let f = SseFrame::message(&ProtocolMessage::ok(json!("1"), json!({"a": 1}))).unwrap();
        assert_eq!(
            f.encode(),
            "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":\"1\",\"result\":{\"a\":1}}\n\n"
        );
    }

    #[test]
    fn prefixes_every_line_of_multi_line_payload() {
        let f = SseFrame::new("message", "{\n  \"a\": 1\r\n}");
        assert_eq!(f.encode(), "event: message\ndata: {\ndata:   \"a\": 1\ndata: }\n\n");
    }

    #[tokio::test]
    async fn event_keeps_data_prefix_on_every_line() {
        use axum::response::sse::Sse;
        use axum::response::IntoResponse;
        use std::convert::Infallible;

        let event = SseFrame::new("message", "{\n  \"a\": 1\r\n}").into_event();
        let body = Sse::new(tokio_stream::iter([Ok::<_, Infallible>(event)]))
            .into_response()
            .into_body();
        let bytes = axum::body::to_bytes(body, 1024).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();

        assert!(text.contains("event: message\n"), "{text:?}");
        assert!(text.contains("data: {\ndata:   \"a\": 1\ndata: }\n"), "{text:?}");
        assert!(!text.contains('\r'));
    }

    #[test]
    fn endpoint_frame_carries_session_id() {
        let f = SseFrame::endpoint("/sse", "abc");
        assert_eq!(f.encode(), "event: endpoint\ndata: /sse?sessionId=abc\n\n");
    }
}
