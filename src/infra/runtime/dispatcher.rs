//! Turns inbound protocol messages into tool invocations and replies.

use std::sync::Arc;

use serde_json::{json, Value as J};

use crate::core::error::{HandlerError, TransportError};
use crate::core::mcp::{
    ErrorInfo, ErrorKind, InitializeResult, MessageKind, ProtocolMessage, ServerInfo,
};
use crate::core::schema;
use crate::infra::runtime::transport::SessionTransport;
use crate::tools::registry::ToolRegistry;

pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

pub struct MessageDispatcher {
    registry: Arc<ToolRegistry>,
    server_info: ServerInfo,
}

impl MessageDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry, server_info: ServerInfo::default() }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Reply for one inbound message, if it warrants one.
    pub async fn dispatch(&self, message: ProtocolMessage) -> Option<ProtocolMessage> {
        match message.kind() {
            MessageKind::Request => {}
            MessageKind::Notification => {
                tracing::debug!(method = ?message.method, "notification received");
                return None;
            }
            MessageKind::Response => {
                tracing::debug!(id = ?message.id, "client response ignored");
                return None;
            }
            MessageKind::Invalid => {
                tracing::warn!(msg = ?message, "invalid message");
                let id = message.id?;
                return Some(ProtocolMessage::error(
                    id,
                    ErrorInfo::new(ErrorKind::MethodNotFound, "message has no method"),
                ));
            }
        }

        let id = message.id.unwrap_or(J::Null);
        let method = message.method.unwrap_or_default();
        let params = message.params.unwrap_or(J::Null);
        tracing::debug!(id = %id, method = %method, "dispatching request");

        let outcome = match method.as_str() {
            "initialize" => Ok(self.initialize(&params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list()),
            "tools/call" => match params.get("name").and_then(J::as_str) {
                Some(name) => {
                    let args = params.get("arguments").cloned().unwrap_or(J::Null);
                    self.call_tool(name, args).await
                }
                None => Err(ErrorInfo::new(ErrorKind::InvalidInput, "missing tool name")),
            },
            _ => self.call_tool(&method, params).await,
        };

        Some(match outcome {
            Ok(result) => ProtocolMessage::ok(id, result),
            Err(error) => {
                tracing::warn!(id = %id, method = %method, kind = ?error.kind, error = %error.message, "request failed");
                ProtocolMessage::error(id, error)
            }
        })
    }

    /// Resolve, validate, then invoke. Validation strictly precedes invocation.
    async fn call_tool(&self, name: &str, args: J) -> Result<J, ErrorInfo> {
        let tool = self
            .registry
            .resolve(name)
            .map_err(|e| ErrorInfo::new(ErrorKind::UnknownTool, e.to_string()))?;
        let input = schema::validate(tool.input_schema(), &args)
            .map_err(|e| ErrorInfo::new(ErrorKind::InvalidInput, e.to_string()))?;

        // Own task: a panicking handler surfaces as a JoinError, and the
        // handler keeps running even if this future is dropped.
        let handle = tokio::spawn(async move { tool.call(input).await });
        let result = match handle.await {
            Ok(Ok(result)) => result,
            Ok(Err(msg)) => return Err(handler_error(HandlerError(msg))),
            Err(join) => return Err(handler_error(HandlerError(format!("handler aborted: {join}")))),
        };
        serde_json::to_value(result).map_err(|e| handler_error(HandlerError(e.to_string())))
    }

    fn initialize(&self, params: &J) -> J {
        let protocol_version = params
            .get("protocolVersion")
            .and_then(J::as_str)
            .unwrap_or(DEFAULT_PROTOCOL_VERSION)
            .to_string();
        let init = InitializeResult {
            protocol_version,
            capabilities: json!({ "tools": {} }),
            server_info: self.server_info.clone(),
        };
        serde_json::to_value(init).unwrap_or(J::Null)
    }

    fn tools_list(&self) -> J {
        let tools: Vec<J> = self
            .registry
            .list()
            .into_iter()
            .map(|t| json!({ "name": t.name, "description": t.description, "inputSchema": t.input_schema }))
            .collect();
        json!({ "tools": tools })
    }

    /// Drain `session`'s inbound queue until it closes. Each request runs on
    /// its own task, so replies may leave in any order; the `id` correlates.
    pub async fn run_session(self: Arc<Self>, session: Arc<SessionTransport>) {
        let Some(mut inbound) = session.take_inbound() else {
            tracing::warn!(session = %session.id(), "dispatch loop already running");
            return;
        };
        let cancel = session.cancellation();
        tracing::debug!(session = %session.id(), "dispatch loop started");

        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                next = inbound.recv() => match next {
                    Some(m) => m,
                    None => break,
                },
            };
            let dispatcher = self.clone();
            let session = session.clone();
            tokio::spawn(async move {
                let Some(reply) = dispatcher.dispatch(message).await else {
                    return;
                };
                match session.send(&reply).await {
                    Ok(()) => {}
                    Err(TransportError::SessionClosed(_)) => {
                        tracing::debug!(session = %session.id(), id = ?reply.id, "session closed; reply dropped");
                    }
                    Err(e) => {
                        tracing::warn!(session = %session.id(), id = ?reply.id, error = %e, "reply not delivered");
                    }
                }
            });
        }
        tracing::debug!(session = %session.id(), "dispatch loop finished");
    }
}

fn handler_error(e: HandlerError) -> ErrorInfo {
    ErrorInfo::new(ErrorKind::HandlerError, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::content::ToolResult;
    use crate::core::schema::{Field, Schema};
    use crate::core::tool::ToolSpec;
    use crate::infra::runtime::transport::test_support::RecordingSink;
    use crate::infra::runtime::transport::CloseReason;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn dispatcher() -> MessageDispatcher {
        MessageDispatcher::new(Arc::new(crate::tools::build_registry().unwrap()))
    }

    fn to_json(msg: ProtocolMessage) -> J {
        serde_json::to_value(msg).unwrap()
    }

    async fn dispatch_json(d: &MessageDispatcher, raw: J) -> J {
        let msg: ProtocolMessage = serde_json::from_value(raw).unwrap();
        to_json(d.dispatch(msg).await.expect("reply"))
    }

    #[tokio::test]
    async fn valid_call_returns_result() {
        let v = dispatch_json(&dispatcher(), json!({"id":"1","method":"isOdd","params":{"input":4}})).await;
        assert_eq!(
            v,
            json!({"jsonrpc":"2.0","id":"1","result":{"content":[{"type":"text","text":"The number 4 is even"}]}})
        );
    }

    #[tokio::test]
    async fn wrong_type_is_invalid_input() {
        let v = dispatch_json(&dispatcher(), json!({"id":"3","method":"isOdd","params":{"input":"x"}})).await;
        assert_eq!(v["id"], "3");
        assert_eq!(v["error"]["kind"], "InvalidInput");
        assert!(v.get("result").is_none());
    }

    #[tokio::test]
    async fn unknown_method_is_unknown_tool() {
        let v = dispatch_json(&dispatcher(), json!({"id":9,"method":"isEven","params":{"input":1}})).await;
        assert_eq!(v["id"], 9);
        assert_eq!(v["error"]["kind"], "UnknownTool");
        assert_eq!(v["error"]["code"], -32601);
    }

    fn counting_registry(calls: Arc<AtomicUsize>) -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(
            "count",
            "counts invocations",
            Schema::object([Field::required("n", Schema::Integer)]),
            move |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(ToolResult::text("counted"))
                }
            },
        )
        .unwrap();
        reg
    }

    #[tokio::test]
    async fn handler_never_runs_on_invalid_input() {
        let calls = Arc::new(AtomicUsize::new(0));
        let d = MessageDispatcher::new(Arc::new(counting_registry(calls.clone())));
        let v = dispatch_json(&d, json!({"id":1,"method":"count","params":{"n":1.5}})).await;
        assert_eq!(v["error"]["kind"], "InvalidInput");
        let v = dispatch_json(&d, json!({"id":2,"method":"count","params":{}})).await;
        assert_eq!(v["error"]["kind"], "InvalidInput");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let v = dispatch_json(&d, json!({"id":3,"method":"count","params":{"n":2}})).await;
        assert!(v.get("error").is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct PanickingTool(Schema);

    impl ToolSpec for PanickingTool {
        fn name(&self) -> &str {
            "panics"
        }
        fn description(&self) -> &str {
            "always panics"
        }
        fn input_schema(&self) -> &Schema {
            &self.0
        }
    }

    #[async_trait::async_trait]
    impl crate::core::tool::Tool for PanickingTool {
        async fn call(&self, _input: J) -> Result<ToolResult, String> {
            panic!("kaboom")
        }
    }

    #[tokio::test]
    async fn handler_failures_become_error_replies() {
        let mut reg = ToolRegistry::new();
        reg.register("fails", "always fails", Schema::object([]), |_| async {
            Err::<ToolResult, _>("boom".to_string())
        })
        .unwrap();
        reg.register_tool(Arc::new(PanickingTool(Schema::object([])))).unwrap();
        let d = MessageDispatcher::new(Arc::new(reg));

        let v = dispatch_json(&d, json!({"id":1,"method":"fails"})).await;
        assert_eq!(v["error"]["kind"], "HandlerError");
        assert_eq!(v["error"]["message"], "boom");

        let v = dispatch_json(&d, json!({"id":2,"method":"panics"})).await;
        assert_eq!(v["error"]["kind"], "HandlerError");
        assert_eq!(v["id"], 2);
    }

    #[tokio::test]
    async fn tools_call_envelope_matches_direct_call() {
        let d = dispatcher();
        let v = dispatch_json(
            &d,
            json!({"id":5,"method":"tools/call","params":{"name":"isPrime","arguments":{"input":7}}}),
        )
        .await;
        assert_eq!(v["result"]["content"][0]["text"], "The number 7 is prime");

        let v = dispatch_json(&d, json!({"id":6,"method":"tools/call","params":{}})).await;
        assert_eq!(v["error"]["kind"], "InvalidInput");
    }

    #[tokio::test]
    async fn answers_initialize_ping_and_list() {
        let d = dispatcher();
        let v = dispatch_json(&d, json!({"id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26"}})).await;
        assert_eq!(v["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(v["result"]["serverInfo"]["name"], "sse-tool-gateway");

        let v = dispatch_json(&d, json!({"id":2,"method":"ping"})).await;
        assert_eq!(v["result"], json!({}));

        let v = dispatch_json(&d, json!({"id":3,"method":"tools/list"})).await;
        assert_eq!(v["result"]["tools"][0]["name"], "isOdd");
        assert_eq!(v["result"]["tools"][0]["inputSchema"]["properties"]["input"]["type"], "number");
    }

    #[tokio::test]
    async fn notifications_and_responses_get_no_reply() {
        let d = dispatcher();
        assert!(d.dispatch(ProtocolMessage::notification("notifications/initialized", None)).await.is_none());
        assert!(d.dispatch(ProtocolMessage::ok(json!(1), json!({}))).await.is_none());
    }

    #[tokio::test]
    async fn run_session_replies_on_the_stream() {
        let sink = RecordingSink::default();
        let session = Arc::new(SessionTransport::new());
        session.open(Box::new(sink.clone())).await.unwrap();
        let loop_task = tokio::spawn(Arc::new(dispatcher()).run_session(session.clone()));

        session
            .accept_inbound(ProtocolMessage::request(json!("a"), "isOdd", json!({"input": 3})))
            .unwrap();
        session
            .accept_inbound(ProtocolMessage::request(json!("b"), "nope", json!({})))
            .unwrap();

        for _ in 0..100 {
            if sink.messages().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let mut replies = sink.messages();
        replies.sort_by_key(|m| m["id"].as_str().unwrap_or_default().to_string());
        assert_eq!(replies[0]["result"]["content"][0]["text"], "The number 3 is odd");
        assert_eq!(replies[1]["error"]["kind"], "UnknownTool");

        session.close(CloseReason::ClientDisconnected);
        tokio::time::timeout(Duration::from_secs(1), loop_task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn reply_is_dropped_when_session_closes_mid_call() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let finished = Arc::new(AtomicUsize::new(0));
        let mut reg = ToolRegistry::new();
        {
            let gate = gate.clone();
            let finished = finished.clone();
            reg.register("slow", "waits for the gate", Schema::object([]), move |_| {
                let gate = gate.clone();
                let finished = finished.clone();
                async move {
                    gate.notified().await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(ToolResult::text("done"))
                }
            })
            .unwrap();
        }

        let sink = RecordingSink::default();
        let session = Arc::new(SessionTransport::new());
        session.open(Box::new(sink.clone())).await.unwrap();
        tokio::spawn(Arc::new(MessageDispatcher::new(Arc::new(reg))).run_session(session.clone()));

        session
            .accept_inbound(ProtocolMessage::request(json!(1), "slow", json!({})))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.close(CloseReason::ClientDisconnected);
        gate.notify_one();

        for _ in 0..100 {
            if finished.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1, "handler ran to completion");
        assert!(sink.messages().is_empty(), "no reply on a closed session");
    }
}
