use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as J;

use crate::core::content::ToolResult;
use crate::core::schema::Schema;

/// Minimal metadata every tool must expose.
pub trait ToolSpec {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> &Schema;
}

/// Tool = Spec + handler. `call` only ever sees input that passed `input_schema`.
#[async_trait]
pub trait Tool: ToolSpec + Send + Sync {
    async fn call(&self, input: J) -> Result<ToolResult, String>;
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<ToolResult, String>> + Send>>;

/// Adapts an async closure into a [`Tool`] so tools can be registered inline.
pub struct FnTool {
    name: String,
    description: String,
    schema: Schema,
    handler: Arc<dyn Fn(J) -> HandlerFuture + Send + Sync>,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Schema,
        handler: F,
    ) -> Self
    where
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult, String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler: Arc::new(move |input: J| -> HandlerFuture { Box::pin(handler(input)) }),
        }
    }
}

impl ToolSpec for FnTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn input_schema(&self) -> &Schema {
        &self.schema
    }
}

#[async_trait]
impl Tool for FnTool {
    async fn call(&self, input: J) -> Result<ToolResult, String> {
        (self.handler)(input).await
    }
}
