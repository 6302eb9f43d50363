use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value as J;

use crate::core::content::ToolResult;
use crate::core::error::RegistryError;
use crate::core::schema::Schema;
use crate::core::tool::{FnTool, Tool};

/// Named tool definitions. Populated at startup, then shared read-only.
#[derive(Default)]
pub struct ToolRegistry {
    by_name: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolMeta {
    pub name: String,
    pub description: String,
    pub input_schema: J,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Schema,
        handler: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult, String>> + Send + 'static,
    {
        self.register_tool(Arc::new(FnTool::new(name, description, input_schema, handler)))
    }

    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }
        tracing::debug!(tool = %name, "registered tool");
        self.order.push(name.clone());
        self.by_name.insert(name, tool);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, RegistryError> {
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    /// Tool metadata in registration order.
    pub fn list(&self) -> Vec<ToolMeta> {
        self.order
            .iter()
            .filter_map(|n| self.by_name.get(n))
            .map(|t| ToolMeta {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema().to_json_schema(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
