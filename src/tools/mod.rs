pub mod numbers;
pub mod registry;

use std::sync::Arc;

use crate::core::error::RegistryError;
use registry::ToolRegistry;

/// Registry with the built-in tools. Fails only on a duplicate name.
pub fn build_registry() -> Result<ToolRegistry, RegistryError> {
    let mut reg = ToolRegistry::new();
    reg.register_tool(Arc::new(numbers::IsOddTool::default()))?;
    reg.register_tool(Arc::new(numbers::IsPrimeTool::default()))?;
    Ok(reg)
}
