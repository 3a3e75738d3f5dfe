//! Pluggable tool system.
//!
//! Tools are async trait objects that the model can invoke during a turn.
//! Each tool provides its own OpenAI-style function definition and an async
//! execute method. The built-in context tools expose the session log to the
//! model itself.

pub mod context_checkout;
pub mod context_log;
pub mod context_tag;

use crate::error::ToolError;
use crate::session::SessionLog;
use crate::types::ToolDefinition;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

pub use context_checkout::ContextCheckoutTool;
pub use context_log::ContextLogTool;
pub use context_tag::ContextTagTool;

/// Register the three built-in context tools against a shared session log.
pub fn register_context_tools(registry: &mut ToolRegistry, log: &Arc<Mutex<SessionLog>>) {
    registry.register(ContextLogTool::new(Arc::clone(log)));
    registry.register(ContextTagTool::new(Arc::clone(log)));
    registry.register(ContextCheckoutTool::new(Arc::clone(log)));
}

// ---------------------------------------------------------------------------
// Tool trait
// ---------------------------------------------------------------------------

/// A tool that can be invoked by the AI model.
///
/// Implement this trait to add custom tools. Register instances with
/// [`ToolRegistry`] before creating the orchestrator.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name matching what the model will call.
    fn name(&self) -> &'static str;

    /// OpenAI-format tool definition for inclusion in requests.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given JSON arguments string.
    /// Returns a text result to send back to the model.
    async fn execute(&self, arguments: &str) -> Result<String, ToolError>;
}

// ---------------------------------------------------------------------------
// Tool registry
// ---------------------------------------------------------------------------

/// Registry of available tools.
///
/// The orchestrator publishes all registered tool definitions with each
/// request and dispatches tool calls through this registry.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.push(Box::new(tool));
    }

    /// Get tool definitions for the request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Find a tool by name and execute it.
    pub async fn execute(&self, name: &str, arguments: &str) -> Result<String, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| ToolError::ExecutionFailed(format!("unknown tool: {name}")))?;
        tool.execute(arguments).await
    }

    /// True if no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
