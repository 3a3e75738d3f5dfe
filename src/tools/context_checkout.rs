//! Checkout tool.
//!
//! Lets the model re-anchor prompt-history construction to a tagged (or
//! directly referenced) node, recording a summary of the branch it leaves.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::context_log::parse_args;
use super::Tool;
use crate::error::ToolError;
use crate::session::SessionLog;
use crate::types::{FunctionDefinition, ToolDefinition};

#[derive(Debug, Default, Deserialize)]
struct ContextCheckoutArgs {
    /// Node id, id prefix, or tag name to anchor at.
    target: String,
    /// Summary of the branch being left behind.
    summary: String,
}

/// Tool exposing [`SessionLog::checkout`] to the model.
pub struct ContextCheckoutTool {
    log: Arc<Mutex<SessionLog>>,
}

impl ContextCheckoutTool {
    pub fn new(log: Arc<Mutex<SessionLog>>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl Tool for ContextCheckoutTool {
    fn name(&self) -> &'static str {
        "context_checkout"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: self.name().into(),
                description: "Re-anchor prompt history at an earlier node (by tag, node id, or \
                              unique id prefix). Everything before the target drops out of \
                              future prompts; the log itself is not modified. Provide a short \
                              summary of the thread being left."
                    .into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "target": {
                            "type": "string",
                            "description": "Tag name, node id, or unique id prefix to anchor at."
                        },
                        "summary": {
                            "type": "string",
                            "description": "Summary of the branch being left (max 800 chars)."
                        }
                    },
                    "required": ["target", "summary"],
                    "additionalProperties": false
                }),
            },
        }
    }

    async fn execute(&self, arguments: &str) -> Result<String, ToolError> {
        let args: ContextCheckoutArgs = parse_args(arguments)?;
        let outcome = self.log.lock().await.checkout(&args.target, &args.summary);
        serde_json::to_string(&outcome)
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to serialize outcome: {e}")))
    }
}
