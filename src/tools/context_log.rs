//! Context-log introspection tool.
//!
//! Lets the model inspect its own session context log: node counts, the
//! active anchor, recent nodes with their tags, and recent checkouts.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::Tool;
use crate::error::ToolError;
use crate::session::SessionLog;
use crate::types::{FunctionDefinition, ToolDefinition};

/// Recent-node window when the model doesn't ask for one.
const DEFAULT_RECENT_LIMIT: usize = 12;

#[derive(Debug, Default, Deserialize)]
struct ContextLogArgs {
    /// How many recent nodes to include.
    limit: Option<usize>,
}

/// Tool exposing [`SessionLog::context_log_payload`] to the model.
pub struct ContextLogTool {
    log: Arc<Mutex<SessionLog>>,
}

impl ContextLogTool {
    pub fn new(log: Arc<Mutex<SessionLog>>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl Tool for ContextLogTool {
    fn name(&self) -> &'static str {
        "context_log"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: self.name().into(),
                description: "Inspect the session context log: recent nodes with ids and tags, \
                              the active anchor, and recent checkouts. Use the listed node ids \
                              or tags as targets for context_tag and context_checkout."
                    .into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "limit": {
                            "type": "integer",
                            "minimum": 1,
                            "description": "How many recent nodes to include (default 12)."
                        }
                    },
                    "additionalProperties": false
                }),
            },
        }
    }

    async fn execute(&self, arguments: &str) -> Result<String, ToolError> {
        let args: ContextLogArgs = parse_args(arguments)?;
        let limit = args.limit.unwrap_or(DEFAULT_RECENT_LIMIT).max(1);

        let payload = self.log.lock().await.context_log_payload(None, limit);
        serde_json::to_string(&payload)
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to serialize payload: {e}")))
    }
}

/// Parse a tool argument string, treating an empty string as `{}`.
pub(super) fn parse_args<'a, T: Deserialize<'a> + Default>(arguments: &'a str) -> Result<T, ToolError> {
    let trimmed = arguments.trim();
    if trimmed.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(trimmed).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn shared_log() -> Arc<Mutex<SessionLog>> {
        let mut log = SessionLog::new("s1::c1");
        log.append(Role::User, "question one");
        log.append(Role::Assistant, "answer one");
        Arc::new(Mutex::new(log))
    }

    #[tokio::test]
    async fn returns_dashboard_and_snapshot() {
        let tool = ContextLogTool::new(shared_log());
        let out = tool.execute("{}").await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert!(value["dashboard"].as_str().unwrap().contains("nodes: 2"));
        assert_eq!(value["snapshot"]["node_count"], 2);
    }

    #[tokio::test]
    async fn empty_arguments_use_defaults() {
        let tool = ContextLogTool::new(shared_log());
        let out = tool.execute("").await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["snapshot"]["recent_nodes"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn limit_restricts_recent_nodes() {
        let tool = ContextLogTool::new(shared_log());
        let out = tool.execute(r#"{"limit":1}"#).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["snapshot"]["recent_nodes"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_arguments_are_rejected() {
        let tool = ContextLogTool::new(shared_log());
        let err = tool.execute("not json").await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
