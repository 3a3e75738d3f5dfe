//! Tagging tool.
//!
//! Lets the model attach a named label to a node in the session context log
//! so it can be referenced later as a checkout target.

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
struct ContextTagArgs {
    /// Label to attach.
    tag: String,
    /// Node id, id prefix, or existing tag name; defaults to the head node.
    target: Option<String>,
    /// Optional annotation recorded as a note node.
    note: Option<String>,
}

/// Tool exposing [`SessionLog::tag`] to the model.
pub struct ContextTagTool {
    log: Arc<Mutex<SessionLog>>,
}

impl ContextTagTool {
    pub fn new(log: Arc<Mutex<SessionLog>>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl Tool for ContextTagTool {
    fn name(&self) -> &'static str {
        "context_tag"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: self.name().into(),
                description: "Attach a named tag to a node in the session context log. Without \
                              a target the tag lands on the most recent node. Tags can later be \
                              used as context_checkout targets."
                    .into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "tag": {
                            "type": "string",
                            "description": "Tag name; whitespace is collapsed to underscores."
                        },
                        "target": {
                            "type": "string",
                            "description": "Node id, unique id prefix, or existing tag name. Defaults to the latest node."
                        },
                        "note": {
                            "type": "string",
                            "description": "Optional annotation recorded alongside the tag."
                        }
                    },
                    "required": ["tag"],
                    "additionalProperties": false
                }),
            },
        }
    }

    async fn execute(&self, arguments: &str) -> Result<String, ToolError> {
        let args: ContextTagArgs = parse_args(arguments)?;
        let outcome = self.log.lock().await.tag(
            &args.tag,
            args.target.as_deref(),
            args.note.as_deref(),
        );
        serde_json::to_string(&outcome)
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to serialize outcome: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn shared_log() -> Arc<Mutex<SessionLog>> {
        let mut log = SessionLog::new("s1::c1");
        log.append(Role::User, "question");
        log.append(Role::Assistant, "answer");
        Arc::new(Mutex::new(log))
    }

    #[tokio::test]
    async fn tags_the_head_by_default() {
        let log = shared_log();
        let tool = ContextTagTool::new(Arc::clone(&log));
        let out = tool.execute(r#"{"tag":"milestone"}"#).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(
            value["node_id"].as_str(),
            log.lock().await.head_node_id()
        );
    }

    #[tokio::test]
    async fn unknown_target_reports_failure_payload() {
        let tool = ContextTagTool::new(shared_log());
        let out = tool
            .execute(r#"{"tag":"t","target":"no-such-node"}"#)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["success"], false);
        assert!(value["message"].as_str().unwrap().contains("no-such-node"));
    }

    #[tokio::test]
    async fn empty_tag_reports_failure_payload() {
        let tool = ContextTagTool::new(shared_log());
        let out = tool.execute(r#"{"tag":"  "}"#).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["success"], false);
    }

    #[tokio::test]
    async fn missing_tag_field_is_invalid_arguments() {
        let tool = ContextTagTool::new(shared_log());
        let err = tool.execute(r#"{"target":"x"}"#).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
