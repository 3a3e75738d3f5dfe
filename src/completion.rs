//! Completion service seam.
//!
//! Model invocation and transport live outside this crate. The orchestrator
//! talks to an upstream completion service exclusively through these traits:
//! a client opens one streamed completion per request, and the stream yields
//! chunks until a finish signal. Production HTTP transports and scripted
//! test doubles plug in identically.

use crate::error::CompletionError;
use crate::types::{ChatMessage, ToolCall, ToolDefinition, UsageSnapshot};
use async_trait::async_trait;

/// One request to the completion service.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System-level instructions: the configured prompt followed by any
    /// pending checkout notes. Client implementations map these to whatever
    /// system-message shape their provider expects.
    pub system: Vec<String>,
    /// Conversation history, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Tool definitions offered to the model, if any.
    pub tools: Option<Vec<ToolDefinition>>,
}

/// One chunk of a streamed completion.
#[derive(Debug, Clone)]
pub enum CompletionChunk {
    /// A fragment of raw assistant output text.
    TextDelta(String),
    /// A structured tool call emitted natively by the provider.
    ToolCall(ToolCall),
    /// Terminal chunk; carries token usage when the provider reports it.
    Finished { usage: Option<UsageSnapshot> },
}

/// An in-flight streamed completion.
///
/// `next_chunk` returns `Ok(None)` after [`CompletionChunk::Finished`] has
/// been delivered; a stream that ends without a finish chunk is reported by
/// the consumer as [`CompletionError::TruncatedStream`].
#[async_trait]
pub trait CompletionStream: Send {
    async fn next_chunk(&mut self) -> Result<Option<CompletionChunk>, CompletionError>;
}

/// Opens streamed completions (HTTP client in prod, scripted in tests).
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<Box<dyn CompletionStream>, CompletionError>;
}
