//! Response assembly over a streamed completion.
//!
//! The assembler drives the tag-stream parser against chunks pulled from the
//! upstream completion service, forwards live content/thinking deltas to an
//! optional event sink, and reconciles the final structured response. When a
//! provider does not emit native tool calls, complete `<tool_call>` blocks
//! captured by the parser are recovered as a fallback.

use crate::completion::{CompletionChunk, CompletionStream};
use crate::error::CompletionError;
use crate::stream::tag_parser::{StreamFragment, TagStreamParser};
use crate::types::{FunctionCall, ToolCall, UsageSnapshot};
use serde::Deserialize;
use tokio::sync::mpsc;

/// Live delta forwarded while a response streams in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDelta {
    /// Visible assistant text fragment.
    Content(String),
    /// Reasoning text fragment.
    Thinking(String),
}

/// Fully reconciled response for one model call.
#[derive(Debug, Clone, Default)]
pub struct AssembledResponse {
    /// Visible content with all tool-call markup stripped.
    pub content: String,
    /// Concatenated thinking text.
    pub thinking: String,
    /// Tool calls: provider-native when present, otherwise recovered from
    /// inline `<tool_call>` blocks.
    pub tool_calls: Vec<ToolCall>,
    /// Token usage when the provider reported it in the finish chunk.
    pub usage: Option<UsageSnapshot>,
}

impl AssembledResponse {
    /// True when the model requested at least one tool invocation.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Inline tool-call payload shape: `{"name": ..., "arguments": ...}` where
/// `arguments` may be a JSON object or a pre-serialized string.
#[derive(Debug, Deserialize)]
struct InlineToolCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

/// Drives [`TagStreamParser`] against one completion stream.
pub struct ResponseAssembler {
    parser: TagStreamParser,
    delta_sink: Option<mpsc::UnboundedSender<StreamDelta>>,
}

impl ResponseAssembler {
    /// Create an assembler with the default marker set.
    pub fn new() -> Self {
        Self::with_parser(TagStreamParser::new())
    }

    /// Create an assembler around a custom-configured parser.
    pub fn with_parser(parser: TagStreamParser) -> Self {
        Self {
            parser,
            delta_sink: None,
        }
    }

    /// Install (or clear) the live delta sink.
    pub fn set_delta_sink(&mut self, sink: Option<mpsc::UnboundedSender<StreamDelta>>) {
        self.delta_sink = sink;
    }

    /// Pull the stream to completion and reconcile the structured response.
    ///
    /// A stream that ends without a `Finished` chunk is reported as
    /// [`CompletionError::TruncatedStream`]; nothing is guessed from partial
    /// output in that case.
    pub async fn assemble(
        &mut self,
        stream: &mut dyn CompletionStream,
    ) -> Result<AssembledResponse, CompletionError> {
        let mut content = String::new();
        let mut thinking = String::new();
        let mut inline_payloads = Vec::<String>::new();
        let mut native_calls = Vec::<ToolCall>::new();
        let mut usage = None;
        let mut finished = false;

        while let Some(chunk) = stream.next_chunk().await? {
            match chunk {
                CompletionChunk::TextDelta(fragment) => {
                    let fragments = self.parser.push(&fragment);
                    self.absorb(fragments, &mut content, &mut thinking, &mut inline_payloads);
                }
                CompletionChunk::ToolCall(call) => native_calls.push(call),
                CompletionChunk::Finished { usage: reported } => {
                    usage = reported;
                    finished = true;
                    break;
                }
            }
        }
        if !finished {
            return Err(CompletionError::TruncatedStream);
        }

        let residue = self.parser.flush();
        self.absorb(residue, &mut content, &mut thinking, &mut inline_payloads);

        let tool_calls = if native_calls.is_empty() {
            recover_inline_tool_calls(&inline_payloads)
        } else {
            native_calls
        };

        Ok(AssembledResponse {
            content: strip_tool_call_markup(&content),
            thinking,
            tool_calls,
            usage,
        })
    }

    /// Route parser fragments into accumulators and the live sink.
    fn absorb(
        &mut self,
        fragments: Vec<StreamFragment>,
        content: &mut String,
        thinking: &mut String,
        inline_payloads: &mut Vec<String>,
    ) {
        for fragment in fragments {
            match fragment {
                StreamFragment::Content(text) => {
                    self.emit(StreamDelta::Content(text.clone()));
                    content.push_str(&text);
                }
                StreamFragment::Thinking(text) => {
                    self.emit(StreamDelta::Thinking(text.clone()));
                    thinking.push_str(&text);
                }
                StreamFragment::ToolCall(payload) => inline_payloads.push(payload),
            }
        }
    }

    fn emit(&self, delta: StreamDelta) {
        if let Some(sink) = &self.delta_sink {
            // A dropped receiver just means nobody is watching live output.
            let _ = sink.send(delta);
        }
    }
}

impl Default for ResponseAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse captured `<tool_call>` payload blocks into structured calls.
///
/// Malformed blocks are logged and skipped; a bad block never fails the turn.
fn recover_inline_tool_calls(payloads: &[String]) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    for payload in payloads {
        match serde_json::from_str::<InlineToolCall>(payload.trim()) {
            Ok(parsed) => {
                let name = parsed.name.trim().to_string();
                if name.is_empty() {
                    tracing::warn!("skipping inline tool call with empty name");
                    continue;
                }
                let arguments = match parsed.arguments {
                    serde_json::Value::String(raw) => raw,
                    serde_json::Value::Null => "{}".to_string(),
                    value => value.to_string(),
                };
                calls.push(ToolCall {
                    id: format!("call_fb_{}", calls.len()),
                    function: FunctionCall { name, arguments },
                });
            }
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed inline tool call payload");
            }
        }
    }
    calls
}

/// Remove any literal tool-call markup from visible content.
///
/// The parser already keeps tool-call payloads off the content channel; this
/// final pass guarantees the invariant for content assembled from any source.
pub fn strip_tool_call_markup(text: &str) -> String {
    const OPEN: &str = "<tool_call>";
    const CLOSE: &str = "</tool_call>";

    let lower = text.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some(rel_open) = lower[cursor..].find(OPEN) {
        let open = cursor + rel_open;
        out.push_str(&text[cursor..open]);
        match lower[open + OPEN.len()..].find(CLOSE) {
            Some(rel_close) => cursor = open + OPEN.len() + rel_close + CLOSE.len(),
            // Unterminated block: drop through end of text.
            None => return out,
        }
    }
    out.push_str(&text[cursor..]);
    out
}
