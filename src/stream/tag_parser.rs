//! Incremental tag-stream parser for model output.
//!
//! Models wrap reasoning text and inline tool invocations in lightweight
//! pseudo-XML markers (`<think>...</think>`, `<tool_call>...</tool_call>`).
//! This parser consumes the raw output as arbitrarily chunked fragments and
//! splits it into three channels — visible content, thinking text, and raw
//! tool-call payloads — without ever buffering the full response. Markers may
//! be split across chunk boundaries; unknown markup passes through as
//! ordinary content.

use crate::error::MarkerError;

/// Thinking-tag aliases recognized by default, matched case-insensitively.
pub const DEFAULT_THINKING_ALIASES: &[&str] = &[
    "think",
    "thinking",
    "thought",
    "reasoning",
    "analysis",
    "reflection",
];

/// Wrapper tag for inline tool invocations.
const TOOL_CALL_TAG: &str = "tool_call";

/// A classified piece of model output emitted by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFragment {
    /// Visible assistant text.
    Content(String),
    /// Reasoning text extracted from a thinking block.
    Thinking(String),
    /// Raw payload of one complete `<tool_call>` block.
    ToolCall(String),
}

/// What a recognized start marker switches the parser into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    ToolCall,
    Thinking,
}

/// One recognized start/end marker pair, stored lowercase.
#[derive(Debug, Clone)]
struct Marker {
    open: String,
    close: String,
    kind: MarkerKind,
}

/// Current classification state. Transitions happen only at a recognized
/// marker or at end-of-stream flush.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ParserMode {
    Text,
    /// Inside a thinking block; holds the lowercase close marker to scan for.
    Thinking { close: String },
    ToolCall,
}

/// Streaming state machine over incoming text fragments. No I/O.
#[derive(Debug)]
pub struct TagStreamParser {
    buffer: String,
    mode: ParserMode,
    /// Candidate start markers in registration order. The tool-call marker is
    /// registered first so it wins when two markers would start at the same
    /// buffer offset.
    markers: Vec<Marker>,
}

impl TagStreamParser {
    /// Create a parser recognizing the default thinking aliases.
    pub fn new() -> Self {
        Self::from_aliases(DEFAULT_THINKING_ALIASES.iter().map(|alias| alias.to_string()))
    }

    /// Create a parser with custom thinking aliases.
    ///
    /// Aliases must be non-empty and consist of ASCII alphanumerics or
    /// underscores; anything else is a programming error reported as
    /// [`MarkerError`].
    pub fn with_thinking_aliases<S: AsRef<str>>(aliases: &[S]) -> Result<Self, MarkerError> {
        let mut validated = Vec::with_capacity(aliases.len());
        for alias in aliases {
            let alias = alias.as_ref().trim();
            if alias.is_empty() {
                return Err(MarkerError::EmptyAlias);
            }
            if !alias
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(MarkerError::InvalidAlias(alias.to_string()));
            }
            validated.push(alias.to_ascii_lowercase());
        }
        Ok(Self::from_aliases(validated.into_iter()))
    }

    fn from_aliases(aliases: impl Iterator<Item = String>) -> Self {
        let mut markers = vec![Marker {
            open: format!("<{TOOL_CALL_TAG}>"),
            close: format!("</{TOOL_CALL_TAG}>"),
            kind: MarkerKind::ToolCall,
        }];
        for alias in aliases {
            let alias = alias.to_ascii_lowercase();
            markers.push(Marker {
                open: format!("<{alias}>"),
                close: format!("</{alias}>"),
                kind: MarkerKind::Thinking,
            });
        }
        Self {
            buffer: String::new(),
            mode: ParserMode::Text,
            markers,
        }
    }

    /// Feed one fragment of model output and collect classified fragments.
    ///
    /// Fragments may split markers at arbitrary byte positions; the parser
    /// retains just enough tail to recognize a marker completed by a later
    /// push.
    pub fn push(&mut self, fragment: &str) -> Vec<StreamFragment> {
        self.buffer.push_str(fragment);
        self.drain()
    }

    /// Signal end of stream and emit any residual buffered text.
    ///
    /// Residue is emitted in whatever mode is active: text as content,
    /// thinking as thinking. An unterminated tool call is discarded rather
    /// than guessed at.
    pub fn flush(&mut self) -> Vec<StreamFragment> {
        let mut events = self.drain();
        if !self.buffer.is_empty() {
            let residue = std::mem::take(&mut self.buffer);
            match self.mode {
                ParserMode::Text => events.push(StreamFragment::Content(residue)),
                ParserMode::Thinking { .. } => events.push(StreamFragment::Thinking(residue)),
                ParserMode::ToolCall => {}
            }
        }
        self.mode = ParserMode::Text;
        events
    }

    /// Process as much of the buffer as can be classified unambiguously.
    fn drain(&mut self) -> Vec<StreamFragment> {
        let mut events = Vec::new();
        // Every iteration either consumes at least one byte or stops, but a
        // hard cap guarantees termination under pathological input.
        let mut remaining_iterations = self.buffer.len().saturating_mul(2) + 64;

        loop {
            if remaining_iterations == 0 {
                break;
            }
            remaining_iterations -= 1;

            let progressed = match self.mode.clone() {
                ParserMode::Text => self.drain_text(&mut events),
                ParserMode::Thinking { close } => self.drain_thinking(&close, &mut events),
                ParserMode::ToolCall => self.drain_tool_call(&mut events),
            };
            if !progressed {
                break;
            }
        }

        events
    }

    /// One scan step in `Text` mode. Returns true when another step may make
    /// progress.
    fn drain_text(&mut self, events: &mut Vec<StreamFragment>) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        let lower = self.buffer.to_ascii_lowercase();

        if let Some((pos, marker_idx)) = self.earliest_start_marker(&lower) {
            let marker = &self.markers[marker_idx];
            if pos > 0 {
                push_content(events, &self.buffer[..pos]);
            }
            let consumed = pos + marker.open.len();
            self.mode = match marker.kind {
                MarkerKind::ToolCall => ParserMode::ToolCall,
                MarkerKind::Thinking => ParserMode::Thinking {
                    close: marker.close.clone(),
                },
            };
            self.buffer.drain(..consumed);
            return true;
        }

        // No complete marker. Everything up to the first `<` that could still
        // grow into a marker is safe to emit; a `<` that cannot begin any
        // marker is emitted as a single ordinary character so malformed input
        // never starves the content channel.
        match first_angle_bracket(&lower) {
            None => {
                push_content(events, &self.buffer);
                self.buffer.clear();
                false
            }
            Some(lt) => {
                let tail = &lower[lt..];
                if self
                    .markers
                    .iter()
                    .any(|marker| is_proper_prefix(tail, &marker.open))
                {
                    // Possible split marker: emit the prefix, retain the tail.
                    if lt > 0 {
                        push_content(events, &self.buffer[..lt]);
                        self.buffer.drain(..lt);
                    }
                    false
                } else {
                    push_content(events, &self.buffer[..=lt]);
                    self.buffer.drain(..=lt);
                    true
                }
            }
        }
    }

    /// One scan step in `Thinking` mode.
    fn drain_thinking(&mut self, close: &str, events: &mut Vec<StreamFragment>) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        let lower = self.buffer.to_ascii_lowercase();

        if let Some(pos) = lower.find(close) {
            if pos > 0 {
                events.push(StreamFragment::Thinking(self.buffer[..pos].to_string()));
            }
            self.buffer.drain(..pos + close.len());
            self.mode = ParserMode::Text;
            return true;
        }

        // Emit everything that cannot be part of a split close marker.
        let retain_from = earliest_partial_match(&lower, close).unwrap_or(self.buffer.len());
        if retain_from > 0 {
            events.push(StreamFragment::Thinking(
                self.buffer[..retain_from].to_string(),
            ));
            self.buffer.drain(..retain_from);
        }
        false
    }

    /// One scan step in `ToolCall` mode. The payload is buffered whole until
    /// the close marker arrives; nothing leaks to the content channel.
    fn drain_tool_call(&mut self, events: &mut Vec<StreamFragment>) -> bool {
        const CLOSE: &str = "</tool_call>";
        let lower = self.buffer.to_ascii_lowercase();

        if let Some(pos) = lower.find(CLOSE) {
            events.push(StreamFragment::ToolCall(self.buffer[..pos].to_string()));
            self.buffer.drain(..pos + CLOSE.len());
            self.mode = ParserMode::Text;
            return true;
        }
        false
    }

    /// Earliest full start-marker occurrence; ties resolve to registration
    /// order (tool-call first).
    fn earliest_start_marker(&self, lower: &str) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize)> = None;
        for (idx, marker) in self.markers.iter().enumerate() {
            if let Some(pos) = lower.find(&marker.open) {
                if best.is_none_or(|(best_pos, _)| pos < best_pos) {
                    best = Some((pos, idx));
                }
            }
        }
        best
    }
}

impl Default for TagStreamParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Append text to the event list, coalescing with a trailing content
/// fragment when possible.
fn push_content(events: &mut Vec<StreamFragment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(StreamFragment::Content(existing)) = events.last_mut() {
        existing.push_str(text);
        return;
    }
    events.push(StreamFragment::Content(text.to_string()));
}

/// Byte offset of the first `<` in the buffer, if any.
fn first_angle_bracket(lower: &str) -> Option<usize> {
    lower.find('<')
}

/// True when `tail` is a non-empty strict prefix of `marker`.
fn is_proper_prefix(tail: &str, marker: &str) -> bool {
    !tail.is_empty() && tail.len() < marker.len() && marker.starts_with(tail)
}

/// Earliest offset whose suffix could still grow into `close`.
fn earliest_partial_match(lower: &str, close: &str) -> Option<usize> {
    lower
        .match_indices('<')
        .find(|(pos, _)| is_proper_prefix(&lower[*pos..], close))
        .map(|(pos, _)| pos)
}
