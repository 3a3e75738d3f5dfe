//! Shared test fixtures.
//!
//! Scripted stand-ins for the completion service so parser, assembler, and
//! orchestrator tests run hermetically. Compiled only for tests.

use crate::completion::{
    CompletionChunk, CompletionClient, CompletionRequest, CompletionStream,
};
use crate::error::CompletionError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Split `text` into `TextDelta` chunks of at most `chunk_size` characters.
///
/// Splitting on character boundaries lets tests replay the same payload under
/// arbitrary chunkings.
pub fn text_deltas(text: &str, chunk_size: usize) -> Vec<CompletionChunk> {
    assert!(chunk_size > 0, "chunk_size must be positive");
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|chunk| CompletionChunk::TextDelta(chunk.iter().collect()))
        .collect()
}

/// A completion stream that replays a fixed chunk script.
pub struct ScriptedStream {
    chunks: VecDeque<CompletionChunk>,
}

impl ScriptedStream {
    pub fn new(chunks: Vec<CompletionChunk>) -> Self {
        Self {
            chunks: chunks.into(),
        }
    }
}

#[async_trait]
impl CompletionStream for ScriptedStream {
    async fn next_chunk(&mut self) -> Result<Option<CompletionChunk>, CompletionError> {
        Ok(self.chunks.pop_front())
    }
}

/// A completion client that serves one scripted stream per call, in order,
/// and records every request it sees.
pub struct ScriptedClient {
    scripts: Mutex<VecDeque<Vec<CompletionChunk>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new(scripts: Vec<Vec<CompletionChunk>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests seen so far, oldest first.
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<Box<dyn CompletionStream>, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CompletionError::Transport("no scripted response left".into()))?;
        Ok(Box::new(ScriptedStream::new(script)))
    }
}

// Lets tests keep a handle on the client after boxing it for the orchestrator.
#[async_trait]
impl CompletionClient for std::sync::Arc<ScriptedClient> {
    async fn stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<Box<dyn CompletionStream>, CompletionError> {
        (**self).stream(request).await
    }
}

/// Convenience: a single-call script that streams `text` and finishes.
pub fn scripted_text_response(text: &str) -> Vec<CompletionChunk> {
    let mut chunks = text_deltas(text, 7);
    chunks.push(CompletionChunk::Finished { usage: None });
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_deltas_cover_the_whole_payload() {
        let chunks = text_deltas("hello world", 3);
        let joined: String = chunks
            .iter()
            .map(|c| match c {
                CompletionChunk::TextDelta(t) => t.as_str(),
                _ => panic!("unexpected chunk"),
            })
            .collect();
        assert_eq!(joined, "hello world");
    }

    #[test]
    fn text_deltas_split_on_char_boundaries() {
        let chunks = text_deltas("héllo", 2);
        for chunk in &chunks {
            if let CompletionChunk::TextDelta(t) = chunk {
                assert!(t.chars().count() <= 2);
            }
        }
    }

    #[tokio::test]
    async fn scripted_stream_replays_then_ends() {
        let mut stream = ScriptedStream::new(vec![CompletionChunk::TextDelta("a".into())]);
        assert!(stream.next_chunk().await.unwrap().is_some());
        assert!(stream.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scripted_client_serves_scripts_in_order_and_records_requests() {
        let client = ScriptedClient::new(vec![
            scripted_text_response("first"),
            scripted_text_response("second"),
        ]);
        let request = CompletionRequest {
            system: vec![],
            messages: vec![],
            tools: None,
        };
        let _ = client.stream(&request).await.unwrap();
        let _ = client.stream(&request).await.unwrap();
        assert_eq!(client.recorded_requests().len(), 2);
        assert!(client.stream(&request).await.is_err());
    }
}
