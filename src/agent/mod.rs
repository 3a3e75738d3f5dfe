//! Turn orchestration.
//!
//! The [`AgentOrchestrator`] drives one user turn end to end: it appends the
//! user node to the session log, builds a request from the log's prompt
//! history plus any pending checkout notes, streams the completion through
//! the response assembler, executes tool calls between model rounds, and
//! loops until the model produces a final text response (or the iteration
//! cap is reached). Only the final reconciled assistant content is committed
//! to the log; streaming deltas and tool-round intermediates never are.

use crate::completion::{CompletionClient, CompletionRequest};
use crate::config::Config;
use crate::error::{CompletionError, ConfigError, OrchestratorError};
use crate::session::SessionLog;
use crate::stream::{AssembledResponse, ResponseAssembler, StreamDelta, TagStreamParser};
use crate::tools::ToolRegistry;
use crate::types::{ChatMessage, Role, UsageSnapshot};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

/// Response text returned when cancellation wins the race.
const CANCELLED_RESPONSE: &str = "operation cancelled";

/// Progress event emitted while a turn runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    Started,
    ModelCallStarted { iteration: usize },
    ToolCallStarted { name: String, arguments: String },
    ToolCallFinished { name: String, result: String },
    Completed { content: String },
    Cancelled,
    Failed { message: String },
}

/// Final result of one turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Final assistant text with tool-call markup stripped.
    pub content: String,
    /// Concatenated thinking text from the final model round.
    pub thinking: String,
    /// Usage reported on the last completed model call, if any.
    pub usage: Option<UsageSnapshot>,
    /// True when the turn was interrupted by the cancellation signal.
    pub cancelled: bool,
}

impl TurnOutcome {
    fn cancelled() -> Self {
        Self {
            content: CANCELLED_RESPONSE.to_string(),
            thinking: String::new(),
            usage: None,
            cancelled: true,
        }
    }
}

/// Drives the model/tool loop for one session log.
pub struct AgentOrchestrator {
    /// Completion client implementation (HTTP in prod, scripted in tests).
    client: Box<dyn CompletionClient>,
    tools: ToolRegistry,
    log: Arc<Mutex<SessionLog>>,
    config: Config,
    /// Optional live sink for content/thinking deltas.
    delta_sink: Option<mpsc::UnboundedSender<StreamDelta>>,
    /// Optional sink for turn progress events.
    event_sink: Option<mpsc::UnboundedSender<TurnEvent>>,
    /// Optional cancellation signal for the in-flight turn.
    cancellation_rx: Option<watch::Receiver<bool>>,
}

impl AgentOrchestrator {
    /// Create an orchestrator. Fails when the configured thinking aliases
    /// don't form a valid marker set.
    pub fn new(
        client: Box<dyn CompletionClient>,
        tools: ToolRegistry,
        log: Arc<Mutex<SessionLog>>,
        config: Config,
    ) -> Result<Self, OrchestratorError> {
        // Validate the marker set up front so per-turn construction can't fail.
        Self::build_parser(&config)?;
        Ok(Self {
            client,
            tools,
            log,
            config,
            delta_sink: None,
            event_sink: None,
            cancellation_rx: None,
        })
    }

    /// Install (or clear) the live delta sink.
    pub fn set_delta_sink(&mut self, sink: Option<mpsc::UnboundedSender<StreamDelta>>) {
        self.delta_sink = sink;
    }

    /// Install (or clear) the turn event sink.
    pub fn set_event_sink(&mut self, sink: Option<mpsc::UnboundedSender<TurnEvent>>) {
        self.event_sink = sink;
    }

    /// Register a cancellation signal for subsequent turns.
    pub fn set_cancellation_receiver(&mut self, rx: Option<watch::Receiver<bool>>) {
        self.cancellation_rx = rx;
    }

    /// Seed the session log from prior-turn history (no-op if already seeded
    /// or non-empty). Returns the number of nodes seeded.
    pub async fn seed_history(&self, prior: &[ChatMessage]) -> usize {
        self.log.lock().await.bootstrap_from_history_if_empty(prior)
    }

    /// Run one user turn through the full model/tool loop.
    ///
    /// Tool calls are executed and their results re-submitted automatically
    /// until the model produces a plain text response or `max_iterations` is
    /// reached. Cancellation mid-turn returns a cancelled outcome; nodes
    /// already appended stay, the in-flight assistant turn is not committed.
    pub async fn run_turn(&mut self, user_input: &str) -> Result<TurnOutcome, OrchestratorError> {
        self.emit(TurnEvent::Started);
        self.log.lock().await.append(Role::User, user_input);

        if self.cancellation_requested() {
            self.emit(TurnEvent::Cancelled);
            return Ok(TurnOutcome::cancelled());
        }

        // Tool rounds accumulated within this turn; sent after the log's
        // prompt history but never committed to the log as conversation.
        let mut turn_tail: Vec<ChatMessage> = Vec::new();
        let mut last_usage: Option<UsageSnapshot> = None;
        let mut iterations = 0;

        loop {
            iterations += 1;
            if iterations > self.config.agent.max_iterations {
                self.emit(TurnEvent::Failed {
                    message: OrchestratorError::MaxIterationsReached.to_string(),
                });
                return Err(OrchestratorError::MaxIterationsReached);
            }

            let request = self.build_request(&turn_tail).await;
            self.emit(TurnEvent::ModelCallStarted {
                iteration: iterations,
            });

            let mut assembler = ResponseAssembler::with_parser(Self::build_parser(&self.config)?);
            assembler.set_delta_sink(self.delta_sink.clone());

            let response = if let Some(cancel_rx) = &self.cancellation_rx {
                let mut cancel_rx = cancel_rx.clone();
                tokio::select! {
                    // Cancellation wins immediately and exits the entire turn.
                    _ = wait_for_cancellation(&mut cancel_rx) => {
                        self.emit(TurnEvent::Cancelled);
                        return Ok(TurnOutcome::cancelled());
                    }
                    result = drive_completion(self.client.as_ref(), &request, &mut assembler) => {
                        self.check_completion(result)?
                    }
                }
            } else {
                let result = drive_completion(self.client.as_ref(), &request, &mut assembler).await;
                self.check_completion(result)?
            };

            if response.usage.is_some() {
                last_usage = response.usage;
            }

            if response.has_tool_calls() {
                for call in &response.tool_calls {
                    if self.cancellation_requested() {
                        self.emit(TurnEvent::Cancelled);
                        return Ok(TurnOutcome::cancelled());
                    }
                    self.emit(TurnEvent::ToolCallStarted {
                        name: call.function.name.clone(),
                        arguments: call.function.arguments.clone(),
                    });
                    let result = match self
                        .tools
                        .execute(&call.function.name, &call.function.arguments)
                        .await
                    {
                        Ok(output) => output,
                        Err(err) => format!("Tool error: {err}"),
                    };
                    self.emit(TurnEvent::ToolCallFinished {
                        name: call.function.name.clone(),
                        result: result.clone(),
                    });

                    let record = format!("[{}] {result}", call.function.name);
                    self.log.lock().await.append(Role::Tool, &record);
                    turn_tail.push(ChatMessage {
                        role: Role::Tool,
                        content: record,
                    });
                }
                // Loop back with tool results appended.
                continue;
            }

            let content = response.content.trim().to_string();
            self.log.lock().await.append(Role::Assistant, &content);
            self.emit(TurnEvent::Completed {
                content: content.clone(),
            });
            tracing::debug!(iterations, "turn completed");
            return Ok(TurnOutcome {
                content,
                thinking: response.thinking,
                usage: last_usage,
                cancelled: false,
            });
        }
    }

    // -- internals ----------------------------------------------------------

    /// System instructions + prompt history + this turn's tool rounds.
    async fn build_request(&self, turn_tail: &[ChatMessage]) -> CompletionRequest {
        let (system, mut messages) = {
            let mut log = self.log.lock().await;
            let mut system = Vec::new();
            let prompt = self.config.agent.system_prompt.trim();
            if !prompt.is_empty() {
                system.push(prompt.to_string());
            }
            // Checkout notes enqueued mid-turn surface on the next round.
            system.extend(log.consume_pending_system_notes());
            (system, log.prompt_history(self.config.agent.history_limit))
        };
        messages.extend(turn_tail.iter().cloned());

        let tools = if self.tools.is_empty() {
            None
        } else {
            Some(self.tools.definitions())
        };
        CompletionRequest {
            system,
            messages,
            tools,
        }
    }

    fn check_completion(
        &self,
        result: Result<AssembledResponse, CompletionError>,
    ) -> Result<AssembledResponse, OrchestratorError> {
        result.map_err(|err| {
            self.emit(TurnEvent::Failed {
                message: err.to_string(),
            });
            OrchestratorError::Completion(err)
        })
    }

    fn build_parser(config: &Config) -> Result<TagStreamParser, OrchestratorError> {
        TagStreamParser::with_thinking_aliases(&config.parser.thinking_aliases)
            .map_err(|err| OrchestratorError::Config(ConfigError::Invalid(err.to_string())))
    }

    fn cancellation_requested(&self) -> bool {
        self.cancellation_rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn emit(&self, event: TurnEvent) {
        if let Some(sink) = &self.event_sink {
            let _ = sink.send(event);
        }
    }
}

/// Open the stream and pull it to a reconciled response.
async fn drive_completion(
    client: &dyn CompletionClient,
    request: &CompletionRequest,
    assembler: &mut ResponseAssembler,
) -> Result<AssembledResponse, CompletionError> {
    let mut stream = client.stream(request).await?;
    assembler.assemble(stream.as_mut()).await
}

/// Wait for cancellation signal state change (or return immediately if set).
async fn wait_for_cancellation(cancel_rx: &mut watch::Receiver<bool>) {
    if *cancel_rx.borrow() {
        return;
    }
    let _ = cancel_rx.changed().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionChunk, CompletionStream};
    use crate::testsupport::{scripted_text_response, ScriptedClient};
    use async_trait::async_trait;
    use crate::tools::register_context_tools;
    use crate::types::{FunctionCall, ToolCall};

    fn native_call(name: &str, arguments: &str) -> CompletionChunk {
        CompletionChunk::ToolCall(ToolCall {
            id: "call_1".into(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        })
    }

    fn orchestrator_with(
        scripts: Vec<Vec<CompletionChunk>>,
        config: Config,
    ) -> (AgentOrchestrator, Arc<Mutex<SessionLog>>, Arc<ScriptedClient>) {
        let log = Arc::new(Mutex::new(SessionLog::new("s1::c1")));
        let client = Arc::new(ScriptedClient::new(scripts));
        let mut tools = ToolRegistry::new();
        register_context_tools(&mut tools, &log);
        let orchestrator = AgentOrchestrator::new(
            Box::new(Arc::clone(&client)),
            tools,
            Arc::clone(&log),
            config,
        )
        .unwrap();
        (orchestrator, log, client)
    }

    #[tokio::test]
    async fn plain_text_turn_commits_final_content() {
        let (mut orchestrator, log, client) = orchestrator_with(
            vec![scripted_text_response("<think>easy</think>hello there")],
            Config::default(),
        );

        let outcome = orchestrator.run_turn("hi").await.unwrap();
        assert_eq!(outcome.content, "hello there");
        assert_eq!(outcome.thinking, "easy");
        assert!(!outcome.cancelled);

        let guard = log.lock().await;
        assert_eq!(guard.node_count(), 2);
        let history = guard.prompt_history(10);
        assert_eq!(history[0].content, "hi");
        assert_eq!(history[1].content, "hello there");

        let requests = client.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages.len(), 1);
        assert!(requests[0].tools.is_some());
    }

    #[tokio::test]
    async fn system_prompt_rides_in_the_system_channel() {
        let mut config = Config::default();
        config.agent.system_prompt = "be terse".into();
        let (mut orchestrator, _log, client) =
            orchestrator_with(vec![scripted_text_response("ok")], config);

        orchestrator.run_turn("hi").await.unwrap();
        let requests = client.recorded_requests();
        assert_eq!(requests[0].system, vec!["be terse".to_string()]);
    }

    #[tokio::test]
    async fn tool_round_trip_executes_and_resubmits() {
        let first = vec![
            native_call("context_tag", r#"{"tag":"milestone"}"#),
            CompletionChunk::Finished { usage: None },
        ];
        let (mut orchestrator, log, client) = orchestrator_with(
            vec![first, scripted_text_response("tagged it")],
            Config::default(),
        );

        let outcome = orchestrator.run_turn("please tag this").await.unwrap();
        assert_eq!(outcome.content, "tagged it");

        let guard = log.lock().await;
        // user + tool result + final assistant
        assert_eq!(guard.node_count(), 3);
        assert_eq!(guard.snapshot(10).tag_count, 1);

        let requests = client.recorded_requests();
        assert_eq!(requests.len(), 2);
        // The follow-up request carries the tool result in its tail.
        let tail = requests[1].messages.last().unwrap();
        assert_eq!(tail.role, Role::Tool);
        assert!(tail.content.starts_with("[context_tag]"));
    }

    #[tokio::test]
    async fn inline_tool_calls_are_recovered_and_executed() {
        let first = {
            let mut chunks = crate::testsupport::text_deltas(
                r#"<tool_call>{"name":"context_tag","arguments":{"tag":"inline"}}</tool_call>"#,
                10,
            );
            chunks.push(CompletionChunk::Finished { usage: None });
            chunks
        };
        let (mut orchestrator, log, _client) = orchestrator_with(
            vec![first, scripted_text_response("done")],
            Config::default(),
        );

        let outcome = orchestrator.run_turn("tag inline").await.unwrap();
        assert_eq!(outcome.content, "done");
        assert_eq!(log.lock().await.snapshot(10).tag_count, 1);
    }

    #[tokio::test]
    async fn checkout_note_surfaces_on_next_round() {
        let first = vec![
            native_call("context_tag", r#"{"tag":"here"}"#),
            native_call(
                "context_checkout",
                r#"{"target":"here","summary":"pivot to next phase"}"#,
            ),
            CompletionChunk::Finished { usage: None },
        ];
        let (mut orchestrator, _log, client) = orchestrator_with(
            vec![first, scripted_text_response("switched")],
            Config::default(),
        );

        orchestrator.run_turn("switch context").await.unwrap();
        let requests = client.recorded_requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1]
            .system
            .iter()
            .any(|note| note.contains("pivot to next phase")));
    }

    #[tokio::test]
    async fn unknown_tool_reports_error_result_and_continues() {
        let first = vec![
            native_call("no_such_tool", "{}"),
            CompletionChunk::Finished { usage: None },
        ];
        let (mut orchestrator, log, _client) = orchestrator_with(
            vec![first, scripted_text_response("recovered")],
            Config::default(),
        );

        let outcome = orchestrator.run_turn("try it").await.unwrap();
        assert_eq!(outcome.content, "recovered");
        let guard = log.lock().await;
        let snapshot = guard.snapshot(10);
        assert!(snapshot
            .recent_nodes
            .iter()
            .any(|node| node.role == Role::Tool && node.preview.contains("Tool error")));
    }

    #[tokio::test]
    async fn iteration_cap_fails_the_turn() {
        let mut config = Config::default();
        config.agent.max_iterations = 2;
        let tool_round = || {
            vec![
                native_call("context_log", "{}"),
                CompletionChunk::Finished { usage: None },
            ]
        };
        let (mut orchestrator, _log, _client) =
            orchestrator_with(vec![tool_round(), tool_round()], config);

        let err = orchestrator.run_turn("loop forever").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::MaxIterationsReached));
    }

    #[tokio::test]
    async fn preset_cancellation_skips_the_model_call() {
        let (mut orchestrator, log, client) = orchestrator_with(vec![], Config::default());
        let (_tx, rx) = watch::channel(true);
        orchestrator.set_cancellation_receiver(Some(rx));

        let outcome = orchestrator.run_turn("never mind").await.unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.content, CANCELLED_RESPONSE);
        // The user node stays; nothing else was committed.
        assert_eq!(log.lock().await.node_count(), 1);
        assert!(client.recorded_requests().is_empty());
    }

    /// Stream that flips the cancellation signal on first poll, then stalls
    /// forever so only the cancellation race can finish the turn.
    struct CancelMidStream {
        cancel_tx: Option<watch::Sender<bool>>,
    }

    #[async_trait]
    impl CompletionStream for CancelMidStream {
        async fn next_chunk(&mut self) -> Result<Option<CompletionChunk>, CompletionError> {
            if let Some(tx) = self.cancel_tx.take() {
                let _ = tx.send(true);
            }
            std::future::pending().await
        }
    }

    struct CancelMidStreamClient {
        cancel_tx: std::sync::Mutex<Option<watch::Sender<bool>>>,
    }

    #[async_trait]
    impl CompletionClient for CancelMidStreamClient {
        async fn stream(
            &self,
            _request: &CompletionRequest,
        ) -> Result<Box<dyn CompletionStream>, CompletionError> {
            Ok(Box::new(CancelMidStream {
                cancel_tx: self.cancel_tx.lock().unwrap().take(),
            }))
        }
    }

    #[tokio::test]
    async fn cancellation_mid_stream_aborts_without_committing_assistant() {
        let log = Arc::new(Mutex::new(SessionLog::new("s1::c1")));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let client = CancelMidStreamClient {
            cancel_tx: std::sync::Mutex::new(Some(cancel_tx)),
        };
        let mut orchestrator = AgentOrchestrator::new(
            Box::new(client),
            ToolRegistry::new(),
            Arc::clone(&log),
            Config::default(),
        )
        .unwrap();
        orchestrator.set_cancellation_receiver(Some(cancel_rx));

        let outcome = orchestrator.run_turn("long question").await.unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.content, CANCELLED_RESPONSE);
        // The user node stays; the interrupted assistant turn is not committed.
        assert_eq!(log.lock().await.node_count(), 1);
    }

    #[tokio::test]
    async fn truncated_stream_fails_without_committing_assistant() {
        let (mut orchestrator, log, _client) = orchestrator_with(
            vec![vec![CompletionChunk::TextDelta("partial".into())]],
            Config::default(),
        );

        let err = orchestrator.run_turn("hi").await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Completion(CompletionError::TruncatedStream)
        ));
        assert_eq!(log.lock().await.node_count(), 1);
    }

    #[tokio::test]
    async fn emits_ordered_turn_events_for_tool_round_trip() {
        let first = vec![
            native_call("context_log", "{}"),
            CompletionChunk::Finished { usage: None },
        ];
        let (mut orchestrator, _log, _client) = orchestrator_with(
            vec![first, scripted_text_response("final")],
            Config::default(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        orchestrator.set_event_sink(Some(tx));

        orchestrator.run_turn("go").await.unwrap();

        let mut labels = Vec::new();
        while let Ok(event) = rx.try_recv() {
            labels.push(match event {
                TurnEvent::Started => "started",
                TurnEvent::ModelCallStarted { .. } => "model_call",
                TurnEvent::ToolCallStarted { .. } => "tool_started",
                TurnEvent::ToolCallFinished { .. } => "tool_finished",
                TurnEvent::Completed { .. } => "completed",
                TurnEvent::Cancelled => "cancelled",
                TurnEvent::Failed { .. } => "failed",
            });
        }
        assert_eq!(
            labels,
            vec![
                "started",
                "model_call",
                "tool_started",
                "tool_finished",
                "model_call",
                "completed",
            ]
        );
    }

    #[tokio::test]
    async fn seed_history_populates_empty_log_once() {
        let (orchestrator, log, _client) =
            orchestrator_with(vec![], Config::default());
        let prior = vec![ChatMessage::user("old q"), ChatMessage::assistant("old a")];
        assert_eq!(orchestrator.seed_history(&prior).await, 2);
        assert_eq!(orchestrator.seed_history(&prior).await, 0);
        assert_eq!(log.lock().await.node_count(), 2);
    }

    #[tokio::test]
    async fn usage_from_last_round_is_reported() {
        let first = vec![
            native_call("context_log", "{}"),
            CompletionChunk::Finished {
                usage: Some(UsageSnapshot {
                    prompt_tokens: 5,
                    completion_tokens: 1,
                    total_tokens: 6,
                }),
            },
        ];
        let second = vec![
            CompletionChunk::TextDelta("fin".into()),
            CompletionChunk::Finished {
                usage: Some(UsageSnapshot {
                    prompt_tokens: 9,
                    completion_tokens: 2,
                    total_tokens: 11,
                }),
            },
        ];
        let (mut orchestrator, _log, _client) = orchestrator_with(vec![first, second], Config::default());
        let outcome = orchestrator.run_turn("go").await.unwrap();
        assert_eq!(outcome.usage.map(|u| u.total_tokens), Some(11));
    }
}
