//! Chatlens — streaming assistant core for chat-log analysis sessions.
//!
//! This crate provides the two stateful subsystems an AI chat assistant is
//! built around: an incremental tag-stream parser that splits chunked model
//! output into content, thinking, and tool-call channels, and a session
//! context log — an append-only, taggable node sequence with git-like
//! checkout semantics for re-anchoring prompt history. An orchestrator ties
//! them to a pluggable completion client and tool registry.
//!
//! # Quick start
//!
//! ```no_run
//! use chatlens::agent::AgentOrchestrator;
//! use chatlens::config::Config;
//! use chatlens::session::SessionLog;
//! use chatlens::tools::{register_context_tools, ToolRegistry};
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//!
//! # async fn example(client: Box<dyn chatlens::completion::CompletionClient>) {
//! let log = Arc::new(Mutex::new(SessionLog::new("session::conversation")));
//! let mut tools = ToolRegistry::new();
//! register_context_tools(&mut tools, &log);
//! let mut orchestrator =
//!     AgentOrchestrator::new(client, tools, log, Config::default()).unwrap();
//! let outcome = orchestrator.run_turn("Hello!").await.unwrap();
//! println!("{}", outcome.content);
//! # }
//! ```

pub mod agent;
pub mod completion;
pub mod config;
pub mod error;
pub mod session;
pub mod stream;
#[cfg(test)]
pub mod testsupport;
pub mod textutil;
pub mod tools;
pub mod types;
