//! Keyed cache of session logs.
//!
//! One log per `(session_id, conversation_id)` pair; drafts that have no
//! conversation id yet share the `"draft"` slot per session. The registry is
//! an explicit object owned by whatever owns session lifetimes — there is no
//! module-level global — and it evicts the oldest-created entries once the
//! capacity bound is exceeded.

use super::SessionLog;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Default live-log capacity.
pub const DEFAULT_REGISTRY_CAPACITY: usize = 256;

/// Placeholder conversation id for sessions without one yet.
const DRAFT_CONVERSATION_ID: &str = "draft";

struct RegistryEntry {
    key: String,
    log: Arc<Mutex<SessionLog>>,
}

/// Capacity-bounded get-or-create cache of [`SessionLog`] instances.
///
/// Logs are handed out as `Arc<Mutex<SessionLog>>` so callable tools and the
/// orchestrator share the same instance for a conversation. Evicted entries
/// stay alive as long as someone still holds the `Arc`.
pub struct SessionLogRegistry {
    capacity: usize,
    /// Creation order, oldest first.
    entries: Vec<RegistryEntry>,
}

impl SessionLogRegistry {
    /// Create a registry with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REGISTRY_CAPACITY)
    }

    /// Create a registry with an explicit capacity (clamped to at least 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Vec::new(),
        }
    }

    /// Fetch the log for a `(session, conversation)` pair, creating it on
    /// first access.
    pub fn get_or_create(
        &mut self,
        session_id: &str,
        conversation_id: Option<&str>,
    ) -> Arc<Mutex<SessionLog>> {
        let key = composite_key(session_id, conversation_id);
        if let Some(entry) = self.entries.iter().find(|entry| entry.key == key) {
            return Arc::clone(&entry.log);
        }

        let log = Arc::new(Mutex::new(SessionLog::new(key.clone())));
        self.entries.push(RegistryEntry {
            key: key.clone(),
            log: Arc::clone(&log),
        });
        while self.entries.len() > self.capacity {
            let evicted = self.entries.remove(0);
            tracing::debug!(key = %evicted.key, "evicted session log from registry");
        }
        tracing::debug!(key = %key, live = self.entries.len(), "created session log");
        log
    }

    /// Number of live cached logs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SessionLogRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn composite_key(session_id: &str, conversation_id: Option<&str>) -> String {
    let conversation = conversation_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(DRAFT_CONVERSATION_ID);
    format!("{session_id}::{conversation}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_returns_identical_instance() {
        let mut registry = SessionLogRegistry::new();
        let first = registry.get_or_create("s1", Some("c1"));
        let second = registry.get_or_create("s1", Some("c1"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn different_conversations_get_distinct_logs() {
        let mut registry = SessionLogRegistry::new();
        let first = registry.get_or_create("s1", Some("c1"));
        let second = registry.get_or_create("s1", Some("c2"));
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn missing_conversation_id_maps_to_draft_slot() {
        let mut registry = SessionLogRegistry::new();
        let none = registry.get_or_create("s1", None);
        let blank = registry.get_or_create("s1", Some("  "));
        let explicit = registry.get_or_create("s1", Some("draft"));
        assert!(Arc::ptr_eq(&none, &blank));
        assert!(Arc::ptr_eq(&none, &explicit));
    }

    #[tokio::test]
    async fn log_key_matches_composite_key() {
        let mut registry = SessionLogRegistry::new();
        let log = registry.get_or_create("s1", Some("c1"));
        assert_eq!(log.lock().await.key(), "s1::c1");
    }

    #[test]
    fn capacity_evicts_oldest_created_first() {
        let mut registry = SessionLogRegistry::with_capacity(2);
        let oldest = registry.get_or_create("s1", Some("c1"));
        let _second = registry.get_or_create("s1", Some("c2"));
        let _third = registry.get_or_create("s1", Some("c3"));
        assert_eq!(registry.len(), 2);

        // The oldest key was evicted: a fresh ask creates a new instance.
        let recreated = registry.get_or_create("s1", Some("c1"));
        assert!(!Arc::ptr_eq(&oldest, &recreated));
    }
}
