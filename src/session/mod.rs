//! Session context log.
//!
//! An append-only, taggable, prunable sequence of conversation nodes. Tags
//! are named pointers to single nodes; `checkout` re-anchors prompt-history
//! construction to a tagged point without mutating the log, a lightweight
//! branch switch. A capacity bound evicts the oldest nodes and rehomes any
//! tags, checkout records, or the active anchor that referenced them.
//!
//! All public operations report caller errors ("not found", "empty required
//! field") through result payloads; nothing here panics or corrupts state.

pub mod registry;

use crate::textutil::{cap_chars, collapse_whitespace, preview_line};
use crate::types::{ChatMessage, Role, UsageSnapshot};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default node capacity per log.
pub const DEFAULT_MAX_NODES: usize = 320;
/// Default checkout-record ring size.
pub const DEFAULT_MAX_CHECKOUTS: usize = 64;
/// Pending system notes kept for the next prompt-construction cycle.
const MAX_PENDING_NOTES: usize = 8;
/// Normalized tag names are capped at this many characters.
const MAX_TAG_CHARS: usize = 64;
/// Checkout summaries are capped at this many characters.
const MAX_SUMMARY_CHARS: usize = 800;
/// Checkout records included in a snapshot.
const SNAPSHOT_CHECKOUT_LIMIT: usize = 8;
/// Content preview length in node summaries.
const NODE_PREVIEW_CHARS: usize = 120;

/// Process-wide node-id sequence; ids stay unique across all logs.
static NODE_ID_SEQ: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// Persisted units
// ---------------------------------------------------------------------------

/// One unit of conversation history. Immutable once created except for its
/// tag set; removed only by overflow eviction.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionNode {
    /// Process-unique identifier.
    pub id: String,
    /// Author role.
    pub role: Role,
    /// Normalized, non-empty text.
    pub content: String,
    /// Creation time in unix millis; non-decreasing across the log.
    pub created_at_ms: u64,
    /// Labels attached to this node.
    pub tags: BTreeSet<String>,
}

/// Immutable record of one branch switch.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckoutRecord {
    /// Node the anchor pointed at before the switch, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_node_id: Option<String>,
    /// Node the anchor was moved to.
    pub to_node_id: String,
    /// Summary of the branch being left.
    pub summary: String,
    /// Record creation time in unix millis.
    pub created_at_ms: u64,
}

// ---------------------------------------------------------------------------
// Operation outcomes
// ---------------------------------------------------------------------------

/// Result payload for `tag`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TagOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl TagOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            node_id: None,
        }
    }
}

/// Result payload for `checkout`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckoutOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_node_id: Option<String>,
}

impl CheckoutOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            from_node_id: None,
            to_node_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Compact node view used in snapshots.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NodeSummary {
    pub id: String,
    pub role: Role,
    /// Single-line content preview.
    pub preview: String,
    pub created_at_ms: u64,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

/// Structured introspection view of the log.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionLogSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_anchor_node_id: Option<String>,
    pub node_count: usize,
    pub tag_count: usize,
    pub checkout_count: usize,
    /// Nodes appended since the most recent tagged node; 0 when the head
    /// itself is tagged, total node count when nothing is tagged.
    pub segment_size: usize,
    pub recent_nodes: Vec<NodeSummary>,
    pub checkouts: Vec<CheckoutRecord>,
}

/// Human-readable dashboard plus the structured snapshot, exposed to the
/// model through the `context_log` tool.
#[derive(Debug, Clone, Serialize)]
pub struct ContextLogPayload {
    pub dashboard: String,
    pub snapshot: SessionLogSnapshot,
}

// ---------------------------------------------------------------------------
// SessionLog
// ---------------------------------------------------------------------------

/// In-memory session context log. Single logical turn at a time per key;
/// independent keys own disjoint state and never interfere.
#[derive(Debug)]
pub struct SessionLog {
    key: String,
    max_nodes: usize,
    max_checkouts: usize,
    nodes: VecDeque<SessionNode>,
    /// tag name -> node id; every value references a live node.
    tag_index: BTreeMap<String, String>,
    checkouts: VecDeque<CheckoutRecord>,
    active_anchor: Option<String>,
    pending_notes: VecDeque<String>,
    bootstrapped: bool,
    /// Per-log id salt so ids read distinctly across logs.
    id_salt: String,
    last_created_at_ms: u64,
}

impl SessionLog {
    /// Create a log with default capacities.
    pub fn new(key: impl Into<String>) -> Self {
        Self::with_limits(key, DEFAULT_MAX_NODES, DEFAULT_MAX_CHECKOUTS)
    }

    /// Create a log with explicit capacities (clamped to at least 1).
    pub fn with_limits(key: impl Into<String>, max_nodes: usize, max_checkouts: usize) -> Self {
        Self {
            key: key.into(),
            max_nodes: max_nodes.max(1),
            max_checkouts: max_checkouts.max(1),
            nodes: VecDeque::new(),
            tag_index: BTreeMap::new(),
            checkouts: VecDeque::new(),
            active_anchor: None,
            pending_notes: VecDeque::new(),
            bootstrapped: false,
            id_salt: format!("{:02x}", rand::random::<u8>()),
            last_created_at_ms: 0,
        }
    }

    /// Registry key this log was created under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Id of the last-appended node, if any.
    pub fn head_node_id(&self) -> Option<&str> {
        self.nodes.back().map(|node| node.id.as_str())
    }

    /// Current anchor node id, if set.
    pub fn active_anchor_node_id(&self) -> Option<&str> {
        self.active_anchor.as_deref()
    }

    /// One-time seed from prior-turn history.
    ///
    /// No-op when the log already has nodes, a seed already happened, or the
    /// input carries no conversational content. Returns the number of nodes
    /// seeded.
    pub fn bootstrap_from_history_if_empty(&mut self, prior: &[ChatMessage]) -> usize {
        if self.bootstrapped || !self.nodes.is_empty() {
            return 0;
        }
        let mut seeded = 0;
        for message in prior {
            if !message.role.is_conversational() {
                continue;
            }
            if self.append(message.role, &message.content).is_some() {
                seeded += 1;
            }
        }
        if seeded > 0 {
            self.bootstrapped = true;
        }
        seeded
    }

    /// Append a node. Returns `None` (and mutates nothing) when the trimmed
    /// content is empty. The returned node is a pre-pruning copy and stays
    /// valid to the caller even if the node is evicted right away.
    pub fn append(&mut self, role: Role, content: &str) -> Option<SessionNode> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return None;
        }

        let node = SessionNode {
            id: self.next_node_id(),
            role,
            content: trimmed.to_string(),
            created_at_ms: self.next_timestamp(),
            tags: BTreeSet::new(),
        };
        self.nodes.push_back(node.clone());
        self.prune_overflow();
        Some(node)
    }

    /// Attach a tag to a node.
    ///
    /// The tag name is normalized (whitespace runs to `_`, capped at 64
    /// chars). `target` resolves like any target reference; `None` tags the
    /// current head. Re-tagging an existing name moves it. An optional note
    /// appends a `Note` node recording the action.
    pub fn tag(&mut self, tag_name: &str, target: Option<&str>, note: Option<&str>) -> TagOutcome {
        let name = normalize_tag_name(tag_name);
        if name.is_empty() {
            return TagOutcome::failure("tag name is empty");
        }

        let node_id = match target {
            Some(reference) => match self.resolve_target(reference) {
                Some(id) => id,
                None => {
                    return TagOutcome::failure(format!("no node matches target `{reference}`"))
                }
            },
            None => match self.head_node_id() {
                Some(id) => id.to_string(),
                None => return TagOutcome::failure("context log is empty; nothing to tag"),
            },
        };

        // Moving a tag detaches it from its previous node first.
        if let Some(previous_id) = self.tag_index.get(&name).cloned() {
            if previous_id != node_id {
                if let Some(previous) = self.node_mut(&previous_id) {
                    previous.tags.remove(&name);
                }
            }
        }
        if let Some(node) = self.node_mut(&node_id) {
            node.tags.insert(name.clone());
        }
        self.tag_index.insert(name.clone(), node_id.clone());
        tracing::debug!(key = %self.key, tag = %name, node = %node_id, "tagged node");

        // The wrapper text is always non-empty, so the blank-note check has
        // to happen before formatting.
        if let Some(note) = note.map(str::trim).filter(|note| !note.is_empty()) {
            let _ = self.append(
                Role::Note,
                &format!("tag `{name}` -> node {node_id}: {note}"),
            );
        }

        TagOutcome {
            success: true,
            message: format!("tagged node {node_id} as `{name}`"),
            node_id: Some(node_id),
        }
    }

    /// Switch the prompt-history anchor to a target node.
    ///
    /// Records a checkout, enqueues a pending system note describing the
    /// switch, and documents it with a `Note` node. Prompt history built
    /// before this call is unaffected; the new anchor applies from the next
    /// `prompt_history` on.
    pub fn checkout(&mut self, target: &str, summary: &str) -> CheckoutOutcome {
        let summary = summary.trim();
        if summary.is_empty() {
            return CheckoutOutcome::failure("checkout summary is empty");
        }
        let summary = cap_chars(summary, MAX_SUMMARY_CHARS);

        let Some(to_node_id) = self.resolve_target(target) else {
            return CheckoutOutcome::failure(format!("no node matches target `{target}`"));
        };

        let from_node_id = self
            .active_anchor
            .clone()
            .or_else(|| self.head_node_id().map(str::to_string));

        let created_at_ms = self.next_timestamp();
        self.checkouts.push_back(CheckoutRecord {
            from_node_id: from_node_id.clone(),
            to_node_id: to_node_id.clone(),
            summary: summary.clone(),
            created_at_ms,
        });
        while self.checkouts.len() > self.max_checkouts {
            self.checkouts.pop_front();
        }

        self.active_anchor = Some(to_node_id.clone());
        self.push_pending_note(format!(
            "Context checkout: prompt history now starts at node {to_node_id}. \
             Summary of the branch left behind: {summary}"
        ));
        let _ = self.append(Role::Note, &format!("checkout -> node {to_node_id}: {summary}"));
        tracing::debug!(key = %self.key, to = %to_node_id, "checkout");

        CheckoutOutcome {
            success: true,
            message: format!("checked out node {to_node_id}"),
            from_node_id,
            to_node_id: Some(to_node_id),
        }
    }

    /// Conversational history for prompt construction, oldest first.
    ///
    /// Starts at the active anchor when one is set, then keeps only the most
    /// recent `limit` entries.
    pub fn prompt_history(&self, limit: usize) -> Vec<ChatMessage> {
        let conversational: Vec<&SessionNode> = self
            .nodes
            .iter()
            .filter(|node| node.role.is_conversational())
            .collect();

        let start = self
            .active_anchor
            .as_deref()
            .and_then(|anchor| conversational.iter().position(|node| node.id == anchor))
            .unwrap_or(0);

        let mut window = &conversational[start..];
        if window.len() > limit {
            window = &window[window.len() - limit..];
        }
        window
            .iter()
            .map(|node| ChatMessage {
                role: node.role,
                content: node.content.clone(),
            })
            .collect()
    }

    /// Return and clear pending checkout notes; a second call yields nothing.
    pub fn consume_pending_system_notes(&mut self) -> Vec<String> {
        self.pending_notes.drain(..).collect()
    }

    /// Structured introspection snapshot.
    pub fn snapshot(&self, recent_limit: usize) -> SessionLogSnapshot {
        let recent_nodes = self
            .nodes
            .iter()
            .rev()
            .take(recent_limit)
            .map(|node| NodeSummary {
                id: node.id.clone(),
                role: node.role,
                preview: preview_line(&node.content, NODE_PREVIEW_CHARS),
                created_at_ms: node.created_at_ms,
                tags: node.tags.clone(),
            })
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        let checkouts = self
            .checkouts
            .iter()
            .rev()
            .take(SNAPSHOT_CHECKOUT_LIMIT)
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        SessionLogSnapshot {
            head_node_id: self.head_node_id().map(str::to_string),
            active_anchor_node_id: self.active_anchor.clone(),
            node_count: self.nodes.len(),
            tag_count: self.tag_index.len(),
            checkout_count: self.checkouts.len(),
            segment_size: self.segment_size(),
            recent_nodes,
            checkouts,
        }
    }

    /// Dashboard + snapshot payload for the `context_log` tool.
    pub fn context_log_payload(
        &self,
        usage: Option<UsageSnapshot>,
        recent_limit: usize,
    ) -> ContextLogPayload {
        let snapshot = self.snapshot(recent_limit);
        let mut lines = Vec::new();
        lines.push(format!("context log `{}`", self.key));
        lines.push(format!(
            "nodes: {} | tags: {} | checkouts: {} | segment since last tag: {}",
            snapshot.node_count, snapshot.tag_count, snapshot.checkout_count, snapshot.segment_size
        ));
        lines.push(format!(
            "head: {} | anchor: {}",
            snapshot.head_node_id.as_deref().unwrap_or("(empty)"),
            snapshot.active_anchor_node_id.as_deref().unwrap_or("(none)")
        ));
        if let Some(usage) = usage {
            lines.push(format!(
                "tokens: prompt {} / completion {} / total {}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            ));
        }
        if !snapshot.recent_nodes.is_empty() {
            lines.push("recent nodes:".to_string());
            for node in &snapshot.recent_nodes {
                let tags = if node.tags.is_empty() {
                    String::new()
                } else {
                    format!(
                        " [{}]",
                        node.tags.iter().cloned().collect::<Vec<_>>().join(", ")
                    )
                };
                lines.push(format!(
                    "  {} {:?}{}: {}",
                    node.id, node.role, tags, node.preview
                ));
            }
        }
        if !snapshot.checkouts.is_empty() {
            lines.push("recent checkouts:".to_string());
            for record in &snapshot.checkouts {
                lines.push(format!(
                    "  {} -> {}: {}",
                    record.from_node_id.as_deref().unwrap_or("(start)"),
                    record.to_node_id,
                    preview_line(&record.summary, NODE_PREVIEW_CHARS)
                ));
            }
        }

        ContextLogPayload {
            dashboard: lines.join("\n"),
            snapshot,
        }
    }

    // -- internals ----------------------------------------------------------

    /// Resolve a target reference: exact node id, unique id prefix, or tag
    /// name (raw or normalized).
    fn resolve_target(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }

        if self.nodes.iter().any(|node| node.id == reference) {
            return Some(reference.to_string());
        }

        let mut prefix_matches = self
            .nodes
            .iter()
            .filter(|node| node.id.starts_with(reference));
        if let Some(first) = prefix_matches.next() {
            if prefix_matches.next().is_none() {
                return Some(first.id.clone());
            }
        }

        if let Some(id) = self.tag_index.get(reference) {
            return Some(id.clone());
        }
        let normalized = normalize_tag_name(reference);
        self.tag_index.get(&normalized).cloned()
    }

    fn node_mut(&mut self, id: &str) -> Option<&mut SessionNode> {
        self.nodes.iter_mut().find(|node| node.id == id)
    }

    /// Nodes appended after the most recent tagged node.
    fn segment_size(&self) -> usize {
        let mut count = 0;
        for node in self.nodes.iter().rev() {
            if !node.tags.is_empty() {
                return count;
            }
            count += 1;
        }
        count
    }

    fn push_pending_note(&mut self, note: String) {
        self.pending_notes.push_back(note);
        while self.pending_notes.len() > MAX_PENDING_NOTES {
            self.pending_notes.pop_front();
        }
    }

    /// Evict oldest nodes past capacity and rehome every reference to them.
    /// Runs inside `append`, so no intermediate state is observable.
    fn prune_overflow(&mut self) {
        if self.nodes.len() <= self.max_nodes {
            return;
        }

        let mut evicted = BTreeSet::new();
        while self.nodes.len() > self.max_nodes {
            if let Some(node) = self.nodes.pop_front() {
                evicted.insert(node.id);
            }
        }

        self.tag_index.retain(|_, node_id| !evicted.contains(node_id));
        self.checkouts.retain(|record| {
            !evicted.contains(&record.to_node_id)
                && record
                    .from_node_id
                    .as_ref()
                    .is_none_or(|id| !evicted.contains(id))
        });

        if self
            .active_anchor
            .as_ref()
            .is_some_and(|anchor| evicted.contains(anchor))
        {
            self.active_anchor = self
                .nodes
                .iter()
                .find(|node| node.role.is_conversational())
                .map(|node| node.id.clone());
        }

        tracing::debug!(key = %self.key, evicted = evicted.len(), "pruned overflow");
    }

    fn next_node_id(&self) -> String {
        let seq = NODE_ID_SEQ.fetch_add(1, Ordering::Relaxed);
        format!("{}{seq:06x}", self.id_salt)
    }

    /// Unix millis clamped so timestamps never decrease within the log.
    fn next_timestamp(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        let stamped = now.max(self.last_created_at_ms);
        self.last_created_at_ms = stamped;
        stamped
    }
}

/// Normalize a tag name: trim, collapse whitespace runs to `_`, cap length.
fn normalize_tag_name(raw: &str) -> String {
    cap_chars(&collapse_whitespace(raw, '_'), MAX_TAG_CHARS)
}
