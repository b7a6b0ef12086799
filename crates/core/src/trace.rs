//! Hierarchical execution traces.
//!
//! Every model turn and every capability call opens a trace. Traces form a
//! tree that mirrors the call structure of a run: tool calls and nested agent
//! turns hang below the turn that requested them. Token usage recorded on a
//! trace is added to its own usage and to the aggregated usage of the trace
//! and all of its ancestors.

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use relay_model::TokenUsage;
use serde::Serialize;
use serde_json::Value;

use crate::capability::CapabilityKind;

/// Identifies a trace within a [`TraceStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TraceId(u64);

impl Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trace:{}", self.0)
    }
}

/// A snapshot of a trace and its sub-traces.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    /// Identifier of the trace.
    pub id: TraceId,
    /// Identifier of the parent trace.
    pub parent_id: Option<TraceId>,
    /// Display name, e.g. `Main - Turn 2` or a function name.
    pub name: String,
    /// What kind of capability produced the trace.
    #[serde(rename = "type")]
    pub kind: CapabilityKind,
    /// When the trace was opened.
    pub start_time: DateTime<Utc>,
    /// When the trace was closed, if it was.
    pub end_time: Option<DateTime<Utc>>,
    /// The request or arguments.
    pub inputs: Value,
    /// The reply or result.
    pub outputs: Option<Value>,
    /// The error message, for failed traces.
    pub error: Option<String>,
    /// Usage recorded on this trace only.
    pub token_usage: TokenUsage,
    /// Usage of this trace and everything below it.
    pub aggregated_token_usage: TokenUsage,
    /// Child traces, in creation order.
    pub sub_traces: Vec<Trace>,
}

impl Trace {
    /// Returns how long the trace took, if it is closed.
    #[inline]
    pub fn elapsed(&self) -> Option<TimeDelta> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// Returns `true` if the trace is closed.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }
}

/// How a trace ended.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TraceOutcome {
    /// The reply or result.
    pub outputs: Option<Value>,
    /// Usage to attribute to the trace.
    pub token_usage: TokenUsage,
    /// The error message, for failures.
    pub error: Option<String>,
}

impl TraceOutcome {
    /// A successful outcome.
    #[inline]
    pub fn success(outputs: Value, token_usage: TokenUsage) -> Self {
        Self {
            outputs: Some(outputs),
            token_usage,
            error: None,
        }
    }

    /// A failed outcome.
    #[inline]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            outputs: None,
            token_usage: TokenUsage::default(),
            error: Some(error.into()),
        }
    }
}

struct Node {
    trace: Trace,
    children: Vec<TraceId>,
}

#[derive(Default)]
struct Arena {
    nodes: HashMap<TraceId, Node>,
    roots: Vec<TraceId>,
    next_id: u64,
}

impl Arena {
    fn snapshot(&self, id: TraceId) -> Option<Trace> {
        let node = self.nodes.get(&id)?;
        let mut trace = node.trace.clone();
        trace.sub_traces = node
            .children
            .iter()
            .filter_map(|child| self.snapshot(*child))
            .collect();
        Some(trace)
    }
}

/// A shared store of traces.
///
/// Clones share the same traces. All nested runs of one top-level run record
/// into the same store.
#[derive(Clone, Default)]
pub struct TraceStore {
    arena: Arc<Mutex<Arena>>,
}

impl TraceStore {
    /// Creates an empty store.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    fn arena(&self) -> MutexGuard<'_, Arena> {
        self.arena.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a trace and returns its identifier.
    ///
    /// A parent that is not in this store is kept as a reference only and
    /// the trace becomes a root.
    pub fn start(
        &self,
        parent_id: Option<TraceId>,
        name: impl Into<String>,
        kind: CapabilityKind,
        inputs: Value,
    ) -> TraceId {
        let mut guard = self.arena();
        let arena = &mut *guard;
        arena.next_id += 1;
        let id = TraceId(arena.next_id);
        let trace = Trace {
            id,
            parent_id,
            name: name.into(),
            kind,
            start_time: Utc::now(),
            end_time: None,
            inputs,
            outputs: None,
            error: None,
            token_usage: TokenUsage::default(),
            aggregated_token_usage: TokenUsage::default(),
            sub_traces: vec![],
        };
        match parent_id.and_then(|parent| arena.nodes.get_mut(&parent)) {
            Some(parent) => parent.children.push(id),
            None => arena.roots.push(id),
        }
        arena.nodes.insert(
            id,
            Node {
                trace,
                children: vec![],
            },
        );
        id
    }

    /// Closes a trace with the given outcome.
    ///
    /// Returns `false` if the trace is unknown.
    pub fn finish(&self, id: TraceId, outcome: TraceOutcome) -> bool {
        let mut guard = self.arena();
        let arena = &mut *guard;
        let TraceOutcome {
            outputs,
            token_usage,
            error,
        } = outcome;
        let Some(node) = arena.nodes.get_mut(&id) else {
            warn!("finishing an unknown trace {id}");
            return false;
        };
        node.trace.end_time = Some(Utc::now());
        node.trace.outputs = outputs;
        node.trace.error = error;
        node.trace.token_usage += token_usage;
        if token_usage.is_zero() {
            return true;
        }

        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(node) = arena.nodes.get_mut(&current) else {
                break;
            };
            node.trace.aggregated_token_usage += token_usage;
            cursor = node.trace.parent_id;
        }
        true
    }

    /// Returns a snapshot of the trace and its sub-traces.
    #[inline]
    pub fn get(&self, id: TraceId) -> Option<Trace> {
        self.arena().snapshot(id)
    }

    /// Returns snapshots of all root traces, in creation order.
    pub fn roots(&self) -> Vec<Trace> {
        let arena = self.arena();
        arena
            .roots
            .iter()
            .filter_map(|id| arena.snapshot(*id))
            .collect()
    }

    /// Returns the number of traces in the store.
    #[inline]
    pub fn len(&self) -> usize {
        self.arena().nodes.len()
    }

    /// Returns `true` if no trace was recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.arena().nodes.is_empty()
    }
}

impl fmt::Debug for TraceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceStore")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn usage(total: u64) -> TokenUsage {
        TokenUsage {
            prompt_tokens: total,
            completion_tokens: 0,
            total_tokens: total,
            total_price: 0.0,
        }
    }

    #[test]
    fn test_aggregated_usage() {
        let store = TraceStore::new();
        let turn = store.start(None, "Main - Turn 1", CapabilityKind::Agent, json!({}));
        let call = store.start(Some(turn), "asset_tree", CapabilityKind::Agent, json!({}));
        let nested = store.start(
            Some(call),
            "Asset Tree - Turn 1",
            CapabilityKind::Agent,
            json!({}),
        );

        assert!(store.finish(nested, TraceOutcome::success(json!("ok"), usage(30))));
        assert!(store.finish(call, TraceOutcome::success(json!("ok"), usage(0))));
        assert!(store.finish(turn, TraceOutcome::success(json!("done"), usage(12))));

        let roots = store.roots();
        assert_eq!(roots.len(), 1);
        let root = &roots[0];
        assert_eq!(root.token_usage.total_tokens, 12);
        assert_eq!(root.aggregated_token_usage.total_tokens, 42);
        let call = &root.sub_traces[0];
        assert_eq!(call.token_usage.total_tokens, 0);
        assert_eq!(call.aggregated_token_usage.total_tokens, 30);
        assert_eq!(call.sub_traces[0].parent_id, Some(call.id));
        assert!(call.sub_traces[0].is_finished());
    }

    #[test]
    fn test_foreign_parent() {
        let store = TraceStore::new();
        let id = store.start(Some(TraceId(7)), "turn", CapabilityKind::Agent, json!(null));
        let trace = store.get(id).unwrap();
        assert_eq!(trace.parent_id, Some(TraceId(7)));
        assert_eq!(store.roots().len(), 1);
        assert!(store.finish(id, TraceOutcome::failure("boom")));
        assert_eq!(store.get(id).unwrap().error.as_deref(), Some("boom"));
        assert!(!store.finish(TraceId(99), TraceOutcome::default()));
    }

    #[test]
    fn test_serialize() {
        let store = TraceStore::new();
        let id = store.start(None, "list_assets", CapabilityKind::Tool, json!({}));
        let value = serde_json::to_value(store.get(id).unwrap()).unwrap();
        assert_eq!(value["type"], "tool");
        assert_eq!(value["id"], 1);
        assert!(value["subTraces"].as_array().unwrap().is_empty());
        assert!(value["aggregatedTokenUsage"].is_object());
    }
}
