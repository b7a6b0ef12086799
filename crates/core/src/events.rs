//! Lifecycle notifications of a run.
//!
//! The orchestrator reports progress through an [`EventBus`]. Each bus is
//! bound to the dotted path of the agent that owns it, so an [`EventSink`]
//! can tell which agent of a nested run an event comes from. A bus without
//! a sink silently drops events, while traces are still recorded.

use std::fmt::{self, Debug};
use std::sync::Arc;

use relay_model::ToolCall;
use serde_json::Value;

use crate::capability::{CapabilityKind, ToolError};
use crate::trace::{Trace, TraceId, TraceOutcome, TraceStore};

/// A lifecycle event.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Dotted path of the emitting agent, e.g. `main.asset_tree`.
    pub agent_path: String,
    /// What happened.
    pub kind: EventKind,
}

/// The kind of a lifecycle event.
#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    /// The agent started working on something.
    Working {
        /// A human-readable status line.
        message: String,
        /// The turn, starting at 1.
        turn: Option<u32>,
        /// The serialized model request, for turn starts.
        request: Option<Value>,
    },
    /// A piece of streamed assistant text.
    Delta {
        /// The text.
        text: String,
    },
    /// A capability call succeeded.
    Success {
        /// A human-readable status line.
        message: String,
    },
    /// A capability call failed. The run goes on.
    Error {
        /// The message handed back to the model.
        message: String,
        /// The underlying error.
        error: ToolError,
        /// The turn, starting at 1.
        turn: u32,
        /// The failed call.
        call: ToolCall,
    },
}

/// Receives the events and trace updates of a run.
pub trait EventSink: Send + Sync {
    /// Called for every lifecycle event.
    fn on_event(&self, event: &Event);

    /// Called whenever a trace is opened or closed.
    fn on_trace(&self, _trace: &Trace) {}
}

impl<F> EventSink for F
where
    F: Fn(&Event) + Send + Sync,
{
    #[inline]
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

/// Dispatches the events of one agent to the sink of the run.
#[derive(Clone)]
pub struct EventBus {
    sink: Option<Arc<dyn EventSink>>,
    path: String,
    traces: TraceStore,
}

impl EventBus {
    /// Creates a bus for the root agent of a run.
    #[inline]
    pub fn new(sink: Option<Arc<dyn EventSink>>, agent: &str) -> Self {
        Self {
            sink,
            path: agent.to_owned(),
            traces: TraceStore::new(),
        }
    }

    /// Creates a bus that drops every event.
    #[inline]
    pub fn detached() -> Self {
        Self::new(None, "")
    }

    /// Records traces into the given store.
    #[inline]
    pub fn with_trace_store(mut self, traces: TraceStore) -> Self {
        self.traces = traces;
        self
    }

    /// Derives the bus of a nested agent.
    pub fn for_agent(&self, name: &str) -> Self {
        let path = if self.path.is_empty() {
            name.to_owned()
        } else {
            format!("{}.{}", self.path, name)
        };
        Self {
            sink: self.sink.clone(),
            path,
            traces: self.traces.clone(),
        }
    }

    /// Returns the dotted path of the agent.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the trace store of the run.
    #[inline]
    pub fn traces(&self) -> &TraceStore {
        &self.traces
    }

    /// Emits an event of the given kind.
    pub fn emit(&self, kind: EventKind) {
        let Some(sink) = &self.sink else {
            return;
        };
        sink.on_event(&Event {
            agent_path: self.path.clone(),
            kind,
        });
    }

    /// Emits a [`EventKind::Working`] event.
    #[inline]
    pub fn working(
        &self,
        message: impl Into<String>,
        turn: Option<u32>,
        request: Option<Value>,
    ) {
        self.emit(EventKind::Working {
            message: message.into(),
            turn,
            request,
        });
    }

    /// Emits a [`EventKind::Delta`] event.
    #[inline]
    pub fn delta(&self, text: impl Into<String>) {
        self.emit(EventKind::Delta { text: text.into() });
    }

    /// Emits a [`EventKind::Success`] event.
    #[inline]
    pub fn success(&self, message: impl Into<String>) {
        self.emit(EventKind::Success {
            message: message.into(),
        });
    }

    /// Emits a [`EventKind::Error`] event for a failed call.
    pub fn error(&self, message: impl Into<String>, error: &ToolError, turn: u32, call: &ToolCall) {
        self.emit(EventKind::Error {
            message: message.into(),
            error: error.clone(),
            turn,
            call: call.clone(),
        });
    }

    /// Opens a trace and notifies the sink.
    pub fn add_trace(
        &self,
        parent: Option<TraceId>,
        name: impl Into<String>,
        kind: CapabilityKind,
        inputs: Value,
    ) -> TraceId {
        let id = self.traces.start(parent, name, kind, inputs);
        self.notify_trace(id);
        id
    }

    /// Closes a trace and notifies the sink.
    pub fn update_trace(&self, id: TraceId, outcome: TraceOutcome) {
        if self.traces.finish(id, outcome) {
            self.notify_trace(id);
        }
    }

    fn notify_trace(&self, id: TraceId) {
        let Some(sink) = &self.sink else {
            return;
        };
        if let Some(trace) = self.traces.get(id) {
            sink.on_trace(&trace);
        }
    }
}

impl Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("path", &self.path)
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}
