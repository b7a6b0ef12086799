use std::fmt::{self, Debug};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::events::EventSink;
use crate::trace::{TraceId, TraceStore};

/// The turn budget used when none is configured.
pub const DEFAULT_MAX_TURNS: u32 = 10;

/// Options of a single run.
#[derive(Clone)]
pub struct RunOptions {
    pub(crate) max_turns: u32,
    pub(crate) system_message: Option<String>,
    pub(crate) sink: Option<Arc<dyn EventSink>>,
    pub(crate) cancel: CancellationToken,
    pub(crate) parent: Option<TraceId>,
    pub(crate) traces: TraceStore,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            system_message: None,
            sink: None,
            cancel: CancellationToken::new(),
            parent: None,
            traces: TraceStore::new(),
        }
    }
}

impl RunOptions {
    /// Creates options with the defaults.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of model turns, for the run and for each
    /// nested agent run.
    #[inline]
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Sets the system message used when the agent has none.
    #[inline]
    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    /// Attaches a sink for lifecycle events and trace updates.
    #[inline]
    pub fn with_event_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Attaches a shared sink for lifecycle events and trace updates.
    #[inline]
    pub fn with_shared_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Uses the given token to cancel the run.
    #[inline]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Hangs the traces of the run below an existing trace.
    #[inline]
    pub fn with_parent(mut self, parent: TraceId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Records traces into the given store instead of a fresh one.
    #[inline]
    pub fn with_trace_store(mut self, traces: TraceStore) -> Self {
        self.traces = traces;
        self
    }

    /// Returns the turn budget.
    #[inline]
    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    /// Returns the cancellation token of the run.
    #[inline]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns the trace store of the run.
    #[inline]
    pub fn traces(&self) -> &TraceStore {
        &self.traces
    }
}

impl Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("max_turns", &self.max_turns)
            .field("system_message", &self.system_message)
            .field("has_sink", &self.sink.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}
