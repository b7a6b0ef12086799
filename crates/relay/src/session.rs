use std::sync::Arc;

use relay_core::{
    Agent, CancellationToken, DEFAULT_MAX_TURNS, Error, EventSink,
    RunOptions, Runner, TraceStore,
};
use relay_model::{Message, ModelProvider, Role};

use crate::agents::main_agent;
use crate::host::Host;

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder<A> {
    runner: Runner,
    app: Arc<A>,
    agent: Option<Agent<A>>,
    max_turns: u32,
    sink: Option<Arc<dyn EventSink>>,
}

impl<A: Host> SessionBuilder<A> {
    /// Creates a session builder with a specified model provider and host
    /// application.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
        app: Arc<A>,
    ) -> Self {
        Self {
            runner: Runner::with_model_provider(provider),
            app,
            agent: None,
            max_turns: DEFAULT_MAX_TURNS,
            sink: None,
        }
    }

    /// Replaces the bundled main agent.
    #[inline]
    pub fn with_agent(mut self, agent: Agent<A>) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Sets the turn budget of each message.
    #[inline]
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Attaches a sink to be notified of lifecycle events and traces.
    #[inline]
    pub fn on_event(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session<A> {
        Session {
            runner: self.runner,
            app: self.app,
            agent: self.agent.unwrap_or_else(main_agent),
            max_turns: self.max_turns,
            sink: self.sink,
            history: vec![],
            last_traces: TraceStore::new(),
        }
    }
}

/// A chat session, like a window that displays messages and has a input box.
///
/// The session keeps the conversation between runs, so each message is
/// answered with the earlier exchanges in context.
pub struct Session<A> {
    runner: Runner,
    app: Arc<A>,
    agent: Agent<A>,
    max_turns: u32,
    sink: Option<Arc<dyn EventSink>>,
    history: Vec<Message>,
    last_traces: TraceStore,
}

impl<A: Host> Session<A> {
    /// Sends a message to the session and waits for the final answer.
    ///
    /// The conversation is only extended when the run succeeds.
    pub async fn send_message(
        &mut self,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<Message, Error> {
        let mut messages = self.history.clone();
        messages.push(Message::user(text));

        let traces = TraceStore::new();
        self.last_traces = traces.clone();
        let mut options = RunOptions::new()
            .with_max_turns(self.max_turns)
            .with_cancellation(cancel)
            .with_trace_store(traces);
        if let Some(sink) = &self.sink {
            options = options.with_shared_event_sink(sink.clone());
        }

        let outcome = self
            .runner
            .run(self.app.clone(), messages, &self.agent, options)
            .await?;
        self.history = outcome
            .messages
            .into_iter()
            .filter(|message| message.role != Role::System)
            .collect();
        Ok(outcome.reply)
    }

    /// Returns the conversation so far, without system messages.
    #[inline]
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Returns the traces of the latest message, including a failed one.
    #[inline]
    pub fn last_traces(&self) -> &TraceStore {
        &self.last_traces
    }

    /// Returns the host application.
    #[inline]
    pub fn app(&self) -> &Arc<A> {
        &self.app
    }
}
