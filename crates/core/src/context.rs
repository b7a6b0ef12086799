use std::fmt::{self, Debug};
use std::sync::Arc;

use relay_model::Message;

use crate::trace::TraceId;

/// Information about the agent whose loop is running.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AgentOptions {
    /// Name of the agent.
    pub name: String,
    /// Title of the agent.
    pub title: String,
    /// The current turn, starting at 1.
    pub turn: u32,
    /// The turn budget of the loop.
    pub max_turns: u32,
}

/// What a capability sees when it is described or run.
pub struct ExecutionContext<A> {
    app: Arc<A>,
    messages: Arc<Vec<Message>>,
    agent: AgentOptions,
    parent_trace: Option<TraceId>,
}

impl<A> ExecutionContext<A> {
    /// Creates a context with no conversation, mostly useful for exercising
    /// tools on their own.
    #[inline]
    pub fn new(app: Arc<A>) -> Self {
        Self {
            app,
            messages: Arc::default(),
            agent: AgentOptions::default(),
            parent_trace: None,
        }
    }

    /// Replaces the conversation seen by capabilities.
    #[inline]
    pub fn with_messages(mut self, messages: &[Message]) -> Self {
        self.messages = Arc::new(messages.to_vec());
        self
    }

    #[inline]
    pub(crate) fn with_conversation(mut self, messages: Vec<Message>) -> Self {
        self.messages = Arc::new(messages);
        self
    }

    #[inline]
    pub(crate) fn with_agent(mut self, agent: AgentOptions) -> Self {
        self.agent = agent;
        self
    }

    #[inline]
    pub(crate) fn set_turn(&mut self, turn: u32) {
        self.agent.turn = turn;
    }

    /// Appends to the conversation. Contexts handed to capabilities share
    /// the list, it is only copied if one of them is still alive.
    pub(crate) fn push_message(&mut self, message: Message) {
        Arc::make_mut(&mut self.messages).push(message);
    }

    pub(crate) fn into_messages(self) -> Vec<Message> {
        Arc::unwrap_or_clone(self.messages)
    }

    pub(crate) fn for_call(&self, trace: TraceId) -> Self {
        Self {
            parent_trace: Some(trace),
            ..self.clone()
        }
    }

    /// Returns the application handle.
    #[inline]
    pub fn app(&self) -> &Arc<A> {
        &self.app
    }

    /// Returns the conversation so far, including the results of the tool
    /// calls already answered in this turn.
    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the running agent.
    #[inline]
    pub fn agent(&self) -> &AgentOptions {
        &self.agent
    }

    /// Returns the trace of the call being executed, if any.
    #[inline]
    pub fn parent_trace(&self) -> Option<TraceId> {
        self.parent_trace
    }
}

impl<A> Clone for ExecutionContext<A> {
    fn clone(&self) -> Self {
        Self {
            app: Arc::clone(&self.app),
            messages: Arc::clone(&self.messages),
            agent: self.agent.clone(),
            parent_trace: self.parent_trace,
        }
    }
}

impl<A> Debug for ExecutionContext<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("messages", &self.messages.len())
            .field("agent", &self.agent)
            .field("parent_trace", &self.parent_trace)
            .finish_non_exhaustive()
    }
}
