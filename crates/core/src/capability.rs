//! Capabilities an agent can offer to the model.
//!
//! A capability is either a [`Tool`], a plain function the host implements,
//! or a nested [`Agent`] that runs its own turn loop when the model calls
//! it. Both are exposed to the model as functions and are registered on an
//! agent through [`Agent::with_tool`] and [`Agent::with_agent`].

mod error;
mod object;

use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use relay_model::{Message, TokenUsage};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::events::EventBus;
pub use error::{ToolError, ToolErrorKind};
pub(crate) use object::{BoxedToolFuture, ToolObject, ToolObjectImpl};

/// The result of a capability call.
pub type ToolResult = Result<ToolOutput, ToolError>;

/// What a capability hands back to the model.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutput {
    /// Plain text content.
    Text(String),
    /// A full message, whose content is forwarded and whose token usage is
    /// attributed to the call.
    Message(Message),
}

impl ToolOutput {
    /// Returns the content that goes into the `tool` message.
    #[inline]
    pub fn content(&self) -> &str {
        match self {
            ToolOutput::Text(text) => text,
            ToolOutput::Message(msg) => &msg.content,
        }
    }

    /// Returns the token usage carried by the output, if any.
    #[inline]
    pub fn token_usage(&self) -> Option<TokenUsage> {
        match self {
            ToolOutput::Text(_) => None,
            ToolOutput::Message(msg) => msg.token_usage,
        }
    }

    /// Consumes the output and returns its content.
    #[inline]
    pub fn into_content(self) -> String {
        match self {
            ToolOutput::Text(text) => text,
            ToolOutput::Message(msg) => msg.content,
        }
    }
}

impl From<String> for ToolOutput {
    #[inline]
    fn from(value: String) -> Self {
        ToolOutput::Text(value)
    }
}

impl From<&str> for ToolOutput {
    #[inline]
    fn from(value: &str) -> Self {
        ToolOutput::Text(value.to_owned())
    }
}

impl From<Message> for ToolOutput {
    #[inline]
    fn from(value: Message) -> Self {
        ToolOutput::Message(value)
    }
}

/// A tool that can be called by the model.
///
/// `A` is the application handle the host passes to a run. Tools read
/// the host state through it, usually by bounding `A` with a small trait
/// that only exposes what the tool needs.
///
/// Descriptions and parameter schemas are computed from the execution
/// context on every turn, so they can reflect the current state of the
/// application.
#[async_trait]
pub trait Tool<A: Send + Sync + 'static>: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned + Send;

    /// Returns the name of the tool, as seen by the model.
    fn name(&self) -> &str;

    /// Returns a human-readable title of the tool.
    fn title(&self) -> &str {
        self.name()
    }

    /// Returns the description of the tool.
    fn description(&self, ctx: &ExecutionContext<A>) -> String;

    /// Returns the JSON schema of the tool parameters.
    ///
    /// `None` means the tool takes no parameters.
    fn parameters(&self, _ctx: &ExecutionContext<A>) -> Option<Value> {
        None
    }

    /// Runs the tool with the given input.
    ///
    /// Long running tools should watch `cancel` and bail out with
    /// [`ToolError::cancelled`] when it fires.
    async fn run(
        &self,
        ctx: &ExecutionContext<A>,
        input: Self::Input,
        cancel: &CancellationToken,
        events: &EventBus,
    ) -> ToolResult;
}

/// The kind of a capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    /// A plain tool.
    Tool,
    /// A nested agent.
    Agent,
}

type DescribeFn<A> = Arc<dyn Fn(&ExecutionContext<A>) -> String + Send + Sync>;
type ParametersFn<A> = Arc<dyn Fn(&ExecutionContext<A>) -> Value + Send + Sync>;

/// An agent definition.
///
/// The agent at the root of a run drives the conversation with the user.
/// Agents registered as plugins of another agent are exposed to the model as
/// functions, and calling one runs a nested turn loop with the plugins of
/// that agent.
pub struct Agent<A> {
    name: String,
    title: String,
    description: DescribeFn<A>,
    parameters: Option<ParametersFn<A>>,
    system_message: Option<String>,
    plugins: Vec<Capability<A>>,
}

impl<A: Send + Sync + 'static> Agent<A> {
    /// Creates an agent with the given name and no plugins.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            name,
            description: Arc::new(|_: &ExecutionContext<A>| String::new()),
            parameters: None,
            system_message: None,
            plugins: vec![],
        }
    }

    /// Sets the human-readable title.
    #[inline]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets a fixed description.
    #[inline]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description =
            Arc::new(move |_: &ExecutionContext<A>| description.clone());
        self
    }

    /// Sets a description computed from the execution context.
    #[inline]
    pub fn with_dynamic_description(
        mut self,
        description: impl Fn(&ExecutionContext<A>) -> String + Send + Sync + 'static,
    ) -> Self {
        self.description = Arc::new(description);
        self
    }

    /// Sets the parameter schema.
    #[inline]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters =
            Some(Arc::new(move |_: &ExecutionContext<A>| parameters.clone()));
        self
    }

    /// Sets a parameter schema computed from the execution context.
    #[inline]
    pub fn with_dynamic_parameters(
        mut self,
        parameters: impl Fn(&ExecutionContext<A>) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.parameters = Some(Arc::new(parameters));
        self
    }

    /// Sets the system message placed in front of the conversation.
    #[inline]
    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool<A>>(mut self, tool: T) -> Self {
        self.plugins.push(Capability::tool(tool));
        self
    }

    /// Registers a nested agent.
    #[inline]
    pub fn with_agent(mut self, agent: Agent<A>) -> Self {
        self.plugins.push(Capability::agent(agent));
        self
    }

    /// Registers a capability.
    #[inline]
    pub fn with_capability(mut self, capability: Capability<A>) -> Self {
        self.plugins.push(capability);
        self
    }
}

impl<A> Agent<A> {
    /// Returns the name of the agent.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the title of the agent.
    #[inline]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the system message of the agent.
    #[inline]
    pub fn system_message(&self) -> Option<&str> {
        self.system_message.as_deref()
    }

    /// Returns the registered capabilities, in registration order.
    #[inline]
    pub fn plugins(&self) -> &[Capability<A>] {
        &self.plugins
    }

    /// Computes the description for the given context.
    #[inline]
    pub fn description(&self, ctx: &ExecutionContext<A>) -> String {
        (self.description)(ctx)
    }

    /// Computes the parameter schema for the given context.
    ///
    /// Agents without an explicit schema take a single `request` string.
    pub fn parameters(&self, ctx: &ExecutionContext<A>) -> Value {
        match &self.parameters {
            Some(parameters) => parameters(ctx),
            None => json!({
                "type": "object",
                "properties": {
                    "request": {
                        "type": "string",
                        "description": "What the agent should do, in plain words."
                    }
                },
                "required": ["request"]
            }),
        }
    }
}

impl<A: 'static> Debug for Agent<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("title", &self.title)
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}

/// A registered capability, either a tool or a nested agent.
pub struct Capability<A>(pub(crate) CapabilityInner<A>);

pub(crate) enum CapabilityInner<A> {
    Tool(Arc<dyn ToolObject<A>>),
    Agent(Arc<Agent<A>>),
}

impl<A: Send + Sync + 'static> Capability<A> {
    /// Wraps a tool.
    #[inline]
    pub fn tool<T: Tool<A>>(tool: T) -> Self {
        Self(CapabilityInner::Tool(Arc::new(ToolObjectImpl(tool))))
    }

    /// Wraps a nested agent.
    #[inline]
    pub fn agent(agent: Agent<A>) -> Self {
        Self(CapabilityInner::Agent(Arc::new(agent)))
    }
}

impl<A: 'static> Capability<A> {
    /// Returns the name the model calls the capability by.
    #[inline]
    pub fn name(&self) -> &str {
        match &self.0 {
            CapabilityInner::Tool(tool) => tool.name(),
            CapabilityInner::Agent(agent) => agent.name(),
        }
    }

    /// Returns the human-readable title.
    #[inline]
    pub fn title(&self) -> &str {
        match &self.0 {
            CapabilityInner::Tool(tool) => tool.title(),
            CapabilityInner::Agent(agent) => agent.title(),
        }
    }

    /// Returns the kind of the capability.
    #[inline]
    pub fn kind(&self) -> CapabilityKind {
        match &self.0 {
            CapabilityInner::Tool(_) => CapabilityKind::Tool,
            CapabilityInner::Agent(_) => CapabilityKind::Agent,
        }
    }

    /// Computes the description for the given context.
    pub fn description(&self, ctx: &ExecutionContext<A>) -> String {
        match &self.0 {
            CapabilityInner::Tool(tool) => tool.description(ctx),
            CapabilityInner::Agent(agent) => agent.description(ctx),
        }
    }

    /// Computes the parameter schema for the given context.
    pub fn parameters(&self, ctx: &ExecutionContext<A>) -> Option<Value> {
        match &self.0 {
            CapabilityInner::Tool(tool) => tool.parameters(ctx),
            CapabilityInner::Agent(agent) => Some(agent.parameters(ctx)),
        }
    }
}

impl<A> Clone for Capability<A> {
    fn clone(&self) -> Self {
        match &self.0 {
            CapabilityInner::Tool(tool) => {
                Self(CapabilityInner::Tool(Arc::clone(tool)))
            }
            CapabilityInner::Agent(agent) => {
                Self(CapabilityInner::Agent(Arc::clone(agent)))
            }
        }
    }
}

impl<A: Send + Sync + 'static> From<Agent<A>> for Capability<A> {
    #[inline]
    fn from(agent: Agent<A>) -> Self {
        Capability::agent(agent)
    }
}

impl<A: 'static> Debug for Capability<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}
