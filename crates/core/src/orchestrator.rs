//! The turn loop.
//!
//! A run alternates between asking the model and executing the functions it
//! calls, until the model answers without calling anything. Each function
//! call gets exactly one `tool` message in reply, in the order the model
//! emitted the calls, even when the call fails.

mod options;

use std::sync::Arc;

use relay_model::{Message, ModelProvider, ModelRequest, Role, ToolCall};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::Error;
use crate::capability::{Agent, CapabilityKind, ToolError, ToolResult};
use crate::context::{AgentOptions, ExecutionContext};
use crate::events::EventBus;
use crate::model_client::ModelClient;
use crate::registry::Registry;
use crate::trace::{TraceId, TraceOutcome, TraceStore};
pub use options::{DEFAULT_MAX_TURNS, RunOptions};

/// The result of a successful run.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// The final assistant message, the one without function calls.
    pub reply: Message,
    /// The whole conversation of the run, system message included.
    pub messages: Vec<Message>,
    /// The traces recorded by the run.
    pub traces: TraceStore,
}

/// Runs agents against a model provider.
#[derive(Clone)]
pub struct Runner {
    client: ModelClient,
}

impl Runner {
    /// Creates a runner with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(provider: P) -> Self {
        Self {
            client: ModelClient::new(provider),
        }
    }

    /// Runs `agent` on the given conversation until the model gives a
    /// final answer.
    ///
    /// Failed function calls are reported back to the model and do not end
    /// the run. The run ends with an error when it is cancelled, when the
    /// model is still calling functions after the turn budget is spent, or
    /// when the backend fails.
    pub async fn run<A: Send + Sync + 'static>(
        &self,
        app: Arc<A>,
        messages: Vec<Message>,
        agent: &Agent<A>,
        options: RunOptions,
    ) -> Result<RunOutcome, Error> {
        let RunOptions {
            max_turns,
            system_message,
            sink,
            cancel,
            parent,
            traces,
        } = options;
        let turn_loop = TurnLoop {
            client: &self.client,
            agent,
            events: EventBus::new(sink, agent.name()).with_trace_store(traces),
            cancel,
            max_turns,
            parent,
            system_message,
        };
        turn_loop
            .run(app, messages)
            .instrument(info_span!("run", agent = agent.name()))
            .await
    }
}

pub(crate) struct TurnLoop<'a, A> {
    pub client: &'a ModelClient,
    pub agent: &'a Agent<A>,
    pub events: EventBus,
    pub cancel: CancellationToken,
    pub max_turns: u32,
    pub parent: Option<TraceId>,
    pub system_message: Option<String>,
}

impl<A: Send + Sync + 'static> TurnLoop<'_, A> {
    pub async fn run(
        self,
        app: Arc<A>,
        mut messages: Vec<Message>,
    ) -> Result<RunOutcome, Error> {
        let agent = self.agent;
        let system_message =
            agent.system_message().or(self.system_message.as_deref());
        let has_system_message =
            messages.first().is_some_and(|msg| msg.role == Role::System);
        if let Some(system_message) = system_message {
            if !has_system_message {
                messages.insert(0, Message::system(system_message));
            }
        }

        let registry = Registry::new(
            agent.plugins(),
            self.client,
            &self.cancel,
            &self.events,
            self.max_turns,
        )?;
        let mut ctx = ExecutionContext::new(app)
            .with_conversation(messages)
            .with_agent(AgentOptions {
                name: agent.name().to_owned(),
                title: agent.title().to_owned(),
                turn: 0,
                max_turns: self.max_turns,
            });

        for turn in 1..=self.max_turns {
            self.check_cancelled()?;
            ctx.set_turn(turn);

            let request = ModelRequest {
                messages: ctx.messages().to_vec(),
                functions: registry.describe_all(&ctx),
            };
            let request_json = serde_json::to_value(&request).unwrap_or_default();
            debug!("{} turn {turn}", self.events.path());
            self.events.working(
                format!("{} is thinking", agent.title()),
                Some(turn),
                Some(request_json.clone()),
            );
            let turn_trace = self.events.add_trace(
                self.parent,
                format!("{} - Turn {turn}", agent.title()),
                CapabilityKind::Agent,
                request_json,
            );

            let reply = match self.send_request(request).await {
                Ok(reply) => reply,
                Err(err) => {
                    self.events
                        .update_trace(turn_trace, TraceOutcome::failure(err.to_string()));
                    return Err(err);
                }
            };
            self.events.update_trace(
                turn_trace,
                TraceOutcome::success(
                    serde_json::to_value(&reply).unwrap_or_default(),
                    reply.token_usage.unwrap_or_default(),
                ),
            );
            ctx.push_message(reply.clone());

            if !reply.has_tool_calls() {
                debug!("{} answered in {turn} turns", self.events.path());
                return Ok(RunOutcome {
                    reply,
                    messages: ctx.into_messages(),
                    traces: self.events.traces().clone(),
                });
            }

            for call in &reply.tool_calls {
                self.check_cancelled()?;
                let content =
                    self.dispatch(&registry, &ctx, call, turn, turn_trace).await?;
                ctx.push_message(Message::tool(&call.id, content));
            }
        }

        warn!(
            "{} still calling functions after {} turns",
            self.events.path(),
            self.max_turns
        );
        Err(Error::MaxTurnsExceeded(self.max_turns))
    }

    async fn send_request(&self, request: ModelRequest) -> Result<Message, Error> {
        let events = self.events.clone();
        self.client
            .send_request(request, &self.cancel, move |text: &str| {
                events.delta(text)
            })
            .await
    }

    /// Runs one call and returns the content of its `tool` message.
    ///
    /// Only a failure while the run is being cancelled is fatal, every
    /// other failure is reported to the model.
    async fn dispatch(
        &self,
        registry: &Registry<'_, A>,
        ctx: &ExecutionContext<A>,
        call: &ToolCall,
        turn: u32,
        turn_trace: TraceId,
    ) -> Result<String, Error> {
        match self.invoke(registry, ctx, call, turn, turn_trace).await {
            Ok(output) => {
                self.events.success(format!("{} finished", call.name));
                Ok(output.into_content())
            }
            Err(err) if self.cancel.is_cancelled() => {
                debug!("{} cancelled during {}: {err}", self.events.path(), call.name);
                Err(Error::Cancelled)
            }
            Err(err) => {
                let message = format!("Error calling function {}: {}", call.name, err);
                warn!("{message}");
                self.events.error(message.clone(), &err, turn, call);
                Ok(message)
            }
        }
    }

    async fn invoke(
        &self,
        registry: &Registry<'_, A>,
        ctx: &ExecutionContext<A>,
        call: &ToolCall,
        turn: u32,
        turn_trace: TraceId,
    ) -> ToolResult {
        let resolved = registry.resolve(&call.name)?;
        let arguments = parse_arguments(&call.arguments)?;

        let kind = resolved.kind();
        let status = match kind {
            CapabilityKind::Tool => format!("Calling {}", resolved.title()),
            CapabilityKind::Agent => format!("Asking {}", resolved.title()),
        };
        self.events.working(status, Some(turn), None);
        let trace =
            self.events
                .add_trace(Some(turn_trace), &call.name, kind, arguments.clone());

        let ctx = ctx.for_call(trace);
        let result = resolved
            .run(&ctx, arguments)
            .instrument(debug_span!("call", name = %call.name, id = %call.id))
            .await;

        let outcome = match &result {
            Ok(output) => {
                // Nested agents account for their usage in their own turns.
                let usage = match kind {
                    CapabilityKind::Tool => output.token_usage().unwrap_or_default(),
                    CapabilityKind::Agent => Default::default(),
                };
                TraceOutcome::success(Value::String(output.content().to_owned()), usage)
            }
            Err(err) => TraceOutcome::failure(err.to_string()),
        };
        self.events.update_trace(trace, outcome);
        result
    }

    fn check_cancelled(&self) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            debug!("{} cancelled", self.events.path());
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

/// Parses the argument string of a call. Blank arguments mean no arguments.
fn parse_arguments(arguments: &str) -> Result<Value, ToolError> {
    if arguments.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(arguments).map_err(|err| {
        ToolError::invalid_arguments()
            .with_reason(format!("Invalid JSON arguments: {err}"))
    })
}
