use std::collections::HashSet;

use relay_model::{FunctionDescriptor, Message, Role};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::Error;
use crate::capability::{
    Agent, BoxedToolFuture, Capability, CapabilityInner, CapabilityKind,
    ToolError, ToolOutput,
};
use crate::context::ExecutionContext;
use crate::events::EventBus;
use crate::model_client::ModelClient;
use crate::orchestrator::TurnLoop;

/// The capabilities of one agent, looked up by name.
pub struct Registry<'a, A> {
    capabilities: &'a [Capability<A>],
    client: &'a ModelClient,
    cancel: &'a CancellationToken,
    events: &'a EventBus,
    max_turns: u32,
}

impl<'a, A: Send + Sync + 'static> Registry<'a, A> {
    pub(crate) fn new(
        capabilities: &'a [Capability<A>],
        client: &'a ModelClient,
        cancel: &'a CancellationToken,
        events: &'a EventBus,
        max_turns: u32,
    ) -> Result<Self, Error> {
        let mut names = HashSet::with_capacity(capabilities.len());
        for capability in capabilities {
            if !names.insert(capability.name()) {
                return Err(Error::DuplicateCapability(
                    capability.name().to_owned(),
                ));
            }
        }
        Ok(Self {
            capabilities,
            client,
            cancel,
            events,
            max_turns,
        })
    }

    /// Describes every capability to the model, in registration order.
    pub fn describe_all(
        &self,
        ctx: &ExecutionContext<A>,
    ) -> Vec<FunctionDescriptor> {
        self.capabilities
            .iter()
            .map(|capability| FunctionDescriptor {
                name: capability.name().to_owned(),
                description: capability.description(ctx),
                parameters: capability
                    .parameters(ctx)
                    .filter(|parameters| !parameters.is_null())
                    .unwrap_or_else(FunctionDescriptor::empty_parameters),
            })
            .collect()
    }

    /// Looks up a capability by its exact name.
    ///
    /// Nested agents get an event bus bound to their own path.
    pub fn resolve(
        &self,
        name: &str,
    ) -> Result<ResolvedCapability<'a, A>, ToolError> {
        let Some(capability) =
            self.capabilities.iter().find(|c| c.name() == name)
        else {
            return Err(ToolError::unknown_capability(name));
        };
        let events = match capability.kind() {
            CapabilityKind::Agent => self.events.for_agent(capability.name()),
            CapabilityKind::Tool => self.events.clone(),
        };
        Ok(ResolvedCapability {
            capability,
            client: self.client,
            cancel: self.cancel,
            events,
            max_turns: self.max_turns,
        })
    }
}

/// A capability ready to be run.
pub struct ResolvedCapability<'a, A> {
    capability: &'a Capability<A>,
    client: &'a ModelClient,
    cancel: &'a CancellationToken,
    events: EventBus,
    max_turns: u32,
}

impl<A: Send + Sync + 'static> ResolvedCapability<'_, A> {
    /// Returns the kind of the capability.
    #[inline]
    pub fn kind(&self) -> CapabilityKind {
        self.capability.kind()
    }

    /// Returns the human-readable title.
    #[inline]
    pub fn title(&self) -> &str {
        self.capability.title()
    }

    /// Returns the event bus the capability reports to.
    #[inline]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Runs the capability with parsed arguments.
    ///
    /// A nested agent runs a complete turn loop and answers with its final
    /// assistant message.
    pub fn run<'r>(
        &'r self,
        ctx: &'r ExecutionContext<A>,
        arguments: Value,
    ) -> BoxedToolFuture<'r> {
        match &self.capability.0 {
            CapabilityInner::Tool(tool) => {
                tool.run(ctx, arguments, self.cancel, &self.events)
            }
            CapabilityInner::Agent(agent) => {
                Box::pin(self.run_agent(agent, ctx, arguments))
            }
        }
    }

    async fn run_agent(
        &self,
        agent: &Agent<A>,
        ctx: &ExecutionContext<A>,
        arguments: Value,
    ) -> Result<ToolOutput, ToolError> {
        let messages = seed_messages(ctx.messages(), &arguments);
        let nested = TurnLoop {
            client: self.client,
            agent,
            events: self.events.clone(),
            cancel: self.cancel.clone(),
            max_turns: self.max_turns,
            parent: ctx.parent_trace(),
            system_message: None,
        };
        match nested.run(ctx.app().clone(), messages).await {
            Ok(outcome) => Ok(ToolOutput::Message(outcome.reply)),
            Err(Error::Cancelled) => Err(ToolError::cancelled()),
            Err(err) => {
                Err(ToolError::execution_error().with_reason(err.to_string()))
            }
        }
    }
}

/// Builds the conversation a nested agent starts from: the user and
/// assistant text of the caller, followed by the request.
fn seed_messages(parent: &[Message], arguments: &Value) -> Vec<Message> {
    let mut messages: Vec<_> = parent
        .iter()
        .filter(|msg| !msg.content.is_empty())
        .filter_map(|msg| match msg.role {
            Role::User => Some(Message::user(msg.content.clone())),
            Role::Assistant => Some(Message::assistant(msg.content.clone())),
            Role::System | Role::Tool => None,
        })
        .collect();

    let request = match arguments.get("request").and_then(Value::as_str) {
        Some(request) => Some(request.to_owned()),
        None => match arguments {
            Value::Null => None,
            Value::Object(map) if map.is_empty() => None,
            other => Some(other.to_string()),
        },
    };
    if let Some(request) = request {
        messages.push(Message::user(request));
    }
    messages
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use relay_model::ToolCall;
    use relay_test_model::TestModelProvider;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::capability::{Tool, ToolErrorKind, ToolResult};

    #[derive(Deserialize)]
    struct EchoInput {
        text: String,
    }

    struct EchoTool;

    #[async_trait]
    impl Tool<()> for EchoTool {
        type Input = EchoInput;

        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self, ctx: &ExecutionContext<()>) -> String {
            format!("Echoes text, turn {}", ctx.agent().turn)
        }

        fn parameters(&self, _ctx: &ExecutionContext<()>) -> Option<Value> {
            Some(json!({
                "type": "object",
                "properties": { "text": { "type": "string" } }
            }))
        }

        async fn run(
            &self,
            _ctx: &ExecutionContext<()>,
            input: EchoInput,
            _cancel: &CancellationToken,
            _events: &EventBus,
        ) -> ToolResult {
            Ok(input.text.into())
        }
    }

    struct Fixture {
        client: ModelClient,
        cancel: CancellationToken,
        events: EventBus,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                client: ModelClient::new(TestModelProvider::default()),
                cancel: CancellationToken::new(),
                events: EventBus::new(None, "main"),
            }
        }

        fn registry<'a>(
            &'a self,
            capabilities: &'a [Capability<()>],
        ) -> Result<Registry<'a, ()>, Error> {
            Registry::new(capabilities, &self.client, &self.cancel, &self.events, 10)
        }
    }

    #[tokio::test]
    async fn test_resolve() {
        let fixture = Fixture::new();
        let capabilities: [Capability<()>; 2] = [
            Capability::tool(EchoTool),
            Capability::agent(Agent::new("asset_tree").with_description("Asset tree")),
        ];
        let registry = fixture.registry(&capabilities).unwrap();
        let ctx = ExecutionContext::new(Arc::new(()));

        let echo = registry.resolve("echo").unwrap();
        assert_eq!(echo.kind(), CapabilityKind::Tool);
        assert_eq!(echo.events().path(), "main");
        let output = echo.run(&ctx, json!({ "text": "hi" })).await.unwrap();
        assert_eq!(output.content(), "hi");

        // Resolving twice yields equivalent handles.
        let again = registry.resolve("echo").unwrap();
        assert_eq!(again.title(), echo.title());
        assert_eq!(again.kind(), echo.kind());
        let output = again.run(&ctx, json!({ "text": "hi" })).await.unwrap();
        assert_eq!(output.content(), "hi");

        let agent = registry.resolve("asset_tree").unwrap();
        assert_eq!(agent.kind(), CapabilityKind::Agent);
        assert_eq!(agent.events().path(), "main.asset_tree");

        let err = registry.resolve("ghost_tool").err().unwrap();
        assert_eq!(err.kind(), ToolErrorKind::UnknownCapability);
        assert_eq!(err.reason(), "Unknown function: ghost_tool");
        assert!(registry.resolve("Echo").is_err());
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let fixture = Fixture::new();
        let capabilities: [Capability<()>; 1] = [Capability::tool(EchoTool)];
        let registry = fixture.registry(&capabilities).unwrap();
        let ctx = ExecutionContext::new(Arc::new(()));

        let err = registry
            .resolve("echo")
            .unwrap()
            .run(&ctx, json!({ "txt": "hi" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::InvalidArguments);
    }

    #[test]
    fn test_describe_all() {
        let fixture = Fixture::new();
        let capabilities: [Capability<()>; 3] = [
            Capability::tool(EchoTool),
            Capability::agent(
                Agent::new("asset_tree").with_dynamic_description(|ctx| {
                    format!("{} messages so far", ctx.messages().len())
                }),
            ),
            Capability::agent(Agent::new("panels").with_parameters(json!(null))),
        ];
        let registry = fixture.registry(&capabilities).unwrap();
        let ctx = ExecutionContext::new(Arc::new(()))
            .with_messages(&[Message::user("hi")]);

        let functions = registry.describe_all(&ctx);
        let names: Vec<_> = functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["echo", "asset_tree", "panels"]);
        assert_eq!(functions[0].description, "Echoes text, turn 0");
        assert_eq!(functions[1].description, "1 messages so far");
        assert_eq!(functions[1].parameters["required"], json!(["request"]));
        assert_eq!(
            functions[2].parameters,
            json!({ "type": "object", "properties": {} })
        );
    }

    #[test]
    fn test_duplicate_names() {
        let fixture = Fixture::new();
        let capabilities: [Capability<()>; 2] = [
            Capability::tool(EchoTool),
            Capability::agent(Agent::new("echo")),
        ];
        let err = fixture.registry(&capabilities).err().unwrap();
        assert_eq!(err, Error::DuplicateCapability("echo".to_owned()));
    }

    #[test]
    fn test_seed_messages() {
        let mut call = Message::assistant("Let me ask the tree agent.");
        call.tool_calls.push(ToolCall {
            id: "c1".to_owned(),
            name: "asset_tree".to_owned(),
            arguments: "{}".to_owned(),
        });
        let parent = [
            Message::system("You operate a plant dashboard."),
            Message::user("Open the pumps folder"),
            Message::tool("c0", "[]"),
            call,
        ];

        let seeded = seed_messages(&parent, &json!({ "request": "Expand pumps" }));
        assert_eq!(
            seeded,
            vec![
                Message::user("Open the pumps folder"),
                Message::assistant("Let me ask the tree agent."),
                Message::user("Expand pumps"),
            ]
        );

        let seeded = seed_messages(&parent, &json!({}));
        assert_eq!(seeded.len(), 2);
        let seeded = seed_messages(&[], &json!({ "id": "pumps" }));
        assert_eq!(seeded, vec![Message::user("{\"id\":\"pumps\"}")]);
    }
}
