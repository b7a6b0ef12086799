use async_trait::async_trait;
use relay_core::{
    CancellationToken, EventBus, ExecutionContext, Tool, ToolError,
    ToolResult,
};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;

use crate::host::NodeToggler;

#[derive(Deserialize, JsonSchema)]
pub struct ToggleNodeParameters {
    #[schemars(description = "Id of the node to expand or collapse.")]
    id: String,
}

/// A tool that expands or collapses a node of the asset tree.
pub struct ToggleNodeTool {
    parameter_schema: Value,
}

impl ToggleNodeTool {
    /// Creates a new toggle node tool.
    #[inline]
    pub fn new() -> Self {
        ToggleNodeTool {
            parameter_schema: schema_for!(ToggleNodeParameters).to_value(),
        }
    }
}

impl Default for ToggleNodeTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<A> Tool<A> for ToggleNodeTool
where
    A: NodeToggler + Send + Sync + 'static,
{
    type Input = ToggleNodeParameters;

    fn name(&self) -> &str {
        "toggle_node"
    }

    fn title(&self) -> &str {
        "Toggle Node"
    }

    fn description(&self, _ctx: &ExecutionContext<A>) -> String {
        "Expands a collapsed node of the asset tree, or collapses an expanded \
         one. Returns the new state."
            .to_owned()
    }

    fn parameters(&self, _ctx: &ExecutionContext<A>) -> Option<Value> {
        Some(self.parameter_schema.clone())
    }

    async fn run(
        &self,
        ctx: &ExecutionContext<A>,
        input: ToggleNodeParameters,
        _cancel: &CancellationToken,
        _events: &EventBus,
    ) -> ToolResult {
        match ctx.app().toggle_node(&input.id) {
            Some(true) => Ok(format!("Node `{}` is now expanded.", input.id).into()),
            Some(false) => Ok(format!("Node `{}` is now collapsed.", input.id).into()),
            None => Err(ToolError::execution_error()
                .with_reason(format!("No node with id `{}`", input.id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::host::Workspace;

    #[tokio::test]
    async fn test_toggle_node() {
        let ctx = ExecutionContext::new(Arc::new(Workspace::demo()));
        let tool = ToggleNodeTool::new();
        let cancel = CancellationToken::new();
        let events = EventBus::detached();

        let input = || ToggleNodeParameters {
            id: "valves".to_owned(),
        };
        let output = tool.run(&ctx, input(), &cancel, &events).await.unwrap();
        assert_eq!(output.content(), "Node `valves` is now expanded.");
        let output = tool.run(&ctx, input(), &cancel, &events).await.unwrap();
        assert_eq!(output.content(), "Node `valves` is now collapsed.");

        let input = ToggleNodeParameters {
            id: "ghost".to_owned(),
        };
        assert!(tool.run(&ctx, input, &cancel, &events).await.is_err());
    }
}
