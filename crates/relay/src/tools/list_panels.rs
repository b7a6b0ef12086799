use async_trait::async_trait;
use relay_core::{
    CancellationToken, EventBus, ExecutionContext, Tool, ToolResult,
};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;

use super::to_json;
use crate::host::DashboardReader;

#[derive(Deserialize, JsonSchema)]
pub struct ListPanelsParameters {
    #[schemars(description = "Only list the panels showing this asset.")]
    asset_id: Option<String>,
}

/// A tool that lists the panels of the dashboard.
pub struct ListPanelsTool {
    parameter_schema: Value,
}

impl ListPanelsTool {
    /// Creates a new list panels tool.
    #[inline]
    pub fn new() -> Self {
        ListPanelsTool {
            parameter_schema: schema_for!(ListPanelsParameters).to_value(),
        }
    }
}

impl Default for ListPanelsTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<A> Tool<A> for ListPanelsTool
where
    A: DashboardReader + Send + Sync + 'static,
{
    type Input = ListPanelsParameters;

    fn name(&self) -> &str {
        "list_panels"
    }

    fn title(&self) -> &str {
        "List Panels"
    }

    fn description(&self, ctx: &ExecutionContext<A>) -> String {
        let count = ctx.app().panels().len();
        format!(
            "Lists the {count} panels of the dashboard with their titles, \
             kinds and the assets they display."
        )
    }

    fn parameters(&self, _ctx: &ExecutionContext<A>) -> Option<Value> {
        Some(self.parameter_schema.clone())
    }

    async fn run(
        &self,
        ctx: &ExecutionContext<A>,
        input: ListPanelsParameters,
        _cancel: &CancellationToken,
        _events: &EventBus,
    ) -> ToolResult {
        let mut panels = ctx.app().panels();
        if let Some(asset_id) = &input.asset_id {
            panels.retain(|panel| panel.asset_id.as_ref() == Some(asset_id));
        }
        Ok(to_json(&panels)?.into())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::host::Workspace;

    #[tokio::test]
    async fn test_list_panels() {
        let ctx = ExecutionContext::new(Arc::new(Workspace::demo()));
        let tool = ListPanelsTool::new();
        assert!(tool.description(&ctx).starts_with("Lists the 3 panels"));

        let output = tool
            .run(
                &ctx,
                ListPanelsParameters {
                    asset_id: Some("pump-1".to_owned()),
                },
                &CancellationToken::new(),
                &EventBus::detached(),
            )
            .await
            .unwrap();
        let panels: Value = serde_json::from_str(output.content()).unwrap();
        assert_eq!(panels.as_array().unwrap().len(), 1);
        assert_eq!(panels[0]["title"], "Pump 1 Pressure");
        assert_eq!(panels[0]["assetId"], "pump-1");
    }
}
