use async_trait::async_trait;
use relay_core::{
    CancellationToken, EventBus, ExecutionContext, Tool, ToolError,
    ToolResult,
};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;

use super::to_json;
use crate::host::AssetTreeReader;

#[derive(Deserialize, JsonSchema)]
pub struct ListAssetsParameters {
    #[schemars(
        description = "Id of the folder to list. Omit it to list the top-level nodes."
    )]
    parent: Option<String>,
}

/// A tool that lists the children of an asset tree node.
pub struct ListAssetsTool {
    parameter_schema: Value,
}

impl ListAssetsTool {
    /// Creates a new list assets tool.
    #[inline]
    pub fn new() -> Self {
        ListAssetsTool {
            parameter_schema: schema_for!(ListAssetsParameters).to_value(),
        }
    }
}

impl Default for ListAssetsTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<A> Tool<A> for ListAssetsTool
where
    A: AssetTreeReader + Send + Sync + 'static,
{
    type Input = ListAssetsParameters;

    fn name(&self) -> &str {
        "list_assets"
    }

    fn title(&self) -> &str {
        "List Assets"
    }

    fn description(&self, ctx: &ExecutionContext<A>) -> String {
        format!(
            "Lists the nodes of the asset tree below a folder, with their ids, \
             kinds and whether they are expanded. The tree has {} nodes.",
            ctx.app().asset_count()
        )
    }

    fn parameters(&self, _ctx: &ExecutionContext<A>) -> Option<Value> {
        Some(self.parameter_schema.clone())
    }

    async fn run(
        &self,
        ctx: &ExecutionContext<A>,
        input: ListAssetsParameters,
        _cancel: &CancellationToken,
        _events: &EventBus,
    ) -> ToolResult {
        let parent = input.parent.as_deref();
        let Some(nodes) = ctx.app().list_assets(parent) else {
            return Err(ToolError::execution_error().with_reason(format!(
                "No node with id `{}`",
                parent.unwrap_or_default()
            )));
        };
        Ok(to_json(&nodes)?.into())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::host::Workspace;

    #[tokio::test]
    async fn test_list_assets() {
        let ctx = ExecutionContext::new(Arc::new(Workspace::demo()));
        let tool = ListAssetsTool::new();
        assert!(tool.description(&ctx).contains("7 nodes"));
        assert!(tool.parameters(&ctx).unwrap()["properties"]["parent"].is_object());

        let output = tool
            .run(
                &ctx,
                ListAssetsParameters {
                    parent: Some("pumps".to_owned()),
                },
                &CancellationToken::new(),
                &EventBus::detached(),
            )
            .await
            .unwrap();
        let nodes: Value = serde_json::from_str(output.content()).unwrap();
        assert_eq!(nodes[0]["id"], json!("pump-1"));
        assert_eq!(nodes[0]["kind"], json!("asset"));
        assert_eq!(nodes[0]["childCount"], json!(0));

        let err = tool
            .run(
                &ctx,
                ListAssetsParameters {
                    parent: Some("ghost".to_owned()),
                },
                &CancellationToken::new(),
                &EventBus::detached(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "No node with id `ghost`");
    }
}
