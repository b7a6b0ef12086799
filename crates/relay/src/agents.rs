//! The bundled agents.

use relay_core::{Agent, ExecutionContext};

use crate::host::Host;
use crate::tools::{ListAssetsTool, ListPanelsTool, ToggleNodeTool};

const ASSET_TREE_PROMPT: &str = "You manage the asset tree of the workspace. \
Look nodes up with `list_assets`, starting from the top level when you do not \
know an id, and use `toggle_node` to expand or collapse them. Reply with a \
short summary of what you found or changed.";

/// Creates the agent that browses and edits the asset tree.
pub fn asset_tree_agent<A: Host>() -> Agent<A> {
    Agent::new("asset_tree")
        .with_title("Asset Tree")
        .with_dynamic_description(|ctx: &ExecutionContext<A>| {
            format!(
                "Answers questions about the asset tree ({} nodes) and expands \
                 or collapses its nodes. Pass the question or the change as \
                 `request`.",
                ctx.app().asset_count()
            )
        })
        .with_system_message(ASSET_TREE_PROMPT)
        .with_tool(ListAssetsTool::new())
        .with_tool(ToggleNodeTool::new())
}

/// Creates the top-level agent of a session.
pub fn main_agent<A: Host>() -> Agent<A> {
    Agent::new("main")
        .with_title("Assistant")
        .with_description("Helps the user with the workspace.")
        .with_system_message(include_str!("./system_prompt.md"))
        .with_agent(asset_tree_agent())
        .with_tool(ListPanelsTool::new())
}
