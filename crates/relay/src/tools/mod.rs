//! Tools over the host application.
//!
//! Each tool is generic over the application handle and only asks for the
//! host trait it uses.

mod list_assets;
mod list_panels;
mod toggle_node;

pub use list_assets::ListAssetsTool;
pub use list_panels::ListPanelsTool;
pub use toggle_node::ToggleNodeTool;

use relay_core::ToolError;
use serde::Serialize;

fn to_json<T: Serialize>(value: &T) -> Result<String, ToolError> {
    serde_json::to_string(value).map_err(|err| {
        ToolError::execution_error().with_reason(err.to_string())
    })
}
