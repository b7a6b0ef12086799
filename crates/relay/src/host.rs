//! The host application the tools operate on.
//!
//! Tools never see a concrete host type. Each one bounds the application
//! handle with the narrow trait it needs, so any host that implements
//! [`AssetTreeReader`], [`NodeToggler`] and [`DashboardReader`] can run the
//! bundled agents. [`Workspace`] is an in-memory implementation.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

/// The kind of an asset tree node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A folder that groups other nodes.
    Folder,
    /// A physical or logical asset.
    Asset,
}

/// A node of the asset tree.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetNode {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Folder or asset.
    pub kind: NodeKind,
    /// Whether the node is expanded in the tree view.
    pub expanded: bool,
    /// Child nodes.
    pub children: Vec<AssetNode>,
}

impl AssetNode {
    /// Creates a collapsed folder.
    pub fn folder(
        id: &str,
        name: &str,
        children: impl Into<Vec<AssetNode>>,
    ) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            kind: NodeKind::Folder,
            expanded: false,
            children: children.into(),
        }
    }

    /// Creates an asset.
    pub fn asset(id: &str, name: &str) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            kind: NodeKind::Asset,
            expanded: false,
            children: vec![],
        }
    }

    fn summary(&self) -> AssetSummary {
        AssetSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            expanded: self.expanded,
            child_count: self.children.len(),
        }
    }

    fn count(&self) -> usize {
        1 + self.children.iter().map(AssetNode::count).sum::<usize>()
    }
}

/// What tools report about a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSummary {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Folder or asset.
    pub kind: NodeKind,
    /// Whether the node is expanded.
    pub expanded: bool,
    /// Number of direct children.
    pub child_count: usize,
}

/// A dashboard panel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Panel {
    /// Unique identifier.
    pub id: String,
    /// Panel title.
    pub title: String,
    /// Visualization kind, e.g. `chart` or `gauge`.
    pub kind: String,
    /// The asset the panel displays, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
}

/// Read access to the asset tree.
pub trait AssetTreeReader {
    /// Returns the nodes below `parent`, or the roots when `parent` is
    /// `None`. Returns `None` if there is no such node.
    fn list_assets(&self, parent: Option<&str>) -> Option<Vec<AssetSummary>>;

    /// Returns the total number of nodes.
    fn asset_count(&self) -> usize;
}

/// Expands and collapses nodes of the asset tree.
pub trait NodeToggler {
    /// Flips the expanded state of a node and returns the new state, or
    /// `None` if there is no such node.
    fn toggle_node(&self, id: &str) -> Option<bool>;
}

/// Read access to the dashboard.
pub trait DashboardReader {
    /// Returns all panels.
    fn panels(&self) -> Vec<Panel>;
}

/// Everything the bundled agents need from the host.
pub trait Host:
    AssetTreeReader + NodeToggler + DashboardReader + Send + Sync + 'static
{
}

impl<T> Host for T where
    T: AssetTreeReader + NodeToggler + DashboardReader + Send + Sync + 'static
{
}

/// An in-memory host.
#[derive(Debug, Default)]
pub struct Workspace {
    tree: RwLock<Vec<AssetNode>>,
    panels: Vec<Panel>,
}

impl Workspace {
    /// Creates a workspace with the given tree and panels.
    #[inline]
    pub fn new(tree: Vec<AssetNode>, panels: Vec<Panel>) -> Self {
        Self {
            tree: RwLock::new(tree),
            panels,
        }
    }

    /// Creates a workspace describing a small pumping station.
    pub fn demo() -> Self {
        let tree = vec![
            AssetNode::folder(
                "station",
                "North Station",
                [
                    AssetNode::folder(
                        "pumps",
                        "Pumps",
                        [
                            AssetNode::asset("pump-1", "Pump 1"),
                            AssetNode::asset("pump-2", "Pump 2"),
                        ],
                    ),
                    AssetNode::folder(
                        "valves",
                        "Valves",
                        [AssetNode::asset("valve-1", "Inlet Valve")],
                    ),
                ],
            ),
            AssetNode::asset("weather", "Weather Station"),
        ];
        let panels = vec![
            Panel {
                id: "flow".to_owned(),
                title: "Station Flow".to_owned(),
                kind: "chart".to_owned(),
                asset_id: Some("station".to_owned()),
            },
            Panel {
                id: "pump-1-pressure".to_owned(),
                title: "Pump 1 Pressure".to_owned(),
                kind: "gauge".to_owned(),
                asset_id: Some("pump-1".to_owned()),
            },
            Panel {
                id: "notes".to_owned(),
                title: "Shift Notes".to_owned(),
                kind: "text".to_owned(),
                asset_id: None,
            },
        ];
        Self::new(tree, panels)
    }

    fn tree(&self) -> RwLockReadGuard<'_, Vec<AssetNode>> {
        self.tree.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn tree_mut(&self) -> RwLockWriteGuard<'_, Vec<AssetNode>> {
        self.tree.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn find<'a>(nodes: &'a [AssetNode], id: &str) -> Option<&'a AssetNode> {
    nodes.iter().find_map(|node| {
        if node.id == id {
            Some(node)
        } else {
            find(&node.children, id)
        }
    })
}

fn find_mut<'a>(
    nodes: &'a mut [AssetNode],
    id: &str,
) -> Option<&'a mut AssetNode> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_mut(&mut node.children, id) {
            return Some(found);
        }
    }
    None
}

impl AssetTreeReader for Workspace {
    fn list_assets(&self, parent: Option<&str>) -> Option<Vec<AssetSummary>> {
        let tree = self.tree();
        let nodes = match parent {
            Some(id) => &find(&tree, id)?.children,
            None => &*tree,
        };
        Some(nodes.iter().map(AssetNode::summary).collect())
    }

    fn asset_count(&self) -> usize {
        self.tree().iter().map(AssetNode::count).sum()
    }
}

impl NodeToggler for Workspace {
    fn toggle_node(&self, id: &str) -> Option<bool> {
        let mut tree = self.tree_mut();
        let node = find_mut(&mut tree, id)?;
        node.expanded = !node.expanded;
        debug!("node {id} is now expanded: {}", node.expanded);
        Some(node.expanded)
    }
}

impl DashboardReader for Workspace {
    fn panels(&self) -> Vec<Panel> {
        self.panels.clone()
    }
}
