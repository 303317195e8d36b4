//! Hierarchical views over a document for tree controls

use atf_dom::{Document, NodeId};

/// A root plus a way to enumerate children
pub trait TreeView {
    fn root(&self) -> Option<NodeId>;

    fn children(&self, document: &Document, parent: NodeId) -> Vec<NodeId>;
}

/// Every child of every slot, in slot order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomTreeView {
    root: Option<NodeId>,
}

impl DomTreeView {
    pub fn new(root: NodeId) -> Self {
        Self { root: Some(root) }
    }

    /// View rooted at the document root
    pub fn of_document(document: &Document) -> Self {
        Self {
            root: document.root(),
        }
    }
}

impl TreeView for DomTreeView {
    fn root(&self) -> Option<NodeId> {
        self.root
    }

    fn children(&self, document: &Document, parent: NodeId) -> Vec<NodeId> {
        document.children(parent).collect()
    }
}

/// Only the children held in the named slots, e.g. to hide a
/// `materials` library from an outliner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTreeView {
    root: Option<NodeId>,
    slots: Vec<String>,
}

impl SlotTreeView {
    pub fn new<I, S>(root: NodeId, slots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root: Some(root),
            slots: slots.into_iter().map(Into::into).collect(),
        }
    }

    pub fn slots(&self) -> &[String] {
        &self.slots
    }
}

impl TreeView for SlotTreeView {
    fn root(&self) -> Option<NodeId> {
        self.root
    }

    fn children(&self, document: &Document, parent: NodeId) -> Vec<NodeId> {
        let Ok(data) = document.node(parent) else {
            return Vec::new();
        };
        data.node_type()
            .children()
            .iter()
            .zip(data.slots())
            .filter(|(info, _)| self.slots.iter().any(|s| s == info.name()))
            .flat_map(|(_, slot)| slot.nodes().iter().copied())
            .collect()
    }
}

/// Pre-order `(depth, node)` listing of a view, root at depth 0
pub fn flatten(view: &dyn TreeView, document: &Document) -> Vec<(usize, NodeId)> {
    let mut rows = Vec::new();
    let Some(root) = view.root() else {
        return rows;
    };
    let mut stack = vec![(0, root)];
    while let Some((depth, node)) = stack.pop() {
        rows.push((depth, node));
        let children = view.children(document, node);
        stack.extend(children.into_iter().rev().map(|c| (depth + 1, c)));
    }
    rows
}
