//! Per-node storage held by the arena

use crate::adapter::CachedAdapter;
use crate::schema::{ChildInfo, DomNodeType};
use crate::types::{AttributeValue, NodeId};
use smallvec::SmallVec;
use std::sync::Arc;

/// Where a node hangs in its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParentLink {
    pub parent: NodeId,
    /// Index of the child slot in the parent's type
    pub slot: usize,
}

/// Contents of one child slot
#[derive(Debug, Clone, PartialEq)]
pub enum ChildSlot {
    Single(Option<NodeId>),
    List(SmallVec<[NodeId; 4]>),
}

impl ChildSlot {
    pub fn for_info(info: &ChildInfo) -> Self {
        if info.is_list() {
            ChildSlot::List(SmallVec::new())
        } else {
            ChildSlot::Single(None)
        }
    }

    pub fn nodes(&self) -> &[NodeId] {
        match self {
            ChildSlot::Single(child) => child.as_slice(),
            ChildSlot::List(children) => children.as_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes().is_empty()
    }

    pub fn position(&self, child: NodeId) -> Option<usize> {
        self.nodes().iter().position(|c| *c == child)
    }
}

/// A node: its type, local attribute values, child slots and parent link
#[derive(Debug)]
pub struct NodeData {
    pub(crate) node_type: Arc<DomNodeType>,
    /// `None` means "not set locally", reads fall back to the default
    pub(crate) attributes: Vec<Option<AttributeValue>>,
    pub(crate) children: SmallVec<[ChildSlot; 2]>,
    pub(crate) parent: Option<ParentLink>,
    pub(crate) adapters: SmallVec<[CachedAdapter; 1]>,
}

impl NodeData {
    pub(crate) fn new(node_type: Arc<DomNodeType>) -> Self {
        let attributes = vec![None; node_type.attributes().len()];
        let children = node_type
            .children()
            .iter()
            .map(|c| ChildSlot::for_info(c))
            .collect();
        Self {
            node_type,
            attributes,
            children,
            parent: None,
            adapters: SmallVec::new(),
        }
    }

    pub fn node_type(&self) -> &Arc<DomNodeType> {
        &self.node_type
    }

    pub fn parent(&self) -> Option<ParentLink> {
        self.parent
    }

    pub fn local_attribute(&self, index: usize) -> Option<&AttributeValue> {
        self.attributes.get(index).and_then(Option::as_ref)
    }

    pub fn slot(&self, index: usize) -> Option<&ChildSlot> {
        self.children.get(index)
    }

    pub fn slots(&self) -> &[ChildSlot] {
        &self.children
    }

    /// All children, slot by slot in schema order
    pub fn children(&self) -> impl DoubleEndedIterator<Item = NodeId> + '_ {
        self.children.iter().flat_map(|s| s.nodes().iter().copied())
    }
}
