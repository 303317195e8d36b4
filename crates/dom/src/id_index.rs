//! Lazy id lookup per subtree root
//!
//! Built on first `find_node` for a root and dropped on any structural or
//! id change. Within one root the first node in pre-order wins.

use crate::document::Document;
use crate::types::NodeId;
use ahash::AHashMap;

#[derive(Debug, Default)]
pub(crate) struct IdIndex {
    roots: AHashMap<NodeId, AHashMap<String, NodeId>>,
}

impl IdIndex {
    pub(crate) fn invalidate(&mut self) {
        self.roots.clear();
    }
}

impl Document {
    /// Node under `root` (inclusive) whose id attribute equals `id`
    pub fn find_node(&self, root: NodeId, id: &str) -> Option<NodeId> {
        if !self.arena.contains(root) {
            return None;
        }
        let mut index = self.id_index.borrow_mut();
        let ids = index.roots.entry(root).or_insert_with(|| {
            let mut ids = AHashMap::new();
            for node in self.arena.subtree(root) {
                if let Some(node_id) = self.get_id(node) {
                    ids.entry(node_id).or_insert(node);
                }
            }
            tracing::trace!("Indexed {} ids under {}", ids.len(), root);
            ids
        });
        ids.get(id).copied()
    }
}
