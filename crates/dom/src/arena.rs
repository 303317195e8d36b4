//! Generational node storage
//!
//! Every node sits in a slot of one `Vec`. A [`NodeId`] is the slot index
//! plus the generation the slot had when the node was allocated. Releasing
//! a node bumps the generation, so an old id for a reused slot resolves to
//! `NodeNotFound` instead of to the newcomer.
//!
//! Parent and child links are ids as well. Traversals keep their own stack
//! or queue and borrow the arena while they run.
//!
//! ## Memory Layout
//!
//! ```text
//! Arena: Vec<Slot>
//!        [gen|node][gen|node][gen|----][gen|node]...
//!                              ↑ free slot, reused with gen + 1
//! ```

use crate::error::{DomError, Result};
use crate::node::NodeData;
use crate::types::NodeId;
use std::collections::VecDeque;

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<NodeData>,
}

/// Generational arena of nodes
#[derive(Debug, Default)]
pub struct DomArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl DomArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    pub(crate) fn allocate(&mut self, node: NodeData) -> NodeId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId::new(index, 0)
    }

    /// Drop a node and retire its handle
    pub(crate) fn free(&mut self, id: NodeId) -> Result<NodeData> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .ok_or(DomError::NodeNotFound(id))?;
        let node = slot.node.take().ok_or(DomError::NodeNotFound(id))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Ok(node)
    }

    pub fn get(&self, id: NodeId) -> Result<&NodeData> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
            .ok_or(DomError::NodeNotFound(id))
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
            .ok_or(DomError::NodeNotFound(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_ok()
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Every live node, in slot order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.node
                .as_ref()
                .map(|_| NodeId::new(i as u32, s.generation))
        })
    }

    /// Every live node without a parent
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.node_ids()
            .filter(|id| self.parent(*id).is_none())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).ok()?.parent.map(|link| link.parent)
    }

    /// Pre-order, depth-first walk starting at (and including) `root`
    pub fn subtree(&self, root: NodeId) -> Subtree<'_> {
        let stack = if self.contains(root) { vec![root] } else { Vec::new() };
        Subtree { arena: self, stack }
    }

    /// Breadth-first walk starting at (and including) `root`
    pub fn level_subtree(&self, root: NodeId) -> LevelSubtree<'_> {
        let mut queue = VecDeque::new();
        if self.contains(root) {
            queue.push_back(root);
        }
        LevelSubtree { arena: self, queue }
    }

    /// `node`, its parent, its grandparent, ... up to the root
    pub fn lineage(&self, node: NodeId) -> Lineage<'_> {
        let next = if self.contains(node) { Some(node) } else { None };
        Lineage { arena: self, next }
    }

    /// True if `ancestor` is `node` or one of its ancestors
    pub fn is_in_lineage(&self, node: NodeId, ancestor: NodeId) -> bool {
        self.lineage(node).any(|n| n == ancestor)
    }

    /// Topmost ancestor of `node`
    pub fn root_of(&self, node: NodeId) -> Option<NodeId> {
        self.lineage(node).last()
    }
}

/// Pre-order subtree iterator, see [`DomArena::subtree`]
pub struct Subtree<'a> {
    arena: &'a DomArena,
    stack: Vec<NodeId>,
}

impl Iterator for Subtree<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        if let Ok(node) = self.arena.get(id) {
            // Reverse so the first child is popped first
            self.stack.extend(node.children().rev());
        }
        Some(id)
    }
}

/// Breadth-first subtree iterator, see [`DomArena::level_subtree`]
pub struct LevelSubtree<'a> {
    arena: &'a DomArena,
    queue: VecDeque<NodeId>,
}

impl Iterator for LevelSubtree<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.queue.pop_front()?;
        if let Ok(node) = self.arena.get(id) {
            self.queue.extend(node.children());
        }
        Some(id)
    }
}

/// Walk from a node up to its root
pub struct Lineage<'a> {
    arena: &'a DomArena,
    next: Option<NodeId>,
}

impl Iterator for Lineage<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.arena.parent(id);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::fixture;
    use crate::types::NodeId;

    #[test]
    fn test_released_slot_reused_with_new_generation() {
        let fx = fixture();
        let mut doc = fx.document();
        let first = doc.create_node(fx.note_type).unwrap();
        doc.release(first).unwrap();

        let second = doc.create_node(fx.note_type).unwrap();
        assert_eq!(second.index, first.index);
        assert_ne!(second.generation, first.generation);
        assert!(!doc.arena().contains(first));
        assert!(doc.arena().get(first).is_err());
        assert_eq!(doc.arena().len(), 1);
    }

    #[test]
    fn test_traversal_orders() {
        let fx = fixture();
        let mut doc = fx.document();
        let (root, events) = fx.root_with_events(&mut doc, &["a", "b"]);
        let res = doc.create_node(fx.animation_type).unwrap();
        doc.add_child(events[0], &fx.resources, res).unwrap();
        let note = doc.create_node(fx.note_type).unwrap();
        doc.set_child(events[0], &fx.annotation, Some(note)).unwrap();

        let pre: Vec<NodeId> = doc.arena().subtree(root).collect();
        assert_eq!(pre, vec![root, events[0], res, note, events[1]]);

        let level: Vec<NodeId> = doc.arena().level_subtree(root).collect();
        assert_eq!(level, vec![root, events[0], events[1], res, note]);

        let up: Vec<NodeId> = doc.arena().lineage(note).collect();
        assert_eq!(up, vec![note, events[0], root]);
        assert_eq!(doc.arena().root_of(res), Some(root));
        assert!(doc.arena().is_in_lineage(res, root));
        assert!(!doc.arena().is_in_lineage(root, res));
    }

    #[test]
    fn test_roots_and_stale_handles() {
        let fx = fixture();
        let mut doc = fx.document();
        let (root, _) = fx.root_with_events(&mut doc, &["a"]);
        let loose = doc.create_node(fx.note_type).unwrap();

        let roots: Vec<NodeId> = doc.arena().roots().collect();
        assert_eq!(roots, vec![root, loose]);

        doc.release(loose).unwrap();
        assert_eq!(doc.arena().subtree(loose).count(), 0);
        assert_eq!(doc.arena().lineage(loose).count(), 0);
        assert_eq!(doc.arena().parent(loose), None);
    }
}
