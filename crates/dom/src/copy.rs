//! Deep copy of node sets
//!
//! Copying is a worklist walk, not recursion, so tree depth is bounded only
//! by memory. A second pass points reference attributes that target a
//! copied node at its copy; references leaving the copied set keep their
//! original target. Ids that collide with live nodes go through the
//! document's [`IdPolicy`].

use crate::document::{Document, IdPolicy};
use crate::error::{DomError, Result};
use crate::types::{AttributeKind, AttributeValue, NodeId};
use crate::utils::unique_name;
use ahash::{AHashMap, AHashSet};
use uuid::Uuid;

impl Document {
    /// Copy each node with its subtree. Copies are new parentless nodes;
    /// building them raises no events.
    pub fn copy(&mut self, originals: &[NodeId]) -> Result<Vec<NodeId>> {
        self.copy_with_map(originals).map(|(copies, _)| copies)
    }

    /// Like [`Document::copy`], also returning the original-to-copy map
    pub fn copy_with_map(
        &mut self,
        originals: &[NodeId],
    ) -> Result<(Vec<NodeId>, AHashMap<NodeId, NodeId>)> {
        for original in originals {
            self.arena.get(*original)?;
        }

        let mut map = AHashMap::new();
        let mut created = Vec::new();
        match self.copy_trees(originals, &mut map, &mut created) {
            Ok(copies) => {
                tracing::debug!(
                    "Copied {} nodes from {} roots",
                    created.len(),
                    originals.len()
                );
                Ok((copies, map))
            }
            Err(e) => {
                self.discard_raw(&created);
                Err(e)
            }
        }
    }

    fn copy_trees(
        &mut self,
        originals: &[NodeId],
        map: &mut AHashMap<NodeId, NodeId>,
        created: &mut Vec<NodeId>,
    ) -> Result<Vec<NodeId>> {
        let mut copies = Vec::with_capacity(originals.len());
        for original in originals {
            let root_copy = self.copy_node(*original, map, created)?;
            copies.push(root_copy);

            let mut stack = vec![(*original, root_copy)];
            while let Some((source, target)) = stack.pop() {
                let slots: Vec<Vec<NodeId>> = self
                    .arena
                    .get(source)?
                    .slots()
                    .iter()
                    .map(|s| s.nodes().to_vec())
                    .collect();
                for (slot, children) in slots.into_iter().enumerate() {
                    for child in children {
                        let child_copy = self.copy_node(child, map, created)?;
                        self.link_raw(target, slot, child_copy)?;
                        stack.push((child, child_copy));
                    }
                }
            }
        }

        self.remap_references(created, map)?;
        self.resolve_id_collisions(created)?;
        Ok(copies)
    }

    fn copy_node(
        &mut self,
        source: NodeId,
        map: &mut AHashMap<NodeId, NodeId>,
        created: &mut Vec<NodeId>,
    ) -> Result<NodeId> {
        let data = self.arena.get(source)?;
        let node_type = data.node_type.clone();
        let attributes = data.attributes.clone();
        let copy = self.allocate_raw(node_type);
        self.arena.get_mut(copy)?.attributes = attributes;
        map.insert(source, copy);
        created.push(copy);
        Ok(copy)
    }

    /// Point references that target a mapped node at its counterpart
    pub(crate) fn remap_references(
        &mut self,
        nodes: &[NodeId],
        map: &AHashMap<NodeId, NodeId>,
    ) -> Result<()> {
        for node in nodes {
            let node_type = self.arena.get(*node)?.node_type.clone();
            for attr in node_type
                .attributes()
                .iter()
                .filter(|a| a.kind() == AttributeKind::Reference)
            {
                let target = self
                    .arena
                    .get(*node)?
                    .local_attribute(attr.index())
                    .and_then(AttributeValue::as_reference);
                if let Some(mapped) = target.and_then(|t| map.get(&t)) {
                    self.store_raw(*node, attr.index(), Some(AttributeValue::Reference(*mapped)))?;
                }
            }
        }
        Ok(())
    }

    /// Apply the id policy to fresh nodes whose id is already taken by a
    /// live node or by an earlier node of `nodes`
    pub(crate) fn resolve_id_collisions(&mut self, nodes: &[NodeId]) -> Result<()> {
        let fresh: AHashSet<NodeId> = nodes.iter().copied().collect();
        let mut used: AHashSet<String> = self
            .arena
            .node_ids()
            .filter(|n| !fresh.contains(n))
            .filter_map(|n| self.get_id(n))
            .collect();

        for node in nodes {
            let Some(id) = self.get_id(*node) else {
                continue;
            };
            if used.insert(id.clone()) {
                continue;
            }

            let replacement = match self.config.id_policy {
                IdPolicy::Rename => unique_name(&id, |candidate| used.contains(candidate)),
                IdPolicy::Regenerate => Uuid::new_v4().to_string(),
                IdPolicy::Reject => return Err(DomError::DuplicateId(id)),
            };
            tracing::debug!("Id '{}' in use, assigned '{}' to {}", id, replacement, node);

            let data = self.arena.get(*node)?;
            let Some(attr) = data.node_type.id_attribute().cloned() else {
                continue;
            };
            let value = match data.local_attribute(attr.index()) {
                Some(AttributeValue::Uri(_)) => AttributeValue::Uri(replacement.clone()),
                _ => AttributeValue::String(replacement.clone()),
            };
            self.store_raw(*node, attr.index(), Some(value))?;
            used.insert(replacement);
        }
        self.invalidate_ids();
        Ok(())
    }

    /// Free nodes built by a failed copy or instantiation
    pub(crate) fn discard_raw(&mut self, nodes: &[NodeId]) {
        for node in nodes {
            if let Err(e) = self.arena.free(*node) {
                tracing::warn!("Failed to discard {}: {}", node, e);
            }
        }
    }
}
