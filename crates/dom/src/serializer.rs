//! Snapshots and text outlines of node trees
//!
//! This module handles:
//! - `NodeSnapshot`: a self-contained serde copy of a subtree, used for
//!   clipboard payloads and persistence
//! - `Document::instantiate`: turning snapshots back into live nodes
//! - `DomSerializer`: an indented, human-readable outline

use crate::document::Document;
use crate::error::{DomError, Result, SchemaError};
use crate::types::{AttributeKind, AttributeValue, NodeId};
use crate::utils::cap_text_length;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Serializable copy of a node and its subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub node_type: String,
    /// Node this snapshot was taken from; reference values in the snapshot
    /// use these handles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<NodeId>,
    /// Local attribute values only
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SlotSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub slot: String,
    pub nodes: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            source: None,
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, slot: &str, child: NodeSnapshot) -> Self {
        match self.children.iter_mut().find(|s| s.slot == slot) {
            Some(existing) => existing.nodes.push(child),
            None => self.children.push(SlotSnapshot {
                slot: slot.to_string(),
                nodes: vec![child],
            }),
        }
        self
    }

    /// Number of nodes in the snapshot
    pub fn count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(snapshot) = stack.pop() {
            count += 1;
            stack.extend(snapshot.children.iter().flat_map(|s| s.nodes.iter()));
        }
        count
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Document {
    /// Snapshot of `node` and its subtree
    pub fn snapshot(&self, node: NodeId) -> Result<NodeSnapshot> {
        let data = self.arena.get(node)?;
        let node_type = &data.node_type;

        let attributes = node_type
            .attributes()
            .iter()
            .filter_map(|attr| {
                data.local_attribute(attr.index())
                    .map(|value| (attr.name().to_string(), value.clone()))
            })
            .collect();

        let mut children = Vec::new();
        for (info, slot) in node_type.children().iter().zip(data.slots()) {
            if slot.is_empty() {
                continue;
            }
            let nodes = slot
                .nodes()
                .iter()
                .map(|child| self.snapshot(*child))
                .collect::<Result<Vec<_>>>()?;
            children.push(SlotSnapshot {
                slot: info.name().to_string(),
                nodes,
            });
        }

        Ok(NodeSnapshot {
            node_type: node_type.name().to_string(),
            source: Some(node),
            attributes,
            children,
        })
    }

    /// Build a new parentless subtree from a snapshot
    pub fn instantiate(&mut self, snapshot: &NodeSnapshot) -> Result<NodeId> {
        let roots = self.instantiate_all(std::slice::from_ref(snapshot))?;
        roots
            .first()
            .copied()
            .ok_or_else(|| DomError::TypeConstraintViolation("empty snapshot".to_string()))
    }

    /// Build several subtrees at once. References between them are
    /// remapped to the new nodes; references to live nodes of this document
    /// are kept when still valid and cleared otherwise.
    pub fn instantiate_all(&mut self, snapshots: &[NodeSnapshot]) -> Result<Vec<NodeId>> {
        let mut created = Vec::new();
        let mut map = AHashMap::new();
        match self.build_snapshots(snapshots, &mut created, &mut map) {
            Ok(roots) => {
                tracing::debug!("Instantiated {} nodes", created.len());
                Ok(roots)
            }
            Err(e) => {
                self.discard_raw(&created);
                Err(e)
            }
        }
    }

    fn build_snapshots(
        &mut self,
        snapshots: &[NodeSnapshot],
        created: &mut Vec<NodeId>,
        map: &mut AHashMap<NodeId, NodeId>,
    ) -> Result<Vec<NodeId>> {
        let mut roots = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            let root = self.build_snapshot_node(snapshot, created, map)?;
            roots.push(root);

            let mut stack = vec![(snapshot, root)];
            while let Some((snapshot, node)) = stack.pop() {
                let node_type = self.arena.get(node)?.node_type.clone();
                for slot in &snapshot.children {
                    let info = node_type.child_info(&slot.slot).cloned().ok_or_else(|| {
                        DomError::UnknownChildSlot {
                            node_type: node_type.name().to_string(),
                            slot: slot.slot.clone(),
                        }
                    })?;
                    let limit = if info.is_list() { info.max_occurs() } else { Some(1) };
                    if limit.is_some_and(|max| slot.nodes.len() > max) {
                        return Err(DomError::TypeConstraintViolation(format!(
                            "slot '{}' cannot hold {} children",
                            info.name(),
                            slot.nodes.len()
                        )));
                    }
                    for child_snapshot in &slot.nodes {
                        let child = self.build_snapshot_node(child_snapshot, created, map)?;
                        let child_type = self.arena.get(child)?.node_type.id();
                        if !self.schema.is_assignable(info.child_type(), child_type) {
                            return Err(DomError::TypeConstraintViolation(format!(
                                "slot '{}' cannot hold a '{}'",
                                info.name(),
                                child_snapshot.node_type
                            )));
                        }
                        self.link_raw(node, info.index(), child)?;
                        stack.push((child_snapshot, child));
                    }
                }
            }
        }

        self.remap_references(created, map)?;
        self.clear_invalid_references(created)?;
        self.resolve_id_collisions(created)?;
        Ok(roots)
    }

    fn build_snapshot_node(
        &mut self,
        snapshot: &NodeSnapshot,
        created: &mut Vec<NodeId>,
        map: &mut AHashMap<NodeId, NodeId>,
    ) -> Result<NodeId> {
        let node_type = self
            .schema
            .get_type(&snapshot.node_type)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownType(snapshot.node_type.clone()))?;
        if node_type.is_abstract() {
            return Err(DomError::TypeConstraintViolation(format!(
                "type '{}' is abstract",
                node_type.name()
            )));
        }

        let node = self.allocate_raw(node_type.clone());
        created.push(node);
        if let Some(source) = snapshot.source {
            map.insert(source, node);
        }

        for (name, value) in &snapshot.attributes {
            let attr = node_type
                .attribute_info(name)
                .ok_or_else(|| DomError::UnknownAttribute {
                    node_type: node_type.name().to_string(),
                    attribute: name.clone(),
                })?;
            attr.validate(value)?;
            let stored = if value.is_null() || *value == attr.default_value() {
                None
            } else {
                Some(value.clone())
            };
            self.store_raw(node, attr.index(), stored)?;
        }
        Ok(node)
    }

    /// Drop reference values whose target is gone or has the wrong type
    fn clear_invalid_references(&mut self, nodes: &[NodeId]) -> Result<()> {
        for node in nodes {
            let node_type = self.arena.get(*node)?.node_type.clone();
            for attr in node_type
                .attributes()
                .iter()
                .filter(|a| a.kind() == AttributeKind::Reference)
            {
                let Some(value) = self.arena.get(*node)?.local_attribute(attr.index()).cloned() else {
                    continue;
                };
                if self.validate_value(attr, &value).is_err() {
                    tracing::warn!(
                        "Dropping dangling reference {}.{} ({})",
                        node,
                        attr.name(),
                        value
                    );
                    self.store_raw(*node, attr.index(), None)?;
                }
            }
        }
        Ok(())
    }
}

/// Outline configuration
#[derive(Debug, Clone)]
pub struct SerializerConfig {
    /// Longer attribute values are cut and suffixed with `...`
    pub max_value_length: usize,
    /// Also print attributes that are at their default
    pub include_defaults: bool,
    pub indent: usize,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            max_value_length: 60,
            include_defaults: false,
            indent: 2,
        }
    }
}

/// Indented text outline of a subtree, one node per line:
///
/// ```text
/// root
///   events: event name="e1" duration=5
///     resources: animation name="walk"
/// ```
pub struct DomSerializer {
    config: SerializerConfig,
}

impl Default for DomSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl DomSerializer {
    pub fn new() -> Self {
        Self::with_config(SerializerConfig::default())
    }

    pub fn with_config(config: SerializerConfig) -> Self {
        Self { config }
    }

    pub fn serialize(&self, document: &Document, root: NodeId) -> Result<String> {
        let mut output = String::with_capacity(1024);
        let mut stack: Vec<(NodeId, usize, Option<String>)> = vec![(root, 0, None)];

        while let Some((node, depth, slot)) = stack.pop() {
            let data = document.node(node)?;
            let node_type = data.node_type();

            let _ = write!(output, "{}", " ".repeat(depth * self.config.indent));
            if let Some(slot) = slot {
                let _ = write!(output, "{slot}: ");
            }
            output.push_str(node_type.name());

            for attr in node_type.attributes() {
                let value = match data.local_attribute(attr.index()) {
                    Some(value) => value.clone(),
                    None if self.config.include_defaults => attr.default_value(),
                    None => continue,
                };
                let text = cap_text_length(&value.to_string(), self.config.max_value_length);
                let _ = write!(output, " {}={}", attr.name(), text);
            }
            output.push('\n');

            for (info, slot) in node_type.children().iter().zip(data.slots()).rev() {
                for child in slot.nodes().iter().rev() {
                    stack.push((*child, depth + 1, Some(info.name().to_string())));
                }
            }
        }

        Ok(output)
    }
}
