//! Document: an arena of typed nodes plus everything that watches it
//!
//! All mutations go through `Document` and follow the same sequence:
//!
//! ```text
//! guard -> validate -> no-op check -> pre-event -> apply -> record -> post-event
//! ```
//!
//! - guard: reentrancy depth and `require_transactions`
//! - pre-event: `AttributeChanging` / `ChildRemoving` can veto
//! - record: appended to the open transaction unless undo/redo is replaying

use crate::arena::{DomArena, LevelSubtree, Lineage, Subtree};
use crate::error::{DomError, Result, SchemaError};
use crate::event::{AttributeEvent, ChildEvent, DomEvent, DomObserver, ObserverId, ObserverRegistry};
use crate::history::{Command, CommandHistory};
use crate::id_index::IdIndex;
use crate::node::{ChildSlot, NodeData, ParentLink};
use crate::schema::{AttributeInfo, ChildInfo, DomNodeType, Schema};
use crate::transaction::{Operation, TransactionContext};
use crate::types::{AttributeValue, NodeId, NodeTypeId};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

/// What to do when copied or instantiated nodes carry an id already in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdPolicy {
    /// Append `_N` with the smallest free N
    #[default]
    Rename,
    /// Replace with a fresh UUID
    Regenerate,
    /// Fail with `DuplicateId`
    Reject,
}

/// Document configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Reject changes made outside a transaction
    pub require_transactions: bool,
    /// How many nested mutation dispatches an observer may trigger
    pub max_reentrant_depth: usize,
    pub id_policy: IdPolicy,
    /// Oldest commands are dropped beyond this many
    pub history_limit: Option<usize>,
    /// Whether committed transactions go to the history
    pub recording: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            require_transactions: false,
            max_reentrant_depth: 0,
            id_policy: IdPolicy::Rename,
            history_limit: None,
            recording: true,
        }
    }
}

impl DocumentConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug)]
pub struct Document {
    id: Uuid,
    pub(crate) schema: Arc<Schema>,
    pub(crate) config: DocumentConfig,
    pub(crate) arena: DomArena,
    root: Option<NodeId>,
    pub(crate) observers: ObserverRegistry,
    pub(crate) transaction: TransactionContext,
    pub(crate) history: CommandHistory,
    pub(crate) id_index: RefCell<IdIndex>,
    dispatch_depth: usize,
}

impl Document {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_config(schema, DocumentConfig::default())
    }

    pub fn with_config(schema: Arc<Schema>, config: DocumentConfig) -> Self {
        let mut history = CommandHistory::new(config.history_limit);
        history.set_recording(config.recording);
        Self {
            id: Uuid::new_v4(),
            schema,
            config,
            arena: DomArena::new(),
            root: None,
            observers: ObserverRegistry::new(),
            transaction: TransactionContext::default(),
            history,
            id_index: RefCell::new(IdIndex::default()),
            dispatch_depth: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    pub fn arena(&self) -> &DomArena {
        &self.arena
    }

    /// Mark a node as the document root
    pub fn set_root(&mut self, node: NodeId) -> Result<()> {
        self.arena.get(node)?;
        self.root = Some(node);
        Ok(())
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    // ---- nodes ----

    /// New parentless node with every attribute at its default
    pub fn create_node(&mut self, type_id: NodeTypeId) -> Result<NodeId> {
        let node_type = self
            .schema
            .node_type(type_id)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownType(format!("{type_id:?}")))?;
        if node_type.is_abstract() {
            return Err(DomError::TypeConstraintViolation(format!(
                "type '{}' is abstract",
                node_type.name()
            )));
        }
        let id = self.arena.allocate(NodeData::new(node_type));
        tracing::trace!("Created node {}", id);
        Ok(id)
    }

    pub fn create_node_by_name(&mut self, type_name: &str) -> Result<NodeId> {
        let type_id = self
            .schema
            .type_id(type_name)
            .ok_or_else(|| SchemaError::UnknownType(type_name.to_string()))?;
        self.create_node(type_id)
    }

    /// Drop a parentless node and its whole subtree; returns the node count.
    ///
    /// History entries that mention released nodes can no longer be replayed.
    pub fn release(&mut self, node: NodeId) -> Result<usize> {
        if self.arena.get(node)?.parent.is_some() {
            return Err(DomError::NodeAttached(node));
        }
        let nodes: Vec<NodeId> = self.arena.subtree(node).collect();
        for id in &nodes {
            self.arena.free(*id)?;
        }
        if self.root == Some(node) {
            self.root = None;
        }
        self.invalidate_ids();
        tracing::debug!("Released {} nodes under {}", nodes.len(), node);
        Ok(nodes.len())
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.arena.contains(node)
    }

    pub fn node(&self, node: NodeId) -> Result<&NodeData> {
        self.arena.get(node)
    }

    pub fn node_type(&self, node: NodeId) -> Result<&Arc<DomNodeType>> {
        Ok(&self.arena.get(node)?.node_type)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    // ---- navigation ----

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.arena.parent(node)
    }

    /// Parent, slot and index of an attached node
    pub fn containing_slot(&self, node: NodeId) -> Option<(NodeId, Arc<ChildInfo>, usize)> {
        let link = self.arena.get(node).ok()?.parent?;
        let parent = self.arena.get(link.parent).ok()?;
        let info = parent.node_type.children().get(link.slot)?.clone();
        let index = parent.slot(link.slot)?.position(node)?;
        Some((link.parent, info, index))
    }

    /// All children, slot by slot; empty for unknown nodes
    pub fn children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.arena
            .get(node)
            .ok()
            .into_iter()
            .flat_map(|n| n.children())
    }

    pub fn child_list(&self, parent: NodeId, info: &ChildInfo) -> Result<&[NodeId]> {
        let slot = self.resolve_child(parent, info)?;
        if !slot.is_list() {
            return Err(DomError::NotAList(slot.name().to_string()));
        }
        Ok(self.slot(parent, slot.index())?.nodes())
    }

    pub fn get_child(&self, parent: NodeId, info: &ChildInfo) -> Result<Option<NodeId>> {
        let slot = self.resolve_child(parent, info)?;
        if slot.is_list() {
            return Err(DomError::NotASingleton(slot.name().to_string()));
        }
        Ok(self.slot(parent, slot.index())?.nodes().first().copied())
    }

    pub fn child_count(&self, parent: NodeId, info: &ChildInfo) -> Result<usize> {
        let slot = self.resolve_child(parent, info)?;
        Ok(self.slot(parent, slot.index())?.len())
    }

    pub fn index_of(&self, parent: NodeId, info: &ChildInfo, child: NodeId) -> Result<Option<usize>> {
        let slot = self.resolve_child(parent, info)?;
        Ok(self.slot(parent, slot.index())?.position(child))
    }

    pub fn contains_child(&self, parent: NodeId, info: &ChildInfo, child: NodeId) -> Result<bool> {
        Ok(self.index_of(parent, info, child)?.is_some())
    }

    pub fn subtree(&self, root: NodeId) -> Subtree<'_> {
        self.arena.subtree(root)
    }

    pub fn level_subtree(&self, root: NodeId) -> LevelSubtree<'_> {
        self.arena.level_subtree(root)
    }

    /// The node and its ancestors, nearest first
    pub fn lineage(&self, node: NodeId) -> Lineage<'_> {
        self.arena.lineage(node)
    }

    /// Proper ancestors, nearest first
    pub fn ancestry(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.arena.lineage(node).skip(1)
    }

    /// True if `ancestor` is a proper ancestor of `node`
    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        self.ancestry(node).any(|n| n == ancestor)
    }

    pub fn get_root(&self, node: NodeId) -> Option<NodeId> {
        self.arena.root_of(node)
    }

    /// Root-first path down to `node`
    pub fn path(&self, node: NodeId) -> Vec<NodeId> {
        let mut path: Vec<NodeId> = self.arena.lineage(node).collect();
        path.reverse();
        path
    }

    // ---- attributes ----

    /// Effective value: the local value, or the default when unset
    pub fn get_attribute(&self, node: NodeId, info: &AttributeInfo) -> Result<AttributeValue> {
        let attr = self.resolve_attribute(node, info)?;
        Ok(self
            .arena
            .get(node)?
            .local_attribute(attr.index())
            .cloned()
            .unwrap_or_else(|| attr.default_value()))
    }

    /// Only a locally stored value
    pub fn get_local_attribute(&self, node: NodeId, info: &AttributeInfo) -> Result<Option<AttributeValue>> {
        let attr = self.resolve_attribute(node, info)?;
        Ok(self.arena.get(node)?.local_attribute(attr.index()).cloned())
    }

    pub fn is_attribute_default(&self, node: NodeId, info: &AttributeInfo) -> Result<bool> {
        Ok(self.get_local_attribute(node, info)?.is_none())
    }

    /// Set an attribute. `Null` and values equal to the default clear the
    /// local value. Setting the current value is a no-op without events.
    pub fn set_attribute(
        &mut self,
        node: NodeId,
        info: &AttributeInfo,
        value: impl Into<AttributeValue>,
    ) -> Result<()> {
        let value = value.into();
        self.check_mutation()?;
        let attr = self.resolve_attribute(node, info)?;
        self.validate_value(&attr, &value)?;

        let old_value = self.get_attribute(node, &attr)?;
        let default = attr.default_value();
        let new_value = if value.is_null() { default.clone() } else { value };
        if old_value == new_value {
            return Ok(());
        }

        let event = AttributeEvent {
            node,
            info: attr.clone(),
            old_value,
            new_value: new_value.clone(),
        };
        self.dispatch_pre(&DomEvent::AttributeChanging(event.clone()))?;

        let stored = if new_value == default { None } else { Some(new_value) };
        let data = self.arena.get_mut(node)?;
        data.attributes[attr.index()] = stored;
        let is_id = data
            .node_type
            .id_attribute()
            .is_some_and(|id| id.key() == attr.key());
        if is_id {
            self.invalidate_ids();
        }

        let changed = DomEvent::AttributeChanged(event);
        self.record(&changed);
        tracing::trace!("Set {}.{}", node, attr.name());
        self.dispatch(&changed, true)
    }

    /// Set only if no local value exists yet
    pub fn set_attribute_if_default(
        &mut self,
        node: NodeId,
        info: &AttributeInfo,
        value: impl Into<AttributeValue>,
    ) -> Result<bool> {
        if !self.is_attribute_default(node, info)? {
            return Ok(false);
        }
        self.set_attribute(node, info, value)?;
        Ok(true)
    }

    pub fn reset_attribute(&mut self, node: NodeId, info: &AttributeInfo) -> Result<()> {
        self.set_attribute(node, info, AttributeValue::Null)
    }

    /// Value of the type's id attribute, if one is declared and set
    pub fn get_id(&self, node: NodeId) -> Option<String> {
        let data = self.arena.get(node).ok()?;
        let attr = data.node_type.id_attribute()?;
        data.local_attribute(attr.index())?
            .as_str()
            .map(str::to_string)
    }

    // ---- children ----

    /// Insert into a list slot. A node already in the same list is moved;
    /// a node elsewhere is detached first (raising removal events).
    pub fn insert_child(&mut self, parent: NodeId, info: &ChildInfo, index: usize, child: NodeId) -> Result<()> {
        self.check_mutation()?;
        let slot = self.resolve_child(parent, info)?;
        if !slot.is_list() {
            return Err(DomError::NotAList(slot.name().to_string()));
        }
        self.check_insertable(parent, &slot, child)?;

        let current = self.arena.get(child)?.parent;
        let here = ParentLink {
            parent,
            slot: slot.index(),
        };
        let len = self.slot(parent, slot.index())?.len();
        if index > len {
            return Err(DomError::IndexOutOfRange {
                slot: slot.name().to_string(),
                index,
                len,
            });
        }

        let mut index = index;
        if current == Some(here) {
            let position = self
                .slot(parent, slot.index())?
                .position(child)
                .ok_or(DomError::NodeNotFound(child))?;
            if position < index {
                index -= 1;
            }
            if position == index {
                return Ok(());
            }
        } else if slot.max_occurs().is_some_and(|max| len >= max) {
            return Err(DomError::TypeConstraintViolation(format!(
                "slot '{}' already holds {} children",
                slot.name(),
                len
            )));
        }

        if current.is_some() {
            self.remove_from_parent(child)?;
        }
        self.attach(parent, slot, index, child)
    }

    /// Append to a list slot
    pub fn add_child(&mut self, parent: NodeId, info: &ChildInfo, child: NodeId) -> Result<()> {
        let len = self.child_count(parent, info)?;
        self.insert_child(parent, info, len, child)
    }

    /// Replace the child of a single slot; `None` clears it
    pub fn set_child(&mut self, parent: NodeId, info: &ChildInfo, child: Option<NodeId>) -> Result<()> {
        self.check_mutation()?;
        let slot = self.resolve_child(parent, info)?;
        if slot.is_list() {
            return Err(DomError::NotASingleton(slot.name().to_string()));
        }
        let current = self.slot(parent, slot.index())?.nodes().first().copied();
        if current == child {
            return Ok(());
        }
        if let Some(child) = child {
            self.check_insertable(parent, &slot, child)?;
        }

        // The incoming child leaves its old parent first, so a veto there
        // leaves the current occupant in place
        if let Some(child) = child {
            if self.arena.get(child)?.parent.is_some() {
                self.remove_from_parent(child)?;
            }
        }
        if let Some(old) = current {
            self.detach(parent, slot.clone(), 0, old)?;
        }
        if let Some(child) = child {
            self.attach(parent, slot, 0, child)?;
        }
        Ok(())
    }

    pub fn remove_child_at(&mut self, parent: NodeId, info: &ChildInfo, index: usize) -> Result<NodeId> {
        self.check_mutation()?;
        let slot = self.resolve_child(parent, info)?;
        if !slot.is_list() {
            return Err(DomError::NotAList(slot.name().to_string()));
        }
        let nodes = self.slot(parent, slot.index())?.nodes();
        let child = *nodes.get(index).ok_or_else(|| DomError::IndexOutOfRange {
            slot: slot.name().to_string(),
            index,
            len: nodes.len(),
        })?;
        self.detach(parent, slot, index, child)?;
        Ok(child)
    }

    /// Remove `child` from a slot; false if it was not there
    pub fn remove_child(&mut self, parent: NodeId, info: &ChildInfo, child: NodeId) -> Result<bool> {
        let slot = self.resolve_child(parent, info)?;
        match self.slot(parent, slot.index())?.position(child) {
            Some(index) => {
                self.check_mutation()?;
                self.detach(parent, slot, index, child)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Detach a node from its parent; a no-op for roots
    pub fn remove_from_parent(&mut self, node: NodeId) -> Result<()> {
        self.check_mutation()?;
        let Some((parent, slot, index)) = self.containing_slot(node) else {
            self.arena.get(node)?;
            return Ok(());
        };
        self.detach(parent, slot, index, node)
    }

    /// Empty a slot, last child first
    pub fn clear_children(&mut self, parent: NodeId, info: &ChildInfo) -> Result<()> {
        let slot = self.resolve_child(parent, info)?;
        if !slot.is_list() {
            return self.set_child(parent, &slot, None);
        }
        while let Some(last) = self.child_count(parent, &slot)?.checked_sub(1) {
            self.remove_child_at(parent, &slot, last)?;
        }
        Ok(())
    }

    // ---- observers ----

    pub fn observe(&mut self, observer: Rc<dyn DomObserver>) -> ObserverId {
        self.observers.register(observer, None)
    }

    /// Only events raised on `scope` or its descendants, plus lifecycle events
    pub fn observe_subtree(&mut self, scope: NodeId, observer: Rc<dyn DomObserver>) -> ObserverId {
        self.observers.register(observer, Some(scope))
    }

    pub fn unobserve(&mut self, id: ObserverId) -> bool {
        self.observers.unregister(id)
    }

    // ---- transactions ----

    pub fn in_transaction(&self) -> bool {
        self.transaction.in_transaction()
    }

    pub fn transaction(&self) -> &TransactionContext {
        &self.transaction
    }

    pub fn begin(&mut self, name: &str) -> Result<()> {
        if let Some(current) = self.transaction.name() {
            return Err(DomError::Transaction(format!(
                "already in transaction '{current}'"
            )));
        }
        if self.history.is_undoing_or_redoing() {
            return Err(DomError::Transaction(
                "cannot begin a transaction while undoing or redoing".to_string(),
            ));
        }
        self.dispatch(
            &DomEvent::TransactionBeginning {
                name: name.to_string(),
            },
            false,
        )?;
        self.transaction.open(name)?;
        tracing::debug!("[Document] Transaction '{}' started", name);
        Ok(())
    }

    /// Close the open transaction. Returns true when a command was added
    /// to the history (the log was non-empty and recording is on).
    ///
    /// If a `TransactionEnding` observer fails, the transaction is
    /// cancelled and that error is returned.
    pub fn end(&mut self) -> Result<bool> {
        let Some(name) = self.transaction.name().map(str::to_string) else {
            return Err(DomError::Transaction("no transaction in progress".to_string()));
        };

        if let Err(e) = self.dispatch(&DomEvent::TransactionEnding { name: name.clone() }, false) {
            tracing::warn!("[Document] Transaction '{}' failed while ending: {}", name, e);
            if let Err(rollback) = self.cancel() {
                tracing::error!("[Document] Rollback of '{}' failed: {}", name, rollback);
            }
            return Err(e);
        }

        let (name, operations) = self
            .transaction
            .close()
            .ok_or_else(|| DomError::Transaction("transaction closed while ending".to_string()))?;
        let committed = !operations.is_empty() && self.history.is_recording();
        if committed {
            tracing::debug!(
                "[Document] Committed '{}' ({} operations)",
                name,
                operations.len()
            );
            self.history.push(Command::new(name.clone(), operations));
        }

        self.dispatch(&DomEvent::TransactionEnded { name }, false)?;
        Ok(committed)
    }

    /// Roll back the open transaction; a no-op when none is open
    pub fn cancel(&mut self) -> Result<()> {
        let Some((name, operations)) = self.transaction.close() else {
            tracing::debug!("[Document] Cancel without an open transaction");
            return Ok(());
        };
        let rolled_back = self.replay(&operations, true);
        tracing::debug!(
            "[Document] Transaction '{}' cancelled, {} operations rolled back",
            name,
            operations.len()
        );
        let notified = self.dispatch(&DomEvent::TransactionCancelled { name }, false);
        rolled_back.and(notified)
    }

    /// Run `f` in a transaction: end on success, cancel on error.
    /// Inside an already open transaction `f` simply joins it.
    pub fn do_transaction<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if self.transaction.in_transaction() {
            return f(self);
        }
        self.begin(name)?;
        match f(self) {
            Ok(value) => {
                self.end()?;
                Ok(value)
            }
            Err(e) => {
                tracing::warn!("[Document] Transaction '{}' failed: {}", name, e);
                if let Err(rollback) = self.cancel() {
                    tracing::error!("[Document] Rollback of '{}' failed: {}", name, rollback);
                }
                Err(e)
            }
        }
    }

    // ---- history ----

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut CommandHistory {
        &mut self.history
    }

    pub fn can_undo(&self) -> bool {
        !self.transaction.in_transaction() && self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        !self.transaction.in_transaction() && self.history.can_redo()
    }

    pub fn undo(&mut self) -> Result<()> {
        if self.transaction.in_transaction() {
            return Err(DomError::Transaction(
                "cannot undo while a transaction is open".to_string(),
            ));
        }
        let command = self
            .history
            .undo_command()
            .cloned()
            .ok_or_else(|| DomError::Transaction("nothing to undo".to_string()))?;
        self.replay(command.operations(), true)?;
        self.history.step_back();
        tracing::debug!("[Document] Undo '{}'", command.name());
        Ok(())
    }

    pub fn redo(&mut self) -> Result<()> {
        if self.transaction.in_transaction() {
            return Err(DomError::Transaction(
                "cannot redo while a transaction is open".to_string(),
            ));
        }
        let command = self
            .history
            .redo_command()
            .cloned()
            .ok_or_else(|| DomError::Transaction("nothing to redo".to_string()))?;
        self.replay(command.operations(), false)?;
        self.history.step_forward();
        tracing::debug!("[Document] Redo '{}'", command.name());
        Ok(())
    }

    fn replay(&mut self, operations: &[Operation], backwards: bool) -> Result<()> {
        self.history.set_replaying(true);
        let result = if backwards {
            operations.iter().rev().try_for_each(|op| op.undo(self))
        } else {
            operations.iter().try_for_each(|op| op.redo(self))
        };
        self.history.set_replaying(false);
        if let Err(e) = &result {
            tracing::error!("[Document] Replay failed: {}", e);
        }
        result
    }

    // ---- internals ----

    pub(crate) fn resolve_attribute(&self, node: NodeId, info: &AttributeInfo) -> Result<Arc<AttributeInfo>> {
        let node_type = &self.arena.get(node)?.node_type;
        node_type
            .resolve_attribute(info)
            .cloned()
            .ok_or_else(|| DomError::UnknownAttribute {
                node_type: node_type.name().to_string(),
                attribute: info.name().to_string(),
            })
    }

    pub(crate) fn resolve_child(&self, node: NodeId, info: &ChildInfo) -> Result<Arc<ChildInfo>> {
        let node_type = &self.arena.get(node)?.node_type;
        node_type
            .resolve_child(info)
            .cloned()
            .ok_or_else(|| DomError::UnknownChildSlot {
                node_type: node_type.name().to_string(),
                slot: info.name().to_string(),
            })
    }

    fn slot(&self, node: NodeId, index: usize) -> Result<&ChildSlot> {
        self.arena
            .get(node)?
            .slot(index)
            .ok_or(DomError::NodeNotFound(node))
    }

    pub(crate) fn validate_value(&self, info: &AttributeInfo, value: &AttributeValue) -> Result<()> {
        info.validate(value)?;
        if let Some(target) = value.as_reference() {
            let target_type = self.arena.get(target)?.node_type.id();
            if let Some(required) = info.reference_type() {
                if !self.schema.is_assignable(required, target_type) {
                    return Err(DomError::TypeConstraintViolation(format!(
                        "reference '{}' cannot point at a '{}'",
                        info.name(),
                        self.arena.get(target)?.node_type.name()
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_insertable(&self, parent: NodeId, slot: &ChildInfo, child: NodeId) -> Result<()> {
        let child_type = self.arena.get(child)?.node_type.clone();
        if self.arena.is_in_lineage(parent, child) {
            return Err(DomError::Cycle { parent, child });
        }
        if !self.schema.is_assignable(slot.child_type(), child_type.id()) {
            let expected = self
                .schema
                .node_type(slot.child_type())
                .map(|t| t.name().to_string())
                .unwrap_or_default();
            return Err(DomError::TypeConstraintViolation(format!(
                "slot '{}' expects '{}', got '{}'",
                slot.name(),
                expected,
                child_type.name()
            )));
        }
        Ok(())
    }

    fn check_mutation(&self) -> Result<()> {
        if self.dispatch_depth > self.config.max_reentrant_depth {
            tracing::error!(
                "[Document] Mutation during event dispatch (depth {})",
                self.dispatch_depth
            );
            return Err(DomError::Reentrancy {
                depth: self.dispatch_depth,
            });
        }
        if self.config.require_transactions
            && !self.transaction.in_transaction()
            && !self.history.is_undoing_or_redoing()
        {
            return Err(DomError::OutsideTransaction);
        }
        Ok(())
    }

    fn attach(&mut self, parent: NodeId, slot: Arc<ChildInfo>, index: usize, child: NodeId) -> Result<()> {
        let event = ChildEvent {
            parent,
            info: slot.clone(),
            child,
            index,
        };
        // Not vetoable: an error here is reported once the child is in place
        let inserting = self.dispatch(&DomEvent::ChildInserting(event.clone()), true);

        match &mut self.arena.get_mut(parent)?.children[slot.index()] {
            ChildSlot::List(list) => list.insert(index.min(list.len()), child),
            ChildSlot::Single(single) => *single = Some(child),
        }
        self.arena.get_mut(child)?.parent = Some(ParentLink {
            parent,
            slot: slot.index(),
        });
        self.invalidate_ids();

        let inserted = DomEvent::ChildInserted(event);
        self.record(&inserted);
        tracing::trace!("Inserted {} into {}.{}[{}]", child, parent, slot.name(), index);
        let notified = self.dispatch(&inserted, true);
        inserting.and(notified)
    }

    fn detach(&mut self, parent: NodeId, slot: Arc<ChildInfo>, index: usize, child: NodeId) -> Result<()> {
        let event = ChildEvent {
            parent,
            info: slot.clone(),
            child,
            index,
        };
        self.dispatch_pre(&DomEvent::ChildRemoving(event.clone()))?;

        match &mut self.arena.get_mut(parent)?.children[slot.index()] {
            ChildSlot::List(list) => {
                if let Some(position) = list.iter().position(|c| *c == child) {
                    list.remove(position);
                }
            }
            ChildSlot::Single(single) => *single = None,
        }
        self.arena.get_mut(child)?.parent = None;
        self.invalidate_ids();

        let removed = DomEvent::ChildRemoved(event);
        self.record(&removed);
        tracing::trace!("Removed {} from {}.{}[{}]", child, parent, slot.name(), index);
        self.dispatch(&removed, true)
    }

    fn record(&mut self, event: &DomEvent) {
        if self.history.is_undoing_or_redoing() {
            return;
        }
        if let Some(operation) = Operation::from_event(event) {
            self.transaction.record(operation);
        }
    }

    /// Vetoable pre-event: observer errors become `Vetoed`
    fn dispatch_pre(&mut self, event: &DomEvent) -> Result<()> {
        match self.dispatch(event, true) {
            Err(DomError::Reentrancy { depth }) => Err(DomError::Reentrancy { depth }),
            Err(e) => Err(DomError::Vetoed {
                event: event.name(),
                reason: e.to_string(),
            }),
            Ok(()) => Ok(()),
        }
    }

    /// Notify observers in registration order. Mutation events count
    /// towards the reentrancy depth; lifecycle events do not.
    pub(crate) fn dispatch(&mut self, event: &DomEvent, guarded: bool) -> Result<()> {
        if self.observers.is_empty() {
            return Ok(());
        }
        let entries = self.observers.snapshot();
        let lineage: Vec<NodeId> = match event.subject() {
            Some(subject) if entries.iter().any(|e| e.scope.is_some()) => {
                self.arena.lineage(subject).collect()
            }
            _ => Vec::new(),
        };

        if guarded {
            self.dispatch_depth += 1;
        }
        let mut result = Ok(());
        for entry in entries {
            if let (Some(scope), Some(_)) = (entry.scope, event.subject()) {
                if !lineage.contains(&scope) {
                    continue;
                }
            }
            if let Err(e) = entry.observer.on_event(self, event) {
                tracing::warn!(
                    "[Document] Observer '{}' failed on {}: {}",
                    entry.observer.name(),
                    event.name(),
                    e
                );
                if result.is_ok() {
                    result = Err(e);
                }
                if event.is_vetoable() {
                    break;
                }
            }
        }
        if guarded {
            self.dispatch_depth -= 1;
        }
        result
    }

    pub(crate) fn invalidate_ids(&self) {
        self.id_index.borrow_mut().invalidate();
    }

    /// Raw node construction for copy and instantiate: no events, no log
    pub(crate) fn allocate_raw(&mut self, node_type: Arc<DomNodeType>) -> NodeId {
        self.arena.allocate(NodeData::new(node_type))
    }

    pub(crate) fn link_raw(&mut self, parent: NodeId, slot: usize, child: NodeId) -> Result<()> {
        match self
            .arena
            .get_mut(parent)?
            .children
            .get_mut(slot)
            .ok_or(DomError::NodeNotFound(parent))?
        {
            ChildSlot::List(list) => list.push(child),
            ChildSlot::Single(single) => *single = Some(child),
        }
        self.arena.get_mut(child)?.parent = Some(ParentLink { parent, slot });
        Ok(())
    }

    pub(crate) fn store_raw(&mut self, node: NodeId, index: usize, value: Option<AttributeValue>) -> Result<()> {
        let data = self.arena.get_mut(node)?;
        if let Some(slot) = data.attributes.get_mut(index) {
            *slot = value;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture, Recorder};

    #[test]
    fn test_attribute_default_and_local() {
        let fx = fixture();
        let mut doc = fx.document();
        let event = doc.create_node(fx.event_type).unwrap();

        assert_eq!(doc.get_attribute(event, &fx.duration).unwrap(), AttributeValue::Int(0));
        assert!(doc.is_attribute_default(event, &fx.duration).unwrap());

        doc.set_attribute(event, &fx.duration, 5).unwrap();
        assert_eq!(doc.get_local_attribute(event, &fx.duration).unwrap(), Some(AttributeValue::Int(5)));

        doc.reset_attribute(event, &fx.duration).unwrap();
        assert!(doc.is_attribute_default(event, &fx.duration).unwrap());
    }

    #[test]
    fn test_set_attribute_validates_kind_and_rules() {
        let fx = fixture();
        let mut doc = fx.document();
        let event = doc.create_node(fx.event_type).unwrap();

        let err = doc.set_attribute(event, &fx.duration, "long").unwrap_err();
        assert!(matches!(err, DomError::InvalidAttributeValue { .. }));

        let err = doc.set_attribute(event, &fx.duration, -1).unwrap_err();
        assert!(matches!(err, DomError::InvalidAttributeValue { .. }));
    }

    #[test]
    fn test_foreign_attribute_rejected() {
        let fx = fixture();
        let mut doc = fx.document();
        let note = doc.create_node(fx.note_type).unwrap();

        let err = doc.set_attribute(note, &fx.duration, 1).unwrap_err();
        assert!(matches!(err, DomError::UnknownAttribute { .. }));
        let err = doc.add_child(note, &fx.events, note).unwrap_err();
        assert!(matches!(err, DomError::UnknownChildSlot { .. }));
    }

    #[test]
    fn test_inherited_attribute_resolves_on_derived_node() {
        let fx = fixture();
        let mut doc = fx.document();
        let animation = doc.create_node(fx.animation_type).unwrap();

        doc.set_attribute(animation, &fx.resource_name, "walk").unwrap();
        assert_eq!(doc.get_id(animation).as_deref(), Some("walk"));
        assert_eq!(doc.get_attribute(animation, &fx.length).unwrap(), AttributeValue::Float(1.0));
    }

    #[test]
    fn test_abstract_type_cannot_be_instantiated() {
        let fx = fixture();
        let mut doc = fx.document();
        let err = doc.create_node(fx.resource_type).unwrap_err();
        assert!(matches!(err, DomError::TypeConstraintViolation(_)));
    }

    #[test]
    fn test_single_slot_replaces_child() {
        let fx = fixture();
        let mut doc = fx.document();
        let event = doc.create_node(fx.event_type).unwrap();
        let first = doc.create_node(fx.note_type).unwrap();
        let second = doc.create_node(fx.note_type).unwrap();

        doc.set_child(event, &fx.annotation, Some(first)).unwrap();
        doc.set_child(event, &fx.annotation, Some(second)).unwrap();

        assert_eq!(doc.get_child(event, &fx.annotation).unwrap(), Some(second));
        assert_eq!(doc.parent(first), None);
        assert_eq!(doc.parent(second), Some(event));

        let err = doc.add_child(event, &fx.annotation, first).unwrap_err();
        assert!(matches!(err, DomError::NotAList(_)));
    }

    #[test]
    fn test_max_occurs_enforced() {
        let fx = fixture();
        let mut doc = fx.document();
        let event = doc.create_node(fx.event_type).unwrap();
        for _ in 0..3 {
            let anim = doc.create_node(fx.animation_type).unwrap();
            doc.add_child(event, &fx.resources, anim).unwrap();
        }
        let extra = doc.create_node(fx.animation_type).unwrap();
        let err = doc.add_child(event, &fx.resources, extra).unwrap_err();
        assert!(matches!(err, DomError::TypeConstraintViolation(_)));
    }

    #[test]
    fn test_index_out_of_range() {
        let fx = fixture();
        let mut doc = fx.document();
        let root = doc.create_node(fx.root_type).unwrap();
        let event = doc.create_node(fx.event_type).unwrap();

        let err = doc.insert_child(root, &fx.events, 1, event).unwrap_err();
        assert!(matches!(err, DomError::IndexOutOfRange { index: 1, len: 0, .. }));
        assert!(matches!(
            doc.remove_child_at(root, &fx.events, 0).unwrap_err(),
            DomError::IndexOutOfRange { .. }
        ));
    }

    #[test]
    fn test_move_within_list_adjusts_index() {
        let fx = fixture();
        let mut doc = fx.document();
        let (root, events) = fx.root_with_events(&mut doc, &["a", "b", "c"]);

        // Move "a" to the end: index 3 counts "a" itself
        doc.insert_child(root, &fx.events, 3, events[0]).unwrap();
        assert_eq!(doc.child_list(root, &fx.events).unwrap(), &[events[1], events[2], events[0]]);

        // Moving onto its own position changes nothing
        doc.insert_child(root, &fx.events, 1, events[2]).unwrap();
        assert_eq!(doc.child_list(root, &fx.events).unwrap(), &[events[1], events[2], events[0]]);
    }

    #[test]
    fn test_event_order_for_insert_and_remove() {
        let fx = fixture();
        let mut doc = fx.document();
        let root = doc.create_node(fx.root_type).unwrap();
        let event = doc.create_node(fx.event_type).unwrap();
        let recorder = Recorder::new();
        doc.observe(recorder.clone());

        doc.add_child(root, &fx.events, event).unwrap();
        doc.remove_from_parent(event).unwrap();

        assert_eq!(
            recorder.names(),
            vec!["ChildInserting", "ChildInserted", "ChildRemoving", "ChildRemoved"]
        );
    }

    #[test]
    fn test_removal_veto_leaves_tree_unchanged() {
        let fx = fixture();
        let mut doc = fx.document();
        let (root, events) = fx.root_with_events(&mut doc, &["a"]);
        doc.observe(Recorder::vetoing("ChildRemoving"));

        let err = doc.remove_from_parent(events[0]).unwrap_err();
        assert!(matches!(err, DomError::Vetoed { event: "ChildRemoving", .. }));
        assert_eq!(doc.parent(events[0]), Some(root));
    }

    #[test]
    fn test_vetoed_move_keeps_single_slot_occupant() {
        let fx = fixture();
        let mut doc = fx.document();
        let (_, events) = fx.root_with_events(&mut doc, &["a", "b"]);
        let kept = doc.create_node(fx.note_type).unwrap();
        let moving = doc.create_node(fx.note_type).unwrap();
        doc.set_child(events[0], &fx.annotation, Some(kept)).unwrap();
        doc.set_child(events[1], &fx.annotation, Some(moving)).unwrap();
        doc.observe_subtree(events[1], Recorder::vetoing("ChildRemoving"));

        let err = doc
            .set_child(events[0], &fx.annotation, Some(moving))
            .unwrap_err();
        assert!(matches!(err, DomError::Vetoed { .. }));
        assert_eq!(doc.get_child(events[0], &fx.annotation).unwrap(), Some(kept));
        assert_eq!(doc.parent(kept), Some(events[0]));
        assert_eq!(doc.get_child(events[1], &fx.annotation).unwrap(), Some(moving));
    }

    #[test]
    fn test_inserting_error_does_not_skip_observers() {
        let fx = fixture();
        let mut doc = fx.document();
        let (root, _) = fx.root_with_events(&mut doc, &[]);
        let event = doc.create_node(fx.event_type).unwrap();
        doc.observe(Recorder::vetoing("ChildInserting"));
        let later = Recorder::new();
        doc.observe(later.clone());

        assert!(doc.add_child(root, &fx.events, event).is_err());
        assert_eq!(doc.parent(event), Some(root));
        assert_eq!(later.names(), vec!["ChildInserting", "ChildInserted"]);
    }

    #[test]
    fn test_observer_mutation_is_reentrancy_error() {
        let fx = fixture();
        let mut doc = fx.document();
        let event = doc.create_node(fx.event_type).unwrap();
        let recorder = Recorder::mutating(fx.duration.clone());
        doc.observe(recorder.clone());

        let err = doc.set_attribute(event, &fx.name, "x").unwrap_err();
        assert!(matches!(err, DomError::Reentrancy { depth: 1 }));
        // The change itself went through; the nested write did not
        assert_eq!(doc.get_id(event).as_deref(), Some("x"));
        assert_eq!(doc.get_attribute(event, &fx.duration).unwrap(), AttributeValue::Int(0));
    }

    #[test]
    fn test_require_transactions() {
        let fx = fixture();
        let config = DocumentConfig {
            require_transactions: true,
            ..Default::default()
        };
        let mut doc = Document::with_config(fx.schema.clone(), config);
        let event = doc.create_node(fx.event_type).unwrap();

        let err = doc.set_attribute(event, &fx.duration, 2).unwrap_err();
        assert!(matches!(err, DomError::OutsideTransaction));

        doc.do_transaction("set", |d| d.set_attribute(event, &fx.duration, 2))
            .unwrap();
        doc.undo().unwrap();
        assert_eq!(doc.get_attribute(event, &fx.duration).unwrap(), AttributeValue::Int(0));
    }

    #[test]
    fn test_end_reports_commit() {
        let fx = fixture();
        let mut doc = fx.document();
        let event = doc.create_node(fx.event_type).unwrap();

        doc.begin("empty").unwrap();
        assert!(!doc.end().unwrap());
        assert!(!doc.can_undo());

        doc.begin("edit").unwrap();
        doc.set_attribute(event, &fx.duration, 3).unwrap();
        assert!(doc.end().unwrap());
        assert_eq!(doc.history().undo_description(), Some("edit"));
        assert!(doc.end().is_err());
    }

    #[test]
    fn test_nested_do_transaction_joins_outer() {
        let fx = fixture();
        let mut doc = fx.document();
        let event = doc.create_node(fx.event_type).unwrap();

        doc.do_transaction("outer", |d| {
            d.set_attribute(event, &fx.duration, 1)?;
            d.do_transaction("inner", |d| d.set_attribute(event, &fx.name, "n"))
        })
        .unwrap();

        assert_eq!(doc.history().len(), 1);
        assert_eq!(doc.history().undo_command().unwrap().len(), 2);
    }

    #[test]
    fn test_release_requires_detached_root() {
        let fx = fixture();
        let mut doc = fx.document();
        let (root, events) = fx.root_with_events(&mut doc, &["a", "b"]);

        assert!(matches!(doc.release(events[0]), Err(DomError::NodeAttached(_))));
        assert_eq!(doc.release(root).unwrap(), 3);
        assert!(!doc.contains(events[1]));

        // Slot reuse bumps the generation
        let fresh = doc.create_node(fx.note_type).unwrap();
        assert_ne!(fresh, root);
        assert!(doc.node(root).is_err());
    }

    #[test]
    fn test_config_from_json() {
        let config = DocumentConfig::from_json(r#"{"require_transactions": true, "id_policy": "reject"}"#)
            .unwrap();
        assert!(config.require_transactions);
        assert_eq!(config.id_policy, IdPolicy::Reject);
        assert!(config.recording);
    }
}
