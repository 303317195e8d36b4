//! Transaction log
//!
//! While a transaction is open, every post-event is recorded as an
//! [`Operation`]. Cancelling replays the log backwards; ending it turns the
//! log into one undoable [`crate::history::Command`].

use crate::document::Document;
use crate::error::{DomError, Result};
use crate::event::DomEvent;
use crate::schema::{AttributeInfo, ChildInfo};
use crate::types::{AttributeValue, NodeId};
use std::sync::Arc;

/// One recorded, invertible change
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    AttributeChanged {
        node: NodeId,
        info: Arc<AttributeInfo>,
        old_value: AttributeValue,
        new_value: AttributeValue,
    },
    ChildInserted {
        parent: NodeId,
        info: Arc<ChildInfo>,
        child: NodeId,
        index: usize,
    },
    ChildRemoved {
        parent: NodeId,
        info: Arc<ChildInfo>,
        child: NodeId,
        index: usize,
    },
}

impl Operation {
    /// Operation for a post-event; pre-events and lifecycle events give `None`
    pub fn from_event(event: &DomEvent) -> Option<Self> {
        match event {
            DomEvent::AttributeChanged(e) => Some(Operation::AttributeChanged {
                node: e.node,
                info: e.info.clone(),
                old_value: e.old_value.clone(),
                new_value: e.new_value.clone(),
            }),
            DomEvent::ChildInserted(e) => Some(Operation::ChildInserted {
                parent: e.parent,
                info: e.info.clone(),
                child: e.child,
                index: e.index,
            }),
            DomEvent::ChildRemoved(e) => Some(Operation::ChildRemoved {
                parent: e.parent,
                info: e.info.clone(),
                child: e.child,
                index: e.index,
            }),
            _ => None,
        }
    }

    pub fn redo(&self, document: &mut Document) -> Result<()> {
        match self {
            Operation::AttributeChanged {
                node,
                info,
                new_value,
                ..
            } => document.set_attribute(*node, info, new_value.clone()),
            Operation::ChildInserted {
                parent,
                info,
                child,
                index,
            } => restore_child(document, *parent, info, *child, *index),
            Operation::ChildRemoved { child, .. } => document.remove_from_parent(*child),
        }
    }

    pub fn undo(&self, document: &mut Document) -> Result<()> {
        match self {
            Operation::AttributeChanged {
                node,
                info,
                old_value,
                ..
            } => document.set_attribute(*node, info, old_value.clone()),
            Operation::ChildInserted { child, .. } => document.remove_from_parent(*child),
            Operation::ChildRemoved {
                parent,
                info,
                child,
                index,
            } => restore_child(document, *parent, info, *child, *index),
        }
    }

    pub fn description(&self) -> String {
        match self {
            Operation::AttributeChanged {
                node,
                info,
                old_value,
                new_value,
            } => format!("set {}.{}: {} -> {}", node, info.name(), old_value, new_value),
            Operation::ChildInserted {
                parent,
                info,
                child,
                index,
            } => format!("insert {} into {}.{}[{}]", child, parent, info.name(), index),
            Operation::ChildRemoved {
                parent,
                info,
                child,
                index,
            } => format!("remove {} from {}.{}[{}]", child, parent, info.name(), index),
        }
    }
}

fn restore_child(
    document: &mut Document,
    parent: NodeId,
    info: &ChildInfo,
    child: NodeId,
    index: usize,
) -> Result<()> {
    if info.is_list() {
        document.insert_child(parent, info, index, child)
    } else {
        document.set_child(parent, info, Some(child))
    }
}

#[derive(Debug, Default)]
enum TransactionState {
    #[default]
    Closed,
    Open {
        name: String,
        operations: Vec<Operation>,
    },
}

/// Open/closed state plus the operation log of the open transaction
#[derive(Debug, Default)]
pub struct TransactionContext {
    state: TransactionState,
}

impl TransactionContext {
    pub fn in_transaction(&self) -> bool {
        matches!(self.state, TransactionState::Open { .. })
    }

    /// Name of the open transaction
    pub fn name(&self) -> Option<&str> {
        match &self.state {
            TransactionState::Open { name, .. } => Some(name),
            TransactionState::Closed => None,
        }
    }

    pub fn operations(&self) -> &[Operation] {
        match &self.state {
            TransactionState::Open { operations, .. } => operations,
            TransactionState::Closed => &[],
        }
    }

    pub(crate) fn open(&mut self, name: &str) -> Result<()> {
        if let TransactionState::Open { name: current, .. } = &self.state {
            return Err(DomError::Transaction(format!(
                "already in transaction '{current}'"
            )));
        }
        self.state = TransactionState::Open {
            name: name.to_string(),
            operations: Vec::new(),
        };
        Ok(())
    }

    /// Append to the log; a no-op when closed
    pub(crate) fn record(&mut self, operation: Operation) {
        if let TransactionState::Open { name, operations } = &mut self.state {
            tracing::trace!("[{}] recorded {}", name, operation.description());
            operations.push(operation);
        }
    }

    pub(crate) fn close(&mut self) -> Option<(String, Vec<Operation>)> {
        match std::mem::take(&mut self.state) {
            TransactionState::Open { name, operations } => Some((name, operations)),
            TransactionState::Closed => None,
        }
    }
}
