//! Change events and the observer registry
//!
//! Every structural or attribute change is announced twice: a pre-event
//! (`*ing`) before the store is touched and a post-event (`*ed`) after.
//! An observer returning `Err` from a pre-event of an attribute change or a
//! removal vetoes the change. Transaction lifecycle events go through the
//! same registry.

use crate::document::Document;
use crate::error::Result;
use crate::schema::{AttributeInfo, ChildInfo};
use crate::types::{AttributeValue, NodeId};
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeEvent {
    pub node: NodeId,
    pub info: Arc<AttributeInfo>,
    pub old_value: AttributeValue,
    pub new_value: AttributeValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChildEvent {
    pub parent: NodeId,
    pub info: Arc<ChildInfo>,
    pub child: NodeId,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomEvent {
    AttributeChanging(AttributeEvent),
    AttributeChanged(AttributeEvent),
    ChildInserting(ChildEvent),
    ChildInserted(ChildEvent),
    ChildRemoving(ChildEvent),
    ChildRemoved(ChildEvent),
    TransactionBeginning { name: String },
    TransactionEnding { name: String },
    TransactionEnded { name: String },
    TransactionCancelled { name: String },
}

impl DomEvent {
    /// Node the event is raised on: the changed node, or the parent for
    /// child events. Lifecycle events have no subject.
    pub fn subject(&self) -> Option<NodeId> {
        match self {
            DomEvent::AttributeChanging(e) | DomEvent::AttributeChanged(e) => Some(e.node),
            DomEvent::ChildInserting(e)
            | DomEvent::ChildInserted(e)
            | DomEvent::ChildRemoving(e)
            | DomEvent::ChildRemoved(e) => Some(e.parent),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DomEvent::AttributeChanging(_) => "AttributeChanging",
            DomEvent::AttributeChanged(_) => "AttributeChanged",
            DomEvent::ChildInserting(_) => "ChildInserting",
            DomEvent::ChildInserted(_) => "ChildInserted",
            DomEvent::ChildRemoving(_) => "ChildRemoving",
            DomEvent::ChildRemoved(_) => "ChildRemoved",
            DomEvent::TransactionBeginning { .. } => "TransactionBeginning",
            DomEvent::TransactionEnding { .. } => "TransactionEnding",
            DomEvent::TransactionEnded { .. } => "TransactionEnded",
            DomEvent::TransactionCancelled { .. } => "TransactionCancelled",
        }
    }

    /// Pre-events whose failure cancels the change
    pub fn is_vetoable(&self) -> bool {
        matches!(self, DomEvent::AttributeChanging(_) | DomEvent::ChildRemoving(_))
    }

    pub fn is_lifecycle(&self) -> bool {
        self.subject().is_none()
    }
}

/// Receives document events.
///
/// Observers get the document mutably so they can react, but a mutation
/// made while a mutation event is being dispatched fails with `Reentrancy`
/// unless the document allows nesting. Lifecycle events may mutate freely;
/// changes made during `TransactionEnding` join the transaction.
pub trait DomObserver {
    fn name(&self) -> &str;

    fn on_event(&self, document: &mut Document, event: &DomEvent) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

#[derive(Clone)]
pub(crate) struct ObserverEntry {
    pub(crate) id: ObserverId,
    pub(crate) observer: Rc<dyn DomObserver>,
    /// Only events raised on this node or its descendants
    pub(crate) scope: Option<NodeId>,
}

/// Registered observers, notified in registration order
#[derive(Default)]
pub struct ObserverRegistry {
    entries: Vec<ObserverEntry>,
    next_id: u64,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Rc<dyn DomObserver>, scope: Option<NodeId>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        tracing::debug!("Registered observer: {}", observer.name());
        self.entries.push(ObserverEntry {
            id,
            observer,
            scope,
        });
        id
    }

    pub fn unregister(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        before != self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the current entries; dispatch iterates this so observers can
    /// register or unregister while being notified
    pub(crate) fn snapshot(&self) -> Vec<ObserverEntry> {
        self.entries.clone()
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| e.observer.name()))
            .finish()
    }
}
