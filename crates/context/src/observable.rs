//! Item-level change notification
//!
//! Turns raw DOM events into the insert/remove/change notifications a list
//! or tree control understands. In `TransactionBatched` mode the events of
//! a transaction are held back and coalesced:
//!
//! ```text
//! set a=1, set a=2        -> one ItemChanged (old -> 2)
//! set a=1, set a=old      -> nothing
//! insert X, edit under X  -> one ItemInserted (X)
//! insert X, remove X      -> nothing
//! cancel                  -> nothing
//! ```
//!
//! Changes made outside a transaction, undo and redo included, are
//! reported immediately in both modes. The rollback of a cancelled
//! transaction is not reported at all.

use ahash::AHashMap;
use atf_dom::{
    AttributeInfo, AttributeKey, AttributeValue, Document, DomEvent, DomObserver, NodeId,
    ObserverId,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum ItemEvent {
    ItemInserted {
        parent: NodeId,
        item: NodeId,
        index: usize,
    },
    ItemRemoved {
        parent: NodeId,
        item: NodeId,
        index: usize,
    },
    ItemChanged {
        item: NodeId,
        attribute: Arc<AttributeInfo>,
        old_value: AttributeValue,
        new_value: AttributeValue,
    },
    /// Everything may have changed; views should re-read the tree
    Reloaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportingMode {
    Immediate,
    #[default]
    TransactionBatched,
}

type ItemHandler = Rc<dyn Fn(&ItemEvent)>;

#[derive(Debug, Default)]
struct Batch {
    /// `None` marks an event cancelled by a later one
    pending: Vec<Option<ItemEvent>>,
    changes: AHashMap<(NodeId, AttributeKey), usize>,
    inserted: AHashMap<NodeId, usize>,
}

impl Batch {
    fn clear(&mut self) {
        self.pending.clear();
        self.changes.clear();
        self.inserted.clear();
    }

    fn under_inserted(&self, document: &Document, node: NodeId) -> bool {
        document
            .lineage(node)
            .any(|n| self.inserted.contains_key(&n))
    }

    fn add(&mut self, document: &Document, event: &DomEvent) {
        match event {
            DomEvent::AttributeChanged(e) => {
                if self.under_inserted(document, e.node) {
                    return;
                }
                let key = (e.node, e.info.key());
                if let Some(&position) = self.changes.get(&key) {
                    if let Some(ItemEvent::ItemChanged { new_value, .. }) =
                        &mut self.pending[position]
                    {
                        *new_value = e.new_value.clone();
                    }
                    return;
                }
                self.changes.insert(key, self.pending.len());
                self.pending.push(Some(ItemEvent::ItemChanged {
                    item: e.node,
                    attribute: e.info.clone(),
                    old_value: e.old_value.clone(),
                    new_value: e.new_value.clone(),
                }));
            }
            DomEvent::ChildInserted(e) => {
                if self.under_inserted(document, e.parent) {
                    return;
                }
                self.inserted.insert(e.child, self.pending.len());
                self.pending.push(Some(ItemEvent::ItemInserted {
                    parent: e.parent,
                    item: e.child,
                    index: e.index,
                }));
            }
            DomEvent::ChildRemoved(e) => {
                if let Some(position) = self.inserted.remove(&e.child) {
                    self.pending[position] = None;
                    return;
                }
                if self.under_inserted(document, e.parent) {
                    return;
                }
                self.pending.push(Some(ItemEvent::ItemRemoved {
                    parent: e.parent,
                    item: e.child,
                    index: e.index,
                }));
            }
            _ => {}
        }
    }

    fn drain(&mut self) -> Vec<ItemEvent> {
        let events = self
            .pending
            .drain(..)
            .flatten()
            .filter(|event| match event {
                ItemEvent::ItemChanged {
                    old_value,
                    new_value,
                    ..
                } => old_value != new_value,
                _ => true,
            })
            .collect();
        self.clear();
        events
    }
}

/// Bridges DOM events to [`ItemEvent`] handlers
pub struct ObservableContext {
    mode: ReportingMode,
    handlers: RefCell<Vec<ItemHandler>>,
    batch: RefCell<Batch>,
    /// Between `TransactionBeginning` and `TransactionEnded`/`Cancelled`,
    /// so a cancel's rollback still lands in the batch
    open: Cell<bool>,
}

impl ObservableContext {
    pub fn new(mode: ReportingMode) -> Self {
        Self {
            mode,
            handlers: RefCell::new(Vec::new()),
            batch: RefCell::new(Batch::default()),
            open: Cell::new(false),
        }
    }

    /// Register on `document` and return the observer id
    pub fn attach(self: &Rc<Self>, document: &mut Document) -> ObserverId {
        document.observe(self.clone())
    }

    pub fn mode(&self) -> ReportingMode {
        self.mode
    }

    pub fn on_item(&self, handler: impl Fn(&ItemEvent) + 'static) {
        self.handlers.borrow_mut().push(Rc::new(handler));
    }

    /// Drop anything pending and tell views to start over
    pub fn reload(&self) {
        self.batch.borrow_mut().clear();
        self.notify(&[ItemEvent::Reloaded]);
    }

    /// Events held back by the open transaction
    pub fn pending(&self) -> usize {
        self.batch.borrow().pending.iter().flatten().count()
    }

    fn notify(&self, events: &[ItemEvent]) {
        if events.is_empty() {
            return;
        }
        let handlers: Vec<ItemHandler> = self.handlers.borrow().clone();
        for event in events {
            for handler in &handlers {
                handler(event);
            }
        }
    }

    fn immediate(event: &DomEvent) -> Option<ItemEvent> {
        match event {
            DomEvent::AttributeChanged(e) => Some(ItemEvent::ItemChanged {
                item: e.node,
                attribute: e.info.clone(),
                old_value: e.old_value.clone(),
                new_value: e.new_value.clone(),
            }),
            DomEvent::ChildInserted(e) => Some(ItemEvent::ItemInserted {
                parent: e.parent,
                item: e.child,
                index: e.index,
            }),
            DomEvent::ChildRemoved(e) => Some(ItemEvent::ItemRemoved {
                parent: e.parent,
                item: e.child,
                index: e.index,
            }),
            _ => None,
        }
    }
}

impl DomObserver for ObservableContext {
    fn name(&self) -> &str {
        "ObservableContext"
    }

    fn on_event(&self, document: &mut Document, event: &DomEvent) -> atf_dom::Result<()> {
        match event {
            DomEvent::TransactionBeginning { .. } => self.open.set(true),
            DomEvent::TransactionEnded { name } => {
                self.open.set(false);
                let events = self.batch.borrow_mut().drain();
                tracing::debug!(
                    "[ObservableContext] Flushing {} item events for '{}'",
                    events.len(),
                    name
                );
                self.notify(&events);
            }
            DomEvent::TransactionCancelled { .. } => {
                self.open.set(false);
                self.batch.borrow_mut().clear();
            }
            _ if self.mode == ReportingMode::TransactionBatched && self.open.get() => {
                self.batch.borrow_mut().add(document, event);
            }
            _ => {
                if let Some(item) = Self::immediate(event) {
                    self.notify(&[item]);
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ObservableContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableContext")
            .field("mode", &self.mode)
            .field("handlers", &self.handlers.borrow().len())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixture;

    fn collect(context: &ObservableContext) -> Rc<RefCell<Vec<ItemEvent>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        context.on_item(move |event| sink.borrow_mut().push(event.clone()));
        seen
    }

    #[test]
    fn test_immediate_mode_reports_each_change() {
        let fx = fixture();
        let (mut doc, scene, nodes) = fx.scene(&["a"]);
        let context = Rc::new(ObservableContext::new(ReportingMode::Immediate));
        context.attach(&mut doc);
        let seen = collect(&context);

        doc.do_transaction("Edit", |doc| {
            doc.set_attribute(nodes[0], &fx.name, "b")?;
            doc.set_attribute(nodes[0], &fx.name, "c")?;
            doc.remove_from_parent(nodes[0])
        })
        .unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert!(matches!(
            &seen[2],
            ItemEvent::ItemRemoved { parent, item, index: 0 } if *parent == scene && *item == nodes[0]
        ));
    }

    #[test]
    fn test_batched_mode_merges_attribute_changes() {
        let fx = fixture();
        let (mut doc, _, nodes) = fx.scene(&["a", "b"]);
        let context = Rc::new(ObservableContext::new(ReportingMode::TransactionBatched));
        context.attach(&mut doc);
        let seen = collect(&context);

        doc.begin("Rename").unwrap();
        doc.set_attribute(nodes[0], &fx.name, "x").unwrap();
        doc.set_attribute(nodes[0], &fx.name, "y").unwrap();
        doc.set_attribute(nodes[1], &fx.name, "z").unwrap();
        doc.set_attribute(nodes[1], &fx.name, "b").unwrap();
        assert_eq!(context.pending(), 2);
        assert!(seen.borrow().is_empty());
        doc.end().unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        match &seen[0] {
            ItemEvent::ItemChanged {
                item,
                old_value,
                new_value,
                ..
            } => {
                assert_eq!(*item, nodes[0]);
                assert_eq!(old_value, &AttributeValue::from("a"));
                assert_eq!(new_value, &AttributeValue::from("y"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_batched_mode_folds_changes_into_insertions() {
        let fx = fixture();
        let (mut doc, scene, _) = fx.scene(&[]);
        let kept = fx.node(&mut doc, "kept");
        let dropped = fx.node(&mut doc, "dropped");
        let context = Rc::new(ObservableContext::new(ReportingMode::TransactionBatched));
        context.attach(&mut doc);
        let seen = collect(&context);

        doc.do_transaction("Build", |doc| {
            doc.add_child(scene, &fx.nodes, kept)?;
            let leaf = doc.create_node(fx.node_type)?;
            doc.add_child(kept, &fx.child_nodes, leaf)?;
            doc.set_attribute(leaf, &fx.name, "leaf")?;
            doc.add_child(scene, &fx.nodes, dropped)?;
            doc.remove_from_parent(dropped)
        })
        .unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![ItemEvent::ItemInserted {
                parent: scene,
                item: kept,
                index: 0
            }]
        );
    }

    #[test]
    fn test_cancel_reports_nothing_and_undo_is_immediate() {
        let fx = fixture();
        let (mut doc, _, nodes) = fx.scene(&["a"]);
        let context = Rc::new(ObservableContext::new(ReportingMode::TransactionBatched));
        context.attach(&mut doc);
        let seen = collect(&context);

        doc.begin("Discard").unwrap();
        doc.set_attribute(nodes[0], &fx.name, "gone").unwrap();
        doc.cancel().unwrap();
        assert!(seen.borrow().is_empty());
        assert_eq!(context.pending(), 0);

        doc.do_transaction("Keep", |doc| doc.set_attribute(nodes[0], &fx.name, "kept"))
            .unwrap();
        doc.undo().unwrap();
        assert_eq!(seen.borrow().len(), 2);

        context.reload();
        assert_eq!(seen.borrow().last(), Some(&ItemEvent::Reloaded));
    }
}
