//! Ordered node selection
//!
//! Nodes are identified by `NodeId`, so a node and any adapter wrapping it
//! select the same entry. Registered on a document, the context drops
//! nodes as soon as they leave the tree.

use atf_dom::utils::get_roots;
use atf_dom::{Document, DomEvent, DomObserver, NodeId, ObserverId};
use std::cell::RefCell;
use std::rc::Rc;

type SelectionHandler = Rc<dyn Fn(&[NodeId])>;

#[derive(Default)]
pub struct SelectionContext {
    items: RefCell<Vec<NodeId>>,
    handlers: RefCell<Vec<SelectionHandler>>,
}

impl SelectionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(self: &Rc<Self>, document: &mut Document) -> ObserverId {
        document.observe(self.clone())
    }

    /// Called with the new selection after every change
    pub fn on_changed(&self, handler: impl Fn(&[NodeId]) + 'static) {
        self.handlers.borrow_mut().push(Rc::new(handler));
    }

    pub fn selection(&self) -> Vec<NodeId> {
        self.items.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn contains(&self, item: impl Into<NodeId>) -> bool {
        self.items.borrow().contains(&item.into())
    }

    pub fn last_selected(&self) -> Option<NodeId> {
        self.items.borrow().last().copied()
    }

    /// Replace the selection; duplicates keep their first position
    pub fn set<I>(&self, items: I)
    where
        I: IntoIterator,
        I::Item: Into<NodeId>,
    {
        let mut next: Vec<NodeId> = Vec::new();
        for item in items {
            let item = item.into();
            if !next.contains(&item) {
                next.push(item);
            }
        }
        self.update(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    /// Append unless already selected
    pub fn add(&self, item: impl Into<NodeId>) {
        let item = item.into();
        self.update(|current| {
            if current.contains(&item) {
                return false;
            }
            current.push(item);
            true
        });
    }

    pub fn remove(&self, item: impl Into<NodeId>) {
        let item = item.into();
        self.update(|current| {
            let before = current.len();
            current.retain(|n| *n != item);
            current.len() != before
        });
    }

    pub fn toggle(&self, item: impl Into<NodeId>) {
        let item = item.into();
        self.update(|current| {
            match current.iter().position(|n| *n == item) {
                Some(position) => {
                    current.remove(position);
                }
                None => current.push(item),
            }
            true
        });
    }

    pub fn clear(&self) {
        self.update(|current| {
            let changed = !current.is_empty();
            current.clear();
            changed
        });
    }

    /// Selected nodes whose ancestors are not also selected
    pub fn selection_roots(&self, document: &Document) -> Vec<NodeId> {
        get_roots(document.arena(), &self.items.borrow())
    }

    fn update(&self, f: impl FnOnce(&mut Vec<NodeId>) -> bool) {
        let changed = f(&mut self.items.borrow_mut());
        if !changed {
            return;
        }
        let snapshot = self.selection();
        let handlers: Vec<SelectionHandler> = self.handlers.borrow().clone();
        for handler in &handlers {
            handler(&snapshot);
        }
    }
}

impl DomObserver for SelectionContext {
    fn name(&self) -> &str {
        "SelectionContext"
    }

    fn on_event(&self, document: &mut Document, event: &DomEvent) -> atf_dom::Result<()> {
        if let DomEvent::ChildRemoved(e) = event {
            let arena = document.arena();
            let gone: Vec<NodeId> = self
                .items
                .borrow()
                .iter()
                .copied()
                .filter(|n| !arena.contains(*n) || arena.is_in_lineage(*n, e.child))
                .collect();
            if !gone.is_empty() {
                tracing::debug!("[SelectionContext] Deselecting {} removed nodes", gone.len());
                self.update(|current| {
                    current.retain(|n| !gone.contains(n));
                    true
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SelectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionContext")
            .field("items", &self.items.borrow())
            .finish()
    }
}
