//! Unique Id Validator - renames ids that an insertion duplicated
//!
//! Ids only need to be unique per root. Nodes already in the tree keep
//! their ids; inserted nodes are renamed to `id_N`.

use ahash::AHashSet;
use atf_dom::utils::unique_name;
use atf_dom::{AttributeKind, AttributeValue, Document, DomEvent, NodeId};
use std::cell::RefCell;

use crate::validator::Validator;

#[derive(Default)]
pub struct UniqueIdValidator {
    inserted: RefCell<Vec<NodeId>>,
}

impl UniqueIdValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn rename(
        document: &mut Document,
        node: NodeId,
        id: &str,
        replacement: String,
    ) -> atf_dom::Result<()> {
        let Some(attr) = document.node_type(node)?.id_attribute().cloned() else {
            return Ok(());
        };
        tracing::warn!(
            "[UniqueIdValidator] Duplicate id '{}' on {}, renamed to '{}'",
            id,
            node,
            replacement
        );
        let value = match attr.kind() {
            AttributeKind::Uri => AttributeValue::Uri(replacement),
            _ => AttributeValue::String(replacement),
        };
        document.set_attribute(node, &attr, value)
    }
}

impl Validator for UniqueIdValidator {
    fn name(&self) -> &str {
        "UniqueIdValidator"
    }

    fn on_change(&self, document: &Document, event: &DomEvent) {
        if !document.in_transaction() {
            return;
        }
        if let DomEvent::ChildInserted(e) = event {
            self.inserted.borrow_mut().push(e.child);
        }
    }

    fn on_ending(&self, document: &mut Document) -> atf_dom::Result<()> {
        let inserted = std::mem::take(&mut *self.inserted.borrow_mut());
        if inserted.is_empty() {
            return Ok(());
        }

        let mut fresh: Vec<NodeId> = Vec::new();
        let mut seen: AHashSet<NodeId> = AHashSet::new();
        let mut roots: Vec<NodeId> = Vec::new();
        for child in inserted.into_iter().filter(|c| document.contains(*c)) {
            for node in document.subtree(child) {
                if seen.insert(node) {
                    fresh.push(node);
                }
            }
            if let Some(root) = document.get_root(child) {
                if !roots.contains(&root) {
                    roots.push(root);
                }
            }
        }

        for root in roots {
            let mut taken: AHashSet<String> = document
                .subtree(root)
                .filter(|n| !seen.contains(n))
                .filter_map(|n| document.get_id(n))
                .collect();
            let members: Vec<NodeId> = fresh
                .iter()
                .copied()
                .filter(|n| document.get_root(*n) == Some(root))
                .collect();
            for node in members {
                let Some(id) = document.get_id(node) else {
                    continue;
                };
                if taken.insert(id.clone()) {
                    continue;
                }
                let replacement = unique_name(&id, |candidate| taken.contains(candidate));
                taken.insert(replacement.clone());
                Self::rename(document, node, &id, replacement)?;
            }
        }

        self.inserted.borrow_mut().clear();
        Ok(())
    }

    fn on_ended(&self, _document: &Document) {
        self.inserted.borrow_mut().clear();
    }

    fn on_cancelled(&self, _document: &Document) {
        self.inserted.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixture;
    use crate::validator::ValidatorManager;

    fn attach(doc: &mut Document) {
        let mut manager = ValidatorManager::new();
        manager.register(Box::new(UniqueIdValidator::new()));
        manager.attach(doc);
    }

    #[test]
    fn test_inserted_duplicate_is_renamed() {
        let fx = fixture();
        let (mut doc, scene, nodes) = fx.scene(&["a"]);
        attach(&mut doc);

        let twin = fx.node(&mut doc, "a");
        let other = fx.node(&mut doc, "a");
        doc.do_transaction("Add", |doc| {
            doc.add_child(scene, &fx.nodes, twin)?;
            doc.add_child(scene, &fx.nodes, other)
        })
        .unwrap();

        assert_eq!(doc.get_id(nodes[0]).as_deref(), Some("a"));
        assert_eq!(doc.get_id(twin).as_deref(), Some("a_1"));
        assert_eq!(doc.get_id(other).as_deref(), Some("a_2"));

        doc.undo().unwrap();
        assert_eq!(doc.get_id(twin).as_deref(), Some("a"));
        assert_eq!(doc.parent(twin), None);
    }

    #[test]
    fn test_moved_node_keeps_its_id() {
        let fx = fixture();
        let (mut doc, _, nodes) = fx.scene(&["a", "b"]);
        attach(&mut doc);

        doc.do_transaction("Move", |doc| doc.add_child(nodes[0], &fx.child_nodes, nodes[1]))
            .unwrap();
        assert_eq!(doc.get_id(nodes[1]).as_deref(), Some("b"));
        assert_eq!(doc.history().undo_command().map(|c| c.len()), Some(2));
    }

    #[test]
    fn test_ids_are_unique_per_root() {
        let fx = fixture();
        let (mut doc, _, _) = fx.scene(&["a"]);
        attach(&mut doc);

        let detached = fx.node(&mut doc, "holder");
        let inner = fx.node(&mut doc, "a");
        doc.do_transaction("Build", |doc| doc.add_child(detached, &fx.child_nodes, inner))
            .unwrap();
        assert_eq!(doc.get_id(inner).as_deref(), Some("a"));
    }
}
