//! Selection-driven editing
//!
//! `EditingContext` implements [`InstancingContext`] for one document:
//! it copies the selected subtrees, pastes next to the selection and
//! deletes what is selected. Every change runs in a named transaction so
//! it undoes in one step.

use crate::error::{ContextError, Result};
use crate::instancing::{DomPayload, InstancingContext};
use crate::selection::SelectionContext;
use ahash::AHashMap;
use atf_dom::{ChildInfo, Document, NodeId, NodeTypeId, ObserverId};
use std::rc::Rc;
use std::sync::Arc;

type Target = (NodeId, Arc<ChildInfo>);

#[derive(Debug)]
pub struct EditingContext {
    selection: Rc<SelectionContext>,
}

impl EditingContext {
    pub fn new(selection: Rc<SelectionContext>) -> Self {
        Self { selection }
    }

    pub fn selection(&self) -> &Rc<SelectionContext> {
        &self.selection
    }

    /// Register the selection on `document` so deleted nodes are deselected
    pub fn attach(&self, document: &mut Document) -> ObserverId {
        self.selection.attach(document)
    }

    /// List slot that would receive a pasted node of `type_name`: the last
    /// selected node, then its ancestors, then the document root
    pub fn insertion_target(&self, document: &Document, type_name: &str) -> Option<Target> {
        let type_id = document.schema().type_id(type_name)?;
        self.find_target(document, type_id, &AHashMap::new())
    }

    /// Copy each selected subtree and insert the copy right after it
    pub fn duplicate(&self, document: &mut Document) -> Result<Vec<NodeId>> {
        let roots = self.selection.selection_roots(document);
        if roots.is_empty() {
            return Err(ContextError::EmptySelection);
        }
        let mut places = Vec::with_capacity(roots.len());
        for root in &roots {
            match document.containing_slot(*root) {
                Some((parent, info, _)) if info.is_list() => places.push((parent, info)),
                _ => {
                    let name = document.node_type(*root)?.name().to_string();
                    return Err(ContextError::NoInsertionTarget(name));
                }
            }
        }

        let copies = document.do_transaction("Duplicate", |doc| {
            let copies = doc.copy(&roots)?;
            for ((original, copy), (parent, info)) in roots.iter().zip(&copies).zip(&places) {
                let index = doc
                    .index_of(*parent, info, *original)?
                    .map_or(doc.child_count(*parent, info)?, |i| i + 1);
                doc.insert_child(*parent, info, index, *copy)?;
            }
            Ok(copies)
        })?;

        tracing::debug!("[EditingContext] Duplicated {} nodes", copies.len());
        self.selection.set(copies.iter().copied());
        Ok(copies)
    }

    fn candidates(&self, document: &Document) -> Vec<NodeId> {
        let mut candidates: Vec<NodeId> = self
            .selection
            .last_selected()
            .map(|last| document.lineage(last).collect())
            .unwrap_or_default();
        if let Some(root) = document.root() {
            if !candidates.contains(&root) {
                candidates.push(root);
            }
        }
        candidates
    }

    fn find_target(
        &self,
        document: &Document,
        type_id: NodeTypeId,
        planned: &AHashMap<(NodeId, usize), usize>,
    ) -> Option<Target> {
        let schema = document.schema();
        for candidate in self.candidates(document) {
            let Ok(node_type) = document.node_type(candidate) else {
                continue;
            };
            for info in node_type.children() {
                if !info.is_list() || !schema.is_assignable(info.child_type(), type_id) {
                    continue;
                }
                let used = document.child_count(candidate, info).unwrap_or(0)
                    + planned.get(&(candidate, info.index())).copied().unwrap_or(0);
                if info.max_occurs().is_some_and(|max| used >= max) {
                    continue;
                }
                return Some((candidate, info.clone()));
            }
        }
        None
    }

    /// Target slot for every payload node, honoring slot capacity
    fn plan(&self, document: &Document, payload: &DomPayload) -> Result<Vec<Target>> {
        let mut planned = AHashMap::new();
        let mut targets = Vec::with_capacity(payload.len());
        for snapshot in &payload.nodes {
            let type_id = document.schema().type_id(&snapshot.node_type).ok_or_else(|| {
                ContextError::InvalidPayload(format!("unknown type '{}'", snapshot.node_type))
            })?;
            let (parent, info) = self
                .find_target(document, type_id, &planned)
                .ok_or_else(|| ContextError::NoInsertionTarget(snapshot.node_type.clone()))?;
            *planned.entry((parent, info.index())).or_insert(0) += 1;
            targets.push((parent, info));
        }
        Ok(targets)
    }
}

impl InstancingContext for EditingContext {
    fn can_copy(&self, document: &Document) -> bool {
        !self.selection.is_empty()
            && self
                .selection
                .selection()
                .iter()
                .all(|n| document.contains(*n))
    }

    fn copy(&self, document: &Document) -> Result<DomPayload> {
        let roots = self.selection.selection_roots(document);
        if roots.is_empty() {
            return Err(ContextError::EmptySelection);
        }
        let nodes = roots
            .iter()
            .map(|root| document.snapshot(*root))
            .collect::<atf_dom::Result<Vec<_>>>()?;
        Ok(DomPayload::new(nodes))
    }

    fn can_insert(&self, document: &Document, payload: &DomPayload) -> bool {
        !payload.is_empty() && self.plan(document, payload).is_ok()
    }

    fn insert(&self, document: &mut Document, payload: &DomPayload) -> Result<Vec<NodeId>> {
        let targets = self.plan(document, payload)?;
        let nodes = document.do_transaction("Paste", |doc| {
            let nodes = doc.instantiate_all(&payload.nodes)?;
            for (node, (parent, info)) in nodes.iter().zip(&targets) {
                doc.add_child(*parent, info, *node)?;
            }
            Ok(nodes)
        })?;

        tracing::debug!("[EditingContext] Pasted {} nodes", nodes.len());
        self.selection.set(nodes.iter().copied());
        Ok(nodes)
    }

    fn can_delete(&self, document: &Document) -> bool {
        self.selection
            .selection_roots(document)
            .iter()
            .any(|n| document.parent(*n).is_some())
    }

    fn delete(&self, document: &mut Document) -> Result<usize> {
        let roots: Vec<NodeId> = self
            .selection
            .selection_roots(document)
            .into_iter()
            .filter(|n| document.parent(*n).is_some())
            .collect();
        if roots.is_empty() {
            return Err(ContextError::EmptySelection);
        }

        document.do_transaction("Delete", |doc| {
            roots.iter().try_for_each(|root| doc.remove_from_parent(*root))
        })?;

        tracing::debug!("[EditingContext] Deleted {} subtrees", roots.len());
        self.selection.clear();
        Ok(roots.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixture;
    use atf_dom::AttributeValue;

    fn editor() -> EditingContext {
        EditingContext::new(Rc::new(SelectionContext::new()))
    }

    #[test]
    fn test_copy_paste_into_selected_node() {
        let fx = fixture();
        let (mut doc, _, nodes) = fx.scene(&["a", "b"]);
        let editor = editor();
        editor.attach(&mut doc);

        editor.selection().set([nodes[0]]);
        assert!(editor.can_copy(&doc));
        let payload = editor.copy(&doc).unwrap();

        editor.selection().set([nodes[1]]);
        assert!(editor.can_insert(&doc, &payload));
        let pasted = editor.insert(&mut doc, &payload).unwrap();

        assert_eq!(doc.parent(pasted[0]), Some(nodes[1]));
        assert_eq!(doc.get_id(pasted[0]).as_deref(), Some("a_1"));
        assert_eq!(editor.selection().selection(), pasted);
        assert_eq!(doc.history().undo_description(), Some("Paste"));

        doc.undo().unwrap();
        assert_eq!(doc.parent(pasted[0]), None);
    }

    #[test]
    fn test_paste_falls_back_to_ancestors_and_root() {
        let fx = fixture();
        let (mut doc, scene, _) = fx.scene(&["a"]);
        let steel = fx.material(&mut doc, scene, "steel");
        let editor = editor();

        // materials hold no children, so the scene receives the paste
        editor.selection().set([steel]);
        let target = editor.insertion_target(&doc, "material").unwrap();
        assert_eq!(target.0, scene);
        assert_eq!(target.1.name(), "materials");

        editor.selection().clear();
        let target = editor.insertion_target(&doc, "node").unwrap();
        assert_eq!((target.0, target.1.name()), (scene, "nodes"));
    }

    #[test]
    fn test_paste_keeps_references_to_live_nodes() {
        let fx = fixture();
        let (mut doc, scene, nodes) = fx.scene(&["a"]);
        let steel = fx.material(&mut doc, scene, "steel");
        doc.set_attribute(nodes[0], &fx.material, steel).unwrap();
        let editor = editor();

        editor.selection().set([nodes[0]]);
        let payload = DomPayload::from_json(&editor.copy(&doc).unwrap().to_json().unwrap()).unwrap();
        editor.selection().clear();
        let pasted = editor.insert(&mut doc, &payload).unwrap();

        assert_eq!(doc.parent(pasted[0]), Some(scene));
        assert_eq!(
            doc.get_attribute(pasted[0], &fx.material).unwrap(),
            AttributeValue::Reference(steel)
        );
    }

    #[test]
    fn test_unknown_payload_type_cannot_be_inserted() {
        let fx = fixture();
        let (doc, _, _) = fx.scene(&[]);
        let payload = DomPayload::new(vec![atf_dom::NodeSnapshot::new("camera")]);
        assert!(!editor().can_insert(&doc, &payload));
    }

    #[test]
    fn test_delete_removes_selection_roots_in_one_step() {
        let fx = fixture();
        let (mut doc, scene, nodes) = fx.scene(&["a", "b", "c"]);
        let leaf = fx.node(&mut doc, "leaf");
        doc.add_child(nodes[0], &fx.child_nodes, leaf).unwrap();
        let editor = editor();
        editor.attach(&mut doc);

        editor.selection().set([leaf, nodes[0], nodes[2]]);
        assert!(editor.can_delete(&doc));
        assert_eq!(editor.delete(&mut doc).unwrap(), 2);
        assert_eq!(doc.child_list(scene, &fx.nodes).unwrap(), &[nodes[1]]);
        assert_eq!(doc.parent(leaf), Some(nodes[0]));
        assert!(editor.selection().is_empty());
        assert!(!editor.can_delete(&doc));

        doc.undo().unwrap();
        assert_eq!(doc.child_list(scene, &fx.nodes).unwrap(), &nodes[..]);
    }

    #[test]
    fn test_duplicate_inserts_after_original() {
        let fx = fixture();
        let (mut doc, scene, nodes) = fx.scene(&["a", "b"]);
        let editor = editor();

        editor.selection().set([nodes[0]]);
        let copies = editor.duplicate(&mut doc).unwrap();
        assert_eq!(
            doc.child_list(scene, &fx.nodes).unwrap(),
            &[nodes[0], copies[0], nodes[1]]
        );
        assert_eq!(doc.history().undo_description(), Some("Duplicate"));

        editor.selection().set([scene]);
        assert!(matches!(
            editor.duplicate(&mut doc),
            Err(ContextError::NoInsertionTarget(name)) if name == "scene"
        ));
    }
}
