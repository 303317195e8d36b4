//! Reference Validator - keeps reference attributes pointing into the tree
//!
//! Responsibilities:
//! - Remember which subtrees a transaction removed
//! - At the end of the transaction, find live nodes still referencing them
//! - Remove those owners (cascading) or clear the reference, per policy

use ahash::AHashSet;
use atf_dom::{AttributeInfo, AttributeKind, Document, DomEvent, NodeId};
use std::cell::{Cell, RefCell};
use std::sync::Arc;

use crate::validator::Validator;

/// What to do with a node whose reference target left the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DanglingPolicy {
    /// Remove the owner too; its own referrers follow on the next pass
    #[default]
    RemoveOwner,
    /// Reset the reference to its default
    ClearReference,
}

pub struct ReferenceValidator {
    policy: DanglingPolicy,
    suspended: Cell<bool>,
    /// (former parent, removed child) pairs of the open transaction
    removed: RefCell<Vec<(NodeId, NodeId)>>,
}

impl ReferenceValidator {
    pub fn new() -> Self {
        Self::with_policy(DanglingPolicy::default())
    }

    pub fn with_policy(policy: DanglingPolicy) -> Self {
        Self {
            policy,
            suspended: Cell::new(false),
            removed: RefCell::new(Vec::new()),
        }
    }

    pub fn policy(&self) -> DanglingPolicy {
        self.policy
    }

    /// While suspended, removals are neither tracked nor repaired
    pub fn set_suspended(&self, suspended: bool) {
        self.suspended.set(suspended);
        if suspended {
            self.removed.borrow_mut().clear();
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.get()
    }

    /// Reference attributes under `roots` whose target is in `gone`
    fn dangling(
        document: &Document,
        roots: &[NodeId],
        gone: &AHashSet<NodeId>,
    ) -> Vec<(NodeId, Arc<AttributeInfo>)> {
        let mut found = Vec::new();
        for root in roots {
            for node in document.subtree(*root) {
                let Ok(node_type) = document.node_type(node) else {
                    continue;
                };
                for attr in node_type
                    .attributes()
                    .iter()
                    .filter(|a| a.kind() == AttributeKind::Reference)
                {
                    let target = document
                        .get_local_attribute(node, attr)
                        .ok()
                        .flatten()
                        .and_then(|v| v.as_reference());
                    if target.is_some_and(|t| gone.contains(&t)) {
                        found.push((node, attr.clone()));
                    }
                }
            }
        }
        found
    }
}

impl Default for ReferenceValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator for ReferenceValidator {
    fn name(&self) -> &str {
        "ReferenceValidator"
    }

    fn on_change(&self, document: &Document, event: &DomEvent) {
        if self.suspended.get() || !document.in_transaction() {
            return;
        }
        if let DomEvent::ChildRemoved(e) = event {
            self.removed.borrow_mut().push((e.parent, e.child));
        }
    }

    fn on_ending(&self, document: &mut Document) -> atf_dom::Result<()> {
        let removed = std::mem::take(&mut *self.removed.borrow_mut());
        if self.suspended.get() || removed.is_empty() {
            return Ok(());
        }

        // Moved nodes end up under their old root again and are not gone
        let mut gone: AHashSet<NodeId> = AHashSet::new();
        let mut roots: Vec<NodeId> = Vec::new();
        for (parent, child) in &removed {
            let old_root = document.get_root(*parent);
            if document.get_root(*child) != old_root {
                gone.extend(document.subtree(*child));
            }
            if let Some(root) = old_root {
                if !roots.contains(&root) {
                    roots.push(root);
                }
            }
        }
        roots.retain(|r| !gone.contains(r));

        loop {
            let dangling = Self::dangling(document, &roots, &gone);
            if dangling.is_empty() {
                break;
            }
            for (owner, attr) in dangling {
                if gone.contains(&owner) {
                    continue;
                }
                let removable = self.policy == DanglingPolicy::RemoveOwner
                    && document.parent(owner).is_some();
                if removable {
                    tracing::warn!(
                        "[ReferenceValidator] Removing {} ({} points at a removed node)",
                        owner,
                        attr.name()
                    );
                    document.remove_from_parent(owner)?;
                    gone.extend(document.subtree(owner));
                } else {
                    tracing::warn!(
                        "[ReferenceValidator] Clearing dangling {}.{}",
                        owner,
                        attr.name()
                    );
                    document.reset_attribute(owner, &attr)?;
                }
            }
        }

        // Removals made above are already repaired
        self.removed.borrow_mut().clear();
        Ok(())
    }

    fn on_ended(&self, _document: &Document) {
        self.removed.borrow_mut().clear();
    }

    fn on_cancelled(&self, _document: &Document) {
        self.removed.borrow_mut().clear();
    }
}
