//! ATF DOM Library
//!
//! A schema-driven document object model with change events, transactions
//! and undo/redo.
//!
//! ## Philosophy
//!
//! - **Data structures first**: nodes live in one arena and refer to each
//!   other by handle, never by pointer
//! - **Schema as data**: node types, attributes and child slots are built
//!   once, frozen, and shared behind `Arc`
//! - **One mutation path**: every change goes through [`Document`], raises
//!   events and lands in the open transaction
//!
//! ## Core Design
//!
//! ```text
//! SchemaBuilder → Schema (frozen) → Document (arena) → DomEvent → observers
//!                                        ↓
//!                              TransactionContext → CommandHistory
//! ```

pub mod adapter;
pub mod arena;
pub mod copy;
pub mod document;
pub mod error;
pub mod event;
pub mod history;
pub mod id_index;
pub mod loader;
pub mod node;
pub mod schema;
pub mod serializer;
pub mod transaction;
pub mod types;
pub mod utils;

#[cfg(test)]
mod testing;

pub use adapter::{Adapted, Adapter, AdapterBinding, DomNodeAdapter};
pub use arena::DomArena;
pub use document::{Document, DocumentConfig, IdPolicy};
pub use error::{DomError, Result, SchemaError, SchemaResult};
pub use event::{AttributeEvent, ChildEvent, DomEvent, DomObserver, ObserverId};
pub use history::{Command, CommandHistory};
pub use loader::SchemaLoader;
pub use node::{ChildSlot, NodeData};
pub use schema::{
    AttributeInfo, AttributeKey, AttributeRule, ChildInfo, DescendantInfo, DomNodeType, Schema,
    SchemaBuilder,
};
pub use serializer::{DomSerializer, NodeSnapshot, SerializerConfig, SlotSnapshot};
pub use transaction::{Operation, TransactionContext};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture, Recorder};
    use std::rc::Rc;
    use std::sync::Arc;

    #[test]
    fn test_add_child_transaction() {
        let fx = fixture();
        let mut doc = fx.document();
        let (root, _) = fx.root_with_events(&mut doc, &["a", "b"]);
        let recorder = Recorder::new();
        doc.observe(recorder.clone());

        let x = doc.create_node(fx.event_type).unwrap();
        doc.begin("Add Child").unwrap();
        doc.add_child(root, &fx.events, x).unwrap();
        assert!(doc.end().unwrap());

        let events = doc.child_list(root, &fx.events).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2], x);

        let inserted: Vec<DomEvent> = recorder
            .events()
            .into_iter()
            .filter(|e| matches!(e, DomEvent::ChildInserted(_)))
            .collect();
        assert_eq!(inserted.len(), 1);
        match &inserted[0] {
            DomEvent::ChildInserted(e) => {
                assert_eq!(e.index, 2);
                assert_eq!(e.child, x);
                assert_eq!(e.parent, root);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(doc.history().len(), 1);
        assert_eq!(doc.history().undo_description(), Some("Add Child"));
    }

    #[test]
    fn test_cancel_restores_observable_state() {
        let fx = fixture();
        let mut doc = fx.document();
        let (root, events) = fx.root_with_events(&mut doc, &["a", "b", "c"]);
        doc.set_attribute(events[1], &fx.duration, 7).unwrap();
        let before = doc.snapshot(root).unwrap();

        doc.begin("Scramble").unwrap();
        doc.set_attribute(events[0], &fx.duration, 3).unwrap();
        doc.reset_attribute(events[1], &fx.duration).unwrap();
        doc.insert_child(root, &fx.events, 0, events[2]).unwrap();
        doc.remove_child(root, &fx.events, events[1]).unwrap();
        let fresh = doc.create_node(fx.event_type).unwrap();
        doc.add_child(root, &fx.events, fresh).unwrap();
        let note = doc.create_node(fx.note_type).unwrap();
        doc.set_attribute(note, &fx.text, "hello").unwrap();
        doc.set_child(events[0], &fx.annotation, Some(note)).unwrap();
        doc.set_attribute(events[0], &fx.name, "renamed").unwrap();
        doc.cancel().unwrap();

        assert_eq!(doc.snapshot(root).unwrap(), before);
        assert_eq!(doc.parent(fresh), None);
        assert_eq!(doc.parent(note), None);
        assert!(!doc.in_transaction());
        assert!(doc.history().is_empty());
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let fx = fixture();
        let mut doc = fx.document();
        let (root, events) = fx.root_with_events(&mut doc, &["a", "b"]);
        let original = doc.snapshot(root).unwrap();

        doc.do_transaction("Edit", |doc| {
            doc.set_attribute(events[0], &fx.duration, 12)?;
            doc.remove_from_parent(events[1])
        })
        .unwrap();
        let edited = doc.snapshot(root).unwrap();

        doc.undo().unwrap();
        assert_eq!(doc.snapshot(root).unwrap(), original);
        assert!(doc.can_redo());

        doc.redo().unwrap();
        assert_eq!(doc.snapshot(root).unwrap(), edited);
        assert!(!doc.can_redo());
    }

    #[test]
    fn test_undo_raises_events_but_records_nothing() {
        let fx = fixture();
        let mut doc = fx.document();
        let (_, events) = fx.root_with_events(&mut doc, &["a"]);
        doc.do_transaction("Set", |doc| doc.set_attribute(events[0], &fx.duration, 4))
            .unwrap();

        let recorder = Recorder::new();
        doc.observe(recorder.clone());
        doc.undo().unwrap();

        assert_eq!(recorder.names(), vec!["AttributeChanging", "AttributeChanged"]);
        assert_eq!(doc.history().len(), 1);
        assert!(doc.transaction().operations().is_empty());
    }

    #[test]
    fn test_new_edit_discards_redo_tail() {
        let fx = fixture();
        let mut doc = fx.document();
        let (_, events) = fx.root_with_events(&mut doc, &["a"]);
        doc.do_transaction("One", |doc| doc.set_attribute(events[0], &fx.duration, 1))
            .unwrap();
        doc.do_transaction("Two", |doc| doc.set_attribute(events[0], &fx.duration, 2))
            .unwrap();
        doc.undo().unwrap();

        doc.do_transaction("Three", |doc| doc.set_attribute(events[0], &fx.duration, 3))
            .unwrap();
        let names: Vec<&str> = doc.history().commands().iter().map(Command::name).collect();
        assert_eq!(names, vec!["One", "Three"]);
        assert!(!doc.can_redo());
    }

    #[test]
    fn test_find_node_miss_is_none() {
        let fx = fixture();
        let mut doc = fx.document();
        let root = doc.create_node(fx.root_type).unwrap();
        assert_eq!(doc.find_node(root, "foo"), None);

        let (root, events) = fx.root_with_events(&mut doc, &["foo"]);
        assert_eq!(doc.find_node(root, "foo"), Some(events[0]));
        doc.set_attribute(events[0], &fx.name, "bar").unwrap();
        assert_eq!(doc.find_node(root, "foo"), None);
        assert_eq!(doc.find_node(root, "bar"), Some(events[0]));
    }

    #[test]
    fn test_vetoed_attribute_change_leaves_value() {
        let fx = fixture();
        let mut doc = fx.document();
        let (_, events) = fx.root_with_events(&mut doc, &["a"]);
        doc.observe(Recorder::vetoing("AttributeChanging"));

        let err = doc.set_attribute(events[0], &fx.duration, 9).unwrap_err();
        assert!(matches!(err, DomError::Vetoed { event: "AttributeChanging", .. }));
        assert!(doc.is_attribute_default(events[0], &fx.duration).unwrap());
    }

    #[test]
    fn test_scoped_observer_sees_only_its_subtree() {
        let fx = fixture();
        let mut doc = fx.document();
        let (_, events) = fx.root_with_events(&mut doc, &["a", "b"]);
        let scoped = Recorder::new();
        doc.observe_subtree(events[0], scoped.clone());

        doc.set_attribute(events[1], &fx.duration, 1).unwrap();
        assert!(scoped.names().is_empty());

        doc.set_attribute(events[0], &fx.duration, 1).unwrap();
        assert_eq!(scoped.names(), vec!["AttributeChanging", "AttributeChanged"]);
    }

    struct Stamp {
        node: NodeId,
        info: Arc<AttributeInfo>,
    }

    impl DomObserver for Stamp {
        fn name(&self) -> &str {
            "stamp"
        }

        fn on_event(&self, document: &mut Document, event: &DomEvent) -> Result<()> {
            if let DomEvent::TransactionEnding { .. } = event {
                document.set_attribute(self.node, &self.info, 99)?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_ending_observer_changes_join_transaction() {
        let fx = fixture();
        let mut doc = fx.document();
        let (_, events) = fx.root_with_events(&mut doc, &["a", "b"]);
        doc.observe(Rc::new(Stamp {
            node: events[1],
            info: fx.duration.clone(),
        }));

        doc.do_transaction("Touch", |doc| doc.set_attribute(events[0], &fx.duration, 1))
            .unwrap();
        assert_eq!(doc.get_attribute(events[1], &fx.duration).unwrap(), AttributeValue::Int(99));
        assert_eq!(doc.history().undo_command().map(Command::len), Some(2));

        doc.undo().unwrap();
        assert!(doc.is_attribute_default(events[1], &fx.duration).unwrap());
    }

    #[test]
    fn test_failed_operation_rolls_back_transaction() {
        let fx = fixture();
        let mut doc = fx.document();
        let (root, events) = fx.root_with_events(&mut doc, &["a"]);
        let before = doc.snapshot(root).unwrap();

        let result = doc.do_transaction("Bad", |doc| {
            doc.set_attribute(events[0], &fx.duration, 5)?;
            doc.set_attribute(events[0], &fx.duration, -1)
        });
        assert!(matches!(result, Err(DomError::InvalidAttributeValue { .. })));
        assert_eq!(doc.snapshot(root).unwrap(), before);
        assert!(!doc.can_undo());
    }

    #[test]
    fn test_setting_current_value_raises_no_event() {
        let fx = fixture();
        let mut doc = fx.document();
        let (_, events) = fx.root_with_events(&mut doc, &["a"]);
        doc.set_attribute(events[0], &fx.duration, 5).unwrap();
        let recorder = Recorder::new();
        doc.observe(recorder.clone());

        doc.set_attribute(events[0], &fx.duration, 5).unwrap();
        doc.set_attribute(events[0], &fx.name, "a").unwrap();
        assert!(recorder.names().is_empty());

        doc.set_attribute(events[0], &fx.duration, 6).unwrap();
        assert_eq!(recorder.names(), vec!["AttributeChanging", "AttributeChanged"]);
    }

    #[test]
    fn test_reparenting_moves_node_between_parents() {
        let fx = fixture();
        let mut doc = fx.document();
        let (_, events) = fx.root_with_events(&mut doc, &["p1", "p2"]);
        let (p1, p2) = (events[0], events[1]);
        let res = doc.create_node(fx.animation_type).unwrap();
        let other = doc.create_node(fx.animation_type).unwrap();
        doc.add_child(p1, &fx.resources, res).unwrap();
        doc.add_child(p1, &fx.resources, other).unwrap();

        doc.add_child(p2, &fx.resources, res).unwrap();

        assert_eq!(doc.parent(res), Some(p2));
        assert_eq!(doc.child_list(p1, &fx.resources).unwrap(), &[other]);
        assert_eq!(doc.child_list(p2, &fx.resources).unwrap(), &[res]);
        let occurrences = doc
            .subtree(doc.root().unwrap())
            .filter(|n| *n == res)
            .count();
        assert_eq!(occurrences, 1);
    }
}
