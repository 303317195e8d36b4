//! Fixture schema and observers shared by the unit tests

use crate::document::Document;
use crate::error::{DomError, Result};
use crate::event::{DomEvent, DomObserver};
use crate::schema::{AttributeInfo, AttributeRule, ChildInfo, Schema, SchemaBuilder};
use crate::types::{AttributeKind, NodeId, NodeTypeId};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// ```text
/// root      events: [event]
/// event     name (id), duration >= 0, target -> resource
///           resources: [resource] (max 3), annotation: note
/// resource  abstract, name (id)
/// animation : resource, length = 1.0
/// note      text
/// chain     next: chain
/// ```
pub(crate) struct Fixture {
    pub schema: Arc<Schema>,
    pub root_type: NodeTypeId,
    pub event_type: NodeTypeId,
    pub resource_type: NodeTypeId,
    pub animation_type: NodeTypeId,
    pub note_type: NodeTypeId,
    pub chain_type: NodeTypeId,
    pub events: Arc<ChildInfo>,
    pub resources: Arc<ChildInfo>,
    pub annotation: Arc<ChildInfo>,
    pub next: Arc<ChildInfo>,
    pub name: Arc<AttributeInfo>,
    pub duration: Arc<AttributeInfo>,
    pub target: Arc<AttributeInfo>,
    pub resource_name: Arc<AttributeInfo>,
    pub length: Arc<AttributeInfo>,
    pub text: Arc<AttributeInfo>,
}

pub(crate) fn fixture() -> Fixture {
    let mut b = SchemaBuilder::new("fixture");
    let root_type = b.define_type("root").unwrap();
    let event_type = b.define_type("event").unwrap();
    let resource_type = b.define_type("resource").unwrap();
    let animation_type = b.define_derived_type("animation", resource_type).unwrap();
    let note_type = b.define_type("note").unwrap();
    let chain_type = b.define_type("chain").unwrap();

    b.add_child(root_type, ChildInfo::list("events", event_type)).unwrap();

    b.add_attribute(event_type, AttributeInfo::new("name", AttributeKind::String))
        .unwrap();
    b.add_attribute(
        event_type,
        AttributeInfo::new("duration", AttributeKind::Int).with_rule(AttributeRule::NumericRange {
            min: Some(0.0),
            max: None,
        }),
    )
    .unwrap();
    b.add_attribute(
        event_type,
        AttributeInfo::new("target", AttributeKind::Reference)
            .with_rule(AttributeRule::NodeType(resource_type)),
    )
    .unwrap();
    b.set_id_attribute(event_type, "name").unwrap();
    b.add_child(
        event_type,
        ChildInfo::list("resources", resource_type).with_occurs(0, Some(3)),
    )
    .unwrap();
    b.add_child(event_type, ChildInfo::single("annotation", note_type))
        .unwrap();

    b.set_abstract(resource_type, true).unwrap();
    b.add_attribute(resource_type, AttributeInfo::new("name", AttributeKind::String))
        .unwrap();
    b.set_id_attribute(resource_type, "name").unwrap();

    b.add_attribute(
        animation_type,
        AttributeInfo::new("length", AttributeKind::Float).with_default(1.0),
    )
    .unwrap();

    b.add_attribute(note_type, AttributeInfo::new("text", AttributeKind::String))
        .unwrap();

    b.add_child(chain_type, ChildInfo::single("next", chain_type)).unwrap();

    let schema = b.build().unwrap();
    Fixture {
        events: schema.child("root", "events").unwrap(),
        resources: schema.child("event", "resources").unwrap(),
        annotation: schema.child("event", "annotation").unwrap(),
        next: schema.child("chain", "next").unwrap(),
        name: schema.attribute("event", "name").unwrap(),
        duration: schema.attribute("event", "duration").unwrap(),
        target: schema.attribute("event", "target").unwrap(),
        resource_name: schema.attribute("resource", "name").unwrap(),
        length: schema.attribute("animation", "length").unwrap(),
        text: schema.attribute("note", "text").unwrap(),
        schema,
        root_type,
        event_type,
        resource_type,
        animation_type,
        note_type,
        chain_type,
    }
}

impl Fixture {
    pub fn document(&self) -> Document {
        Document::new(self.schema.clone())
    }

    /// Root node (set as document root) holding one named event per entry
    pub fn root_with_events(&self, doc: &mut Document, names: &[&str]) -> (NodeId, Vec<NodeId>) {
        let root = doc.create_node(self.root_type).unwrap();
        doc.set_root(root).unwrap();
        let events = names
            .iter()
            .map(|name| {
                let event = doc.create_node(self.event_type).unwrap();
                doc.set_attribute(event, &self.name, *name).unwrap();
                doc.add_child(root, &self.events, event).unwrap();
                event
            })
            .collect();
        (root, events)
    }
}

/// Observer that logs event names and can veto or misbehave on request
pub(crate) struct Recorder {
    seen: RefCell<Vec<DomEvent>>,
    veto: Option<&'static str>,
    mutate: Option<Arc<AttributeInfo>>,
}

impl Recorder {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            seen: RefCell::new(Vec::new()),
            veto: None,
            mutate: None,
        })
    }

    /// Fails every event with the given name
    pub fn vetoing(event: &'static str) -> Rc<Self> {
        Rc::new(Self {
            seen: RefCell::new(Vec::new()),
            veto: Some(event),
            mutate: None,
        })
    }

    /// Writes `info` on the changed node from inside `AttributeChanged`
    pub fn mutating(info: Arc<AttributeInfo>) -> Rc<Self> {
        Rc::new(Self {
            seen: RefCell::new(Vec::new()),
            veto: None,
            mutate: Some(info),
        })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.seen.borrow().iter().map(DomEvent::name).collect()
    }

    pub fn events(&self) -> Vec<DomEvent> {
        self.seen.borrow().clone()
    }
}

impl DomObserver for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn on_event(&self, document: &mut Document, event: &DomEvent) -> Result<()> {
        self.seen.borrow_mut().push(event.clone());
        if self.veto == Some(event.name()) {
            return Err(DomError::Transaction("vetoed by test".to_string()));
        }
        if let (Some(info), DomEvent::AttributeChanged(e)) = (&self.mutate, event) {
            if e.info.key() != info.key() {
                document.set_attribute(e.node, info, 42)?;
            }
        }
        Ok(())
    }
}
