//! Tree editor example - outline, select, copy/paste and delete

use atf_context::{
    flatten, EditingContext, InstancingContext, ItemEvent, ObservableContext, ReportingMode,
    SelectionContext, SlotTreeView,
};
use atf_dom::{Document, DomSerializer, SchemaLoader};
use std::rc::Rc;

const SCENE: &str = r#"{
    "name": "scene",
    "types": [
        { "name": "scene",
          "children": [
              { "name": "nodes", "type": "node", "list": true },
              { "name": "materials", "type": "material", "list": true }
          ] },
        { "name": "node", "id": "name",
          "attributes": [
              { "name": "name", "kind": "string" },
              { "name": "visible", "kind": "bool", "default": true },
              { "name": "material", "kind": "reference", "rules": [{ "node_type": "material" }] }
          ],
          "children": [{ "name": "nodes", "type": "node", "list": true }] },
        { "name": "material", "id": "name",
          "attributes": [{ "name": "name", "kind": "string" }] }
    ]
}"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let schema = SchemaLoader::from_json(SCENE)?.build()?;
    let nodes = schema.child("scene", "nodes").ok_or("missing slot")?;
    let child_nodes = schema.child("node", "nodes").ok_or("missing slot")?;
    let name = schema.attribute("node", "name").ok_or("missing attribute")?;

    let mut doc = Document::new(schema);
    let scene = doc.create_node_by_name("scene")?;
    doc.set_root(scene)?;

    let observable = Rc::new(ObservableContext::new(ReportingMode::TransactionBatched));
    observable.attach(&mut doc);
    observable.on_item(|event| match event {
        ItemEvent::ItemInserted { item, index, .. } => println!("  + {} at {}", item, index),
        ItemEvent::ItemRemoved { item, .. } => println!("  - {}", item),
        ItemEvent::ItemChanged {
            item,
            attribute,
            new_value,
            ..
        } => println!("  ~ {}.{} = {}", item, attribute.name(), new_value),
        ItemEvent::Reloaded => println!("  (reloaded)"),
    });

    let editor = EditingContext::new(Rc::new(SelectionContext::new()));
    editor.attach(&mut doc);

    println!("Building scene");
    let car = doc.do_transaction("Build", |doc| {
        let car = doc.create_node_by_name("node")?;
        doc.set_attribute(car, &name, "car")?;
        doc.add_child(scene, &nodes, car)?;
        for wheel in ["front", "back"] {
            let node = doc.create_node_by_name("node")?;
            doc.set_attribute(node, &name, wheel)?;
            doc.add_child(car, &child_nodes, node)?;
        }
        Ok(car)
    })?;

    println!("Copy 'car', paste into the scene");
    editor.selection().set([car]);
    let payload = editor.copy(&doc)?;
    let clipboard = payload.to_json()?;
    editor.selection().clear();
    let pasted = editor.insert(&mut doc, &atf_context::DomPayload::from_json(&clipboard)?)?;
    println!("Pasted as {:?}", doc.get_id(pasted[0]));

    println!("Delete the original");
    editor.selection().set([car]);
    editor.delete(&mut doc)?;

    let view = SlotTreeView::new(scene, ["nodes"]);
    for (depth, node) in flatten(&view, &doc) {
        let label = doc.get_id(node).unwrap_or_else(|| "scene".to_string());
        println!("{}{}", "  ".repeat(depth), label);
    }

    println!("{}", DomSerializer::new().serialize(&doc, scene)?);
    Ok(())
}
