//! Scene fixture shared by the unit tests

use atf_dom::{AttributeInfo, ChildInfo, Document, NodeId, NodeTypeId, Schema, SchemaLoader};
use std::sync::Arc;

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
              { "name": "material", "kind": "reference", "rules": [{ "node_type": "material" }] }
          ],
          "children": [{ "name": "nodes", "type": "node", "list": true }] },
        { "name": "material", "id": "name",
          "attributes": [
              { "name": "name", "kind": "string" },
              { "name": "color", "kind": "string", "default": "white" }
          ] }
    ]
}"#;

pub(crate) struct Fixture {
    pub schema: Arc<Schema>,
    pub scene_type: NodeTypeId,
    pub node_type: NodeTypeId,
    pub material_type: NodeTypeId,
    pub nodes: Arc<ChildInfo>,
    pub child_nodes: Arc<ChildInfo>,
    pub materials: Arc<ChildInfo>,
    pub name: Arc<AttributeInfo>,
    pub material: Arc<AttributeInfo>,
    pub material_name: Arc<AttributeInfo>,
    pub color: Arc<AttributeInfo>,
}

pub(crate) fn fixture() -> Fixture {
    let schema = SchemaLoader::from_json(SCENE).unwrap().build().unwrap();
    Fixture {
        scene_type: schema.type_id("scene").unwrap(),
        node_type: schema.type_id("node").unwrap(),
        material_type: schema.type_id("material").unwrap(),
        nodes: schema.child("scene", "nodes").unwrap(),
        child_nodes: schema.child("node", "nodes").unwrap(),
        materials: schema.child("scene", "materials").unwrap(),
        name: schema.attribute("node", "name").unwrap(),
        material: schema.attribute("node", "material").unwrap(),
        material_name: schema.attribute("material", "name").unwrap(),
        color: schema.attribute("material", "color").unwrap(),
        schema,
    }
}

impl Fixture {
    /// Scene root with one top-level node per name
    pub fn scene(&self, names: &[&str]) -> (Document, NodeId, Vec<NodeId>) {
        let mut doc = Document::new(self.schema.clone());
        let scene = doc.create_node(self.scene_type).unwrap();
        doc.set_root(scene).unwrap();
        let nodes = names
            .iter()
            .map(|name| {
                let node = self.node(&mut doc, name);
                doc.add_child(scene, &self.nodes, node).unwrap();
                node
            })
            .collect();
        (doc, scene, nodes)
    }

    pub fn node(&self, doc: &mut Document, name: &str) -> NodeId {
        let node = doc.create_node(self.node_type).unwrap();
        doc.set_attribute(node, &self.name, name).unwrap();
        node
    }

    pub fn material(&self, doc: &mut Document, scene: NodeId, name: &str) -> NodeId {
        let material = doc.create_node(self.material_type).unwrap();
        doc.set_attribute(material, &self.material_name, name).unwrap();
        doc.add_child(scene, &self.materials, material).unwrap();
        material
    }
}
