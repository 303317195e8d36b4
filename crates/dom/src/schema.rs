//! Node types, attribute/child metadata and the schema that owns them
//!
//! A schema is built once through [`SchemaBuilder`] and then shared
//! read-only (`Arc<Schema>`) by every document that uses it.
//!
//! Derived types flatten their base chain at build time: inherited
//! attributes and child slots come first and keep the index they have in
//! the base type, so an `AttributeInfo` obtained from a base type resolves
//! on every derived node.

use crate::adapter::AdapterBinding;
use crate::error::{DomError, SchemaError, SchemaResult};
use crate::types::{AttributeKind, AttributeValue, NodeTypeId};
use ahash::AHashMap;
use std::sync::Arc;

/// Value restriction attached to an attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeRule {
    /// Value must be one of the listed strings
    Enumeration(Vec<String>),
    /// Inclusive numeric bounds
    NumericRange { min: Option<f64>, max: Option<f64> },
    /// Element count bounds for array kinds
    ArrayLength { min: usize, max: Option<usize> },
    /// Reference target must be assignable to this type
    NodeType(NodeTypeId),
}

impl AttributeRule {
    /// Check a non-null value. `NodeType` needs the document and is checked there.
    fn check(&self, value: &AttributeValue) -> std::result::Result<(), String> {
        match self {
            AttributeRule::Enumeration(allowed) => match value.as_str() {
                Some(s) if allowed.iter().any(|a| a == s) => Ok(()),
                Some(s) => Err(format!("'{s}' is not one of {allowed:?}")),
                None => Err("enumeration rule needs a textual value".to_string()),
            },
            AttributeRule::NumericRange { min, max } => {
                let values: Vec<f64> = match value {
                    AttributeValue::IntArray(v) => v.iter().map(|i| *i as f64).collect(),
                    AttributeValue::FloatArray(v) => v.clone(),
                    other => match other.as_float() {
                        Some(x) => vec![x],
                        None => return Err("range rule needs a numeric value".to_string()),
                    },
                };
                for x in values {
                    if min.is_some_and(|m| x < m) || max.is_some_and(|m| x > m) {
                        return Err(format!("{x} is outside [{min:?}, {max:?}]"));
                    }
                }
                Ok(())
            }
            AttributeRule::ArrayLength { min, max } => {
                let len = value
                    .array_len()
                    .ok_or_else(|| "length rule needs an array value".to_string())?;
                if len < *min || max.is_some_and(|m| len > m) {
                    return Err(format!("length {len} is outside [{min}, {max:?}]"));
                }
                Ok(())
            }
            AttributeRule::NodeType(_) => Ok(()),
        }
    }
}

/// Stable identity of an attribute: defining type plus slot index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeKey {
    pub defining_type: NodeTypeId,
    pub index: u32,
}

const UNDEFINED_TYPE: NodeTypeId = NodeTypeId(u32::MAX);

/// Attribute metadata
#[derive(Debug, Clone)]
pub struct AttributeInfo {
    name: String,
    kind: AttributeKind,
    default: Option<AttributeValue>,
    rules: Vec<AttributeRule>,
    defining_type: Option<NodeTypeId>,
    index: u32,
}

impl AttributeInfo {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            rules: Vec::new(),
            defining_type: None,
            index: 0,
        }
    }

    pub fn with_default(mut self, value: impl Into<AttributeValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_rule(mut self, rule: AttributeRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AttributeKind {
        self.kind
    }

    pub fn rules(&self) -> &[AttributeRule] {
        &self.rules
    }

    /// Type that declared the attribute; `None` until the schema is built
    pub fn defining_type(&self) -> Option<NodeTypeId> {
        self.defining_type
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn key(&self) -> AttributeKey {
        AttributeKey {
            defining_type: self.defining_type.unwrap_or(UNDEFINED_TYPE),
            index: self.index,
        }
    }

    /// Schema default, falling back to the kind's default
    pub fn default_value(&self) -> AttributeValue {
        self.default
            .clone()
            .unwrap_or_else(|| self.kind.default_value())
    }

    /// Kind conformance and every rule except `NodeType`
    pub fn validate(&self, value: &AttributeValue) -> Result<(), DomError> {
        if !value.conforms_to(self.kind) {
            return Err(DomError::InvalidAttributeValue {
                attribute: self.name.clone(),
                reason: format!(
                    "expected {}, got {}",
                    self.kind,
                    value.kind().map(|k| k.name()).unwrap_or("null")
                ),
            });
        }
        if value.is_null() {
            return Ok(());
        }
        for rule in &self.rules {
            rule.check(value)
                .map_err(|reason| DomError::InvalidAttributeValue {
                    attribute: self.name.clone(),
                    reason,
                })?;
        }
        Ok(())
    }

    /// Target type constraint for reference attributes
    pub fn reference_type(&self) -> Option<NodeTypeId> {
        self.rules.iter().find_map(|r| match r {
            AttributeRule::NodeType(t) => Some(*t),
            _ => None,
        })
    }
}

impl PartialEq for AttributeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.defining_type == other.defining_type
            && self.index == other.index
            && self.name == other.name
    }
}

impl Eq for AttributeInfo {}

/// Child slot metadata
#[derive(Debug, Clone)]
pub struct ChildInfo {
    name: String,
    child_type: NodeTypeId,
    is_list: bool,
    min_occurs: usize,
    max_occurs: Option<usize>,
    defining_type: Option<NodeTypeId>,
    index: u32,
}

impl ChildInfo {
    /// Slot holding at most one child
    pub fn single(name: impl Into<String>, child_type: NodeTypeId) -> Self {
        Self {
            name: name.into(),
            child_type,
            is_list: false,
            min_occurs: 0,
            max_occurs: Some(1),
            defining_type: None,
            index: 0,
        }
    }

    /// Ordered list slot
    pub fn list(name: impl Into<String>, child_type: NodeTypeId) -> Self {
        Self {
            is_list: true,
            max_occurs: None,
            ..Self::single(name, child_type)
        }
    }

    /// Occurrence bounds. `max_occurs` is enforced on insertion; `min_occurs`
    /// is reported by [`ChildInfo::is_satisfied_by`].
    pub fn with_occurs(mut self, min_occurs: usize, max_occurs: Option<usize>) -> Self {
        self.min_occurs = min_occurs;
        if self.is_list {
            self.max_occurs = max_occurs;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn child_type(&self) -> NodeTypeId {
        self.child_type
    }

    pub fn is_list(&self) -> bool {
        self.is_list
    }

    pub fn min_occurs(&self) -> usize {
        self.min_occurs
    }

    pub fn max_occurs(&self) -> Option<usize> {
        self.max_occurs
    }

    pub fn defining_type(&self) -> Option<NodeTypeId> {
        self.defining_type
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn is_satisfied_by(&self, count: usize) -> bool {
        count >= self.min_occurs && self.max_occurs.map_or(true, |m| count <= m)
    }
}

impl PartialEq for ChildInfo {
    fn eq(&self, other: &Self) -> bool {
        self.defining_type == other.defining_type
            && self.index == other.index
            && self.name == other.name
    }
}

impl Eq for ChildInfo {}

/// Either half of a descendant path lookup
#[derive(Debug, Clone, PartialEq)]
pub enum DescendantInfo {
    Attribute(Arc<AttributeInfo>),
    Child(Arc<ChildInfo>),
}

/// A frozen node type
#[derive(Debug)]
pub struct DomNodeType {
    id: NodeTypeId,
    name: String,
    base: Option<NodeTypeId>,
    /// Self first, then each base up to the root type
    lineage: Vec<NodeTypeId>,
    is_abstract: bool,
    attributes: Vec<Arc<AttributeInfo>>,
    children: Vec<Arc<ChildInfo>>,
    attribute_names: AHashMap<String, usize>,
    child_names: AHashMap<String, usize>,
    id_attribute: Option<Arc<AttributeInfo>>,
    /// Most derived bindings first
    adapters: Vec<Arc<AdapterBinding>>,
}

impl DomNodeType {
    pub fn id(&self) -> NodeTypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> Option<NodeTypeId> {
        self.base
    }

    pub fn lineage(&self) -> &[NodeTypeId] {
        &self.lineage
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// True when `other` is this type or derives from it
    pub fn is_assignable_from(&self, other: &DomNodeType) -> bool {
        other.lineage.contains(&self.id)
    }

    pub fn attributes(&self) -> &[Arc<AttributeInfo>] {
        &self.attributes
    }

    pub fn children(&self) -> &[Arc<ChildInfo>] {
        &self.children
    }

    pub fn attribute_info(&self, name: &str) -> Option<&Arc<AttributeInfo>> {
        self.attribute_names.get(name).map(|i| &self.attributes[*i])
    }

    pub fn child_info(&self, name: &str) -> Option<&Arc<ChildInfo>> {
        self.child_names.get(name).map(|i| &self.children[*i])
    }

    pub fn id_attribute(&self) -> Option<&Arc<AttributeInfo>> {
        self.id_attribute.as_ref()
    }

    pub fn adapters(&self) -> &[Arc<AdapterBinding>] {
        &self.adapters
    }

    /// The matching attribute of this type, if `info` belongs to its lineage
    pub fn resolve_attribute(&self, info: &AttributeInfo) -> Option<&Arc<AttributeInfo>> {
        self.attributes
            .get(info.index())
            .filter(|a| a.defining_type.is_some() && a.defining_type == info.defining_type)
    }

    pub fn resolve_child(&self, info: &ChildInfo) -> Option<&Arc<ChildInfo>> {
        self.children
            .get(info.index())
            .filter(|c| c.defining_type.is_some() && c.defining_type == info.defining_type)
    }
}

/// Immutable set of node types
#[derive(Debug)]
pub struct Schema {
    name: String,
    types: Vec<Arc<DomNodeType>>,
    names: AHashMap<String, NodeTypeId>,
}

impl Schema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_type(&self, id: NodeTypeId) -> Option<&Arc<DomNodeType>> {
        self.types.get(id.0 as usize)
    }

    pub fn get_type(&self, name: &str) -> Option<&Arc<DomNodeType>> {
        self.type_id(name).and_then(|id| self.node_type(id))
    }

    pub fn type_id(&self, name: &str) -> Option<NodeTypeId> {
        self.names.get(name).copied()
    }

    pub fn types(&self) -> impl Iterator<Item = &Arc<DomNodeType>> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// True when `candidate` is `target` or derives from it
    pub fn is_assignable(&self, target: NodeTypeId, candidate: NodeTypeId) -> bool {
        self.node_type(candidate)
            .is_some_and(|t| t.lineage.contains(&target))
    }

    /// Attribute lookup by type and attribute name
    pub fn attribute(&self, type_name: &str, attribute: &str) -> Option<Arc<AttributeInfo>> {
        self.get_type(type_name)?.attribute_info(attribute).cloned()
    }

    /// Child slot lookup by type and slot name
    pub fn child(&self, type_name: &str, slot: &str) -> Option<Arc<ChildInfo>> {
        self.get_type(type_name)?.child_info(slot).cloned()
    }

    /// Resolve a `slot:slot:name` path. Every segment but the last names a
    /// child slot; the last is tried as an attribute, then as a slot.
    pub fn descendant_info(&self, type_id: NodeTypeId, path: &str) -> Option<DescendantInfo> {
        let mut current = self.node_type(type_id)?;
        let segments: Vec<&str> = path.split(':').collect();
        let (last, prefix) = segments.split_last()?;

        for segment in prefix {
            let slot = current.child_info(segment)?;
            current = self.node_type(slot.child_type())?;
        }

        if let Some(attr) = current.attribute_info(last) {
            return Some(DescendantInfo::Attribute(attr.clone()));
        }
        current
            .child_info(last)
            .map(|c| DescendantInfo::Child(c.clone()))
    }
}

#[derive(Debug)]
struct TypeDraft {
    name: String,
    base: Option<NodeTypeId>,
    is_abstract: bool,
    frozen: bool,
    attributes: Vec<AttributeInfo>,
    children: Vec<ChildInfo>,
    id_attribute: Option<String>,
    adapters: Vec<Arc<AdapterBinding>>,
}

/// Mutable schema under construction
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    types: Vec<TypeDraft>,
    names: AHashMap<String, NodeTypeId>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
            names: AHashMap::new(),
        }
    }

    pub fn define_type(&mut self, name: impl Into<String>) -> SchemaResult<NodeTypeId> {
        self.push_type(name.into(), None)
    }

    /// Define a type inheriting the attributes, slots, id attribute and
    /// adapters of `base`
    pub fn define_derived_type(
        &mut self,
        name: impl Into<String>,
        base: NodeTypeId,
    ) -> SchemaResult<NodeTypeId> {
        self.draft(base)?;
        self.push_type(name.into(), Some(base))
    }

    fn push_type(&mut self, name: String, base: Option<NodeTypeId>) -> SchemaResult<NodeTypeId> {
        if self.names.contains_key(&name) {
            return Err(SchemaError::DuplicateType(name));
        }
        let id = NodeTypeId(self.types.len() as u32);
        self.names.insert(name.clone(), id);
        self.types.push(TypeDraft {
            name,
            base,
            is_abstract: false,
            frozen: false,
            attributes: Vec::new(),
            children: Vec::new(),
            id_attribute: None,
            adapters: Vec::new(),
        });
        Ok(id)
    }

    pub fn type_id(&self, name: &str) -> Option<NodeTypeId> {
        self.names.get(name).copied()
    }

    pub fn set_abstract(&mut self, id: NodeTypeId, is_abstract: bool) -> SchemaResult<()> {
        self.draft_mut(id)?.is_abstract = is_abstract;
        Ok(())
    }

    pub fn add_attribute(&mut self, id: NodeTypeId, info: AttributeInfo) -> SchemaResult<()> {
        let draft = self.draft_mut(id)?;
        if draft.attributes.iter().any(|a| a.name == info.name) {
            return Err(SchemaError::DuplicateAttribute {
                node_type: draft.name.clone(),
                attribute: info.name,
            });
        }
        draft.attributes.push(info);
        Ok(())
    }

    pub fn add_child(&mut self, id: NodeTypeId, info: ChildInfo) -> SchemaResult<()> {
        self.draft(info.child_type)?;
        let draft = self.draft_mut(id)?;
        if draft.children.iter().any(|c| c.name == info.name) {
            return Err(SchemaError::DuplicateChild {
                node_type: draft.name.clone(),
                slot: info.name,
            });
        }
        draft.children.push(info);
        Ok(())
    }

    /// Name the attribute (own or inherited) that identifies nodes of this type
    ///
    /// The attribute must already be declared and hold text.
    pub fn set_id_attribute(&mut self, id: NodeTypeId, attribute: impl Into<String>) -> SchemaResult<()> {
        let attribute = attribute.into();
        self.draft_mut(id)?;
        let kind = self.find_draft_attribute(id, &attribute)?.kind;
        if !kind.supports_identifier() {
            return Err(SchemaError::InvalidIdAttribute {
                attribute,
                kind: kind.name(),
            });
        }
        self.draft_mut(id)?.id_attribute = Some(attribute);
        Ok(())
    }

    /// Attribute named `name` on `id` or the nearest base declaring it
    fn find_draft_attribute(&self, id: NodeTypeId, name: &str) -> SchemaResult<&AttributeInfo> {
        let mut current = Some(id);
        for _ in 0..self.types.len() {
            let Some(type_id) = current else { break };
            let draft = self.draft(type_id)?;
            if let Some(info) = draft.attributes.iter().find(|a| a.name == name) {
                return Ok(info);
            }
            current = draft.base;
        }
        Err(SchemaError::UnknownAttribute {
            node_type: self.draft(id)?.name.clone(),
            attribute: name.to_string(),
        })
    }

    pub fn define_adapter(&mut self, id: NodeTypeId, binding: impl Into<AdapterBinding>) -> SchemaResult<()> {
        self.draft_mut(id)?.adapters.push(Arc::new(binding.into()));
        Ok(())
    }

    /// Freeze a type and its base chain; later definitions fail with `Frozen`
    pub fn freeze_type(&mut self, id: NodeTypeId) -> SchemaResult<()> {
        let mut current = Some(id);
        while let Some(type_id) = current {
            let draft = self.draft_mut_unchecked(type_id)?;
            draft.frozen = true;
            current = draft.base;
        }
        Ok(())
    }

    pub fn is_frozen(&self, id: NodeTypeId) -> bool {
        self.draft(id).map(|d| d.frozen).unwrap_or(false)
    }

    fn draft(&self, id: NodeTypeId) -> SchemaResult<&TypeDraft> {
        self.types
            .get(id.0 as usize)
            .ok_or_else(|| SchemaError::UnknownType(format!("{id:?}")))
    }

    fn draft_mut_unchecked(&mut self, id: NodeTypeId) -> SchemaResult<&mut TypeDraft> {
        self.types
            .get_mut(id.0 as usize)
            .ok_or_else(|| SchemaError::UnknownType(format!("{id:?}")))
    }

    fn draft_mut(&mut self, id: NodeTypeId) -> SchemaResult<&mut TypeDraft> {
        let draft = self.draft_mut_unchecked(id)?;
        if draft.frozen {
            return Err(SchemaError::Frozen(draft.name.clone()));
        }
        Ok(draft)
    }

    /// Freeze every type and produce the shared schema
    pub fn build(self) -> SchemaResult<Arc<Schema>> {
        let type_count = self.types.len();
        let mut built: Vec<Arc<DomNodeType>> = Vec::with_capacity(type_count);

        // Bases always have a lower id than the types deriving from them.
        for (position, draft) in self.types.into_iter().enumerate() {
            let id = NodeTypeId(position as u32);
            let base = draft.base.map(|b| built[b.0 as usize].clone());

            let mut lineage = vec![id];
            let mut attributes = Vec::new();
            let mut children = Vec::new();
            let mut adapters = Vec::new();
            let mut inherited_id = None;
            if let Some(base) = &base {
                lineage.extend_from_slice(&base.lineage);
                attributes.extend(base.attributes.iter().cloned());
                children.extend(base.children.iter().cloned());
                inherited_id = base.id_attribute.clone();
            }

            let mut attribute_names: AHashMap<String, usize> = attributes
                .iter()
                .enumerate()
                .map(|(i, a)| (a.name.clone(), i))
                .collect();
            for mut info in draft.attributes {
                if attribute_names.contains_key(&info.name) {
                    return Err(SchemaError::DuplicateAttribute {
                        node_type: draft.name.clone(),
                        attribute: info.name,
                    });
                }
                if let Some(default) = &info.default {
                    info.validate(default)
                        .map_err(|e| SchemaError::InvalidDefault {
                            attribute: info.name.clone(),
                            reason: e.to_string(),
                        })?;
                }
                if let Some(target) = info.reference_type() {
                    if target.0 as usize >= type_count {
                        return Err(SchemaError::UnknownType(format!("{target:?}")));
                    }
                }
                info.defining_type = Some(id);
                info.index = attributes.len() as u32;
                attribute_names.insert(info.name.clone(), attributes.len());
                attributes.push(Arc::new(info));
            }

            let mut child_names: AHashMap<String, usize> = children
                .iter()
                .enumerate()
                .map(|(i, c)| (c.name.clone(), i))
                .collect();
            for mut info in draft.children {
                if child_names.contains_key(&info.name) {
                    return Err(SchemaError::DuplicateChild {
                        node_type: draft.name.clone(),
                        slot: info.name,
                    });
                }
                info.defining_type = Some(id);
                info.index = children.len() as u32;
                child_names.insert(info.name.clone(), children.len());
                children.push(Arc::new(info));
            }

            let id_attribute = match draft.id_attribute {
                Some(name) => {
                    let attr = attribute_names
                        .get(&name)
                        .map(|i| attributes[*i].clone())
                        .ok_or_else(|| SchemaError::UnknownAttribute {
                            node_type: draft.name.clone(),
                            attribute: name.clone(),
                        })?;
                    if !attr.kind.supports_identifier() {
                        return Err(SchemaError::InvalidIdAttribute {
                            attribute: name,
                            kind: attr.kind.name(),
                        });
                    }
                    Some(attr)
                }
                None => inherited_id,
            };

            adapters.extend(draft.adapters);
            if let Some(base) = &base {
                adapters.extend(base.adapters.iter().cloned());
            }

            tracing::trace!(
                "Built node type '{}' ({} attributes, {} slots)",
                draft.name,
                attributes.len(),
                children.len()
            );

            built.push(Arc::new(DomNodeType {
                id,
                name: draft.name,
                base: draft.base,
                lineage,
                is_abstract: draft.is_abstract,
                attributes,
                children,
                attribute_names,
                child_names,
                id_attribute,
                adapters,
            }));
        }

        tracing::debug!("Built schema '{}' with {} types", self.name, built.len());

        Ok(Arc::new(Schema {
            name: self.name,
            types: built,
            names: self.names,
        }))
    }
}
