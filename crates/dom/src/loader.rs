//! Schema loading from JSON
//!
//! This handles:
//! - parsing a declarative schema document
//! - ordering types so every base is defined before its derived types
//! - converting JSON defaults to typed attribute values
//!
//! The loader returns a [`SchemaBuilder`], so adapters can still be bound
//! before the schema is built.
//!
//! ```json
//! {
//!   "name": "timeline",
//!   "types": [
//!     { "name": "event", "id": "name",
//!       "attributes": [
//!         { "name": "name", "kind": "string" },
//!         { "name": "duration", "kind": "int", "default": 1,
//!           "rules": [{ "range": { "min": 0 } }] }
//!       ],
//!       "children": [{ "name": "resources", "type": "resource", "list": true }] }
//!   ]
//! }
//! ```

use crate::error::{Result, SchemaError};
use crate::schema::{AttributeInfo, AttributeRule, ChildInfo, SchemaBuilder};
use crate::types::{AttributeKind, AttributeValue};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDef {
    pub name: String,
    #[serde(default)]
    pub types: Vec<TypeDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    /// Name of the id attribute
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
    #[serde(default)]
    pub children: Vec<ChildDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    pub kind: AttributeKind,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub rules: Vec<RuleDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleDef {
    Enumeration(Vec<String>),
    Range {
        min: Option<f64>,
        max: Option<f64>,
    },
    Length {
        #[serde(default)]
        min: usize,
        max: Option<usize>,
    },
    /// Type name the reference target must derive from
    NodeType(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildDef {
    pub name: String,
    #[serde(rename = "type")]
    pub child_type: String,
    #[serde(default)]
    pub list: bool,
    #[serde(default)]
    pub min: usize,
    #[serde(default)]
    pub max: Option<usize>,
}

/// Builds a [`SchemaBuilder`] from a [`SchemaDef`]
pub struct SchemaLoader;

impl SchemaLoader {
    pub fn from_json(json: &str) -> Result<SchemaBuilder> {
        let def: SchemaDef = serde_json::from_str(json)?;
        Self::from_def(&def)
    }

    pub fn from_def(def: &SchemaDef) -> Result<SchemaBuilder> {
        let mut builder = SchemaBuilder::new(def.name.clone());

        let mut by_name: AHashMap<&str, &TypeDef> = AHashMap::new();
        for ty in &def.types {
            if by_name.insert(ty.name.as_str(), ty).is_some() {
                return Err(SchemaError::DuplicateType(ty.name.clone()).into());
            }
        }

        // Pass 1: define types, bases first
        for ty in &def.types {
            let mut chain: Vec<&TypeDef> = Vec::new();
            let mut current = Some(ty);
            while let Some(link) = current {
                if builder.type_id(&link.name).is_some() {
                    break;
                }
                if chain.iter().any(|c| c.name == link.name) {
                    return Err(SchemaError::CyclicBaseType(link.name.clone()).into());
                }
                chain.push(link);
                current = match &link.base {
                    Some(base) => Some(
                        *by_name
                            .get(base.as_str())
                            .ok_or_else(|| SchemaError::UnknownType(base.clone()))?,
                    ),
                    None => None,
                };
            }
            for link in chain.into_iter().rev() {
                match &link.base {
                    Some(base) => {
                        let base_id = builder
                            .type_id(base)
                            .ok_or_else(|| SchemaError::UnknownType(base.clone()))?;
                        builder.define_derived_type(link.name.clone(), base_id)?;
                    }
                    None => {
                        builder.define_type(link.name.clone())?;
                    }
                }
            }
        }

        // Pass 2: members, now that every type name resolves
        for ty in &def.types {
            let id = builder
                .type_id(&ty.name)
                .ok_or_else(|| SchemaError::UnknownType(ty.name.clone()))?;
            builder.set_abstract(id, ty.is_abstract)?;

            for attr in &ty.attributes {
                let info = Self::attribute_info(&builder, attr)?;
                builder.add_attribute(id, info)?;
            }

            for child in &ty.children {
                let child_type = builder
                    .type_id(&child.child_type)
                    .ok_or_else(|| SchemaError::UnknownType(child.child_type.clone()))?;
                let info = if child.list {
                    ChildInfo::list(child.name.clone(), child_type)
                } else {
                    ChildInfo::single(child.name.clone(), child_type)
                };
                builder.add_child(id, info.with_occurs(child.min, child.max))?;
            }
        }

        // Pass 3: ids, once inherited attributes exist
        for ty in def.types.iter().filter(|t| t.id.is_some()) {
            let id = builder
                .type_id(&ty.name)
                .ok_or_else(|| SchemaError::UnknownType(ty.name.clone()))?;
            if let Some(id_attribute) = &ty.id {
                builder.set_id_attribute(id, id_attribute.clone())?;
            }
        }

        tracing::debug!(
            "Loaded schema '{}' ({} types)",
            def.name,
            def.types.len()
        );
        Ok(builder)
    }

    fn attribute_info(builder: &SchemaBuilder, def: &AttributeDef) -> Result<AttributeInfo> {
        let mut info = AttributeInfo::new(def.name.clone(), def.kind);

        if let Some(default) = &def.default {
            let value = json_to_value(def.kind, default).map_err(|reason| SchemaError::InvalidDefault {
                attribute: def.name.clone(),
                reason,
            })?;
            info = info.with_default(value);
        }

        for rule in &def.rules {
            let rule = match rule {
                RuleDef::Enumeration(values) => AttributeRule::Enumeration(values.clone()),
                RuleDef::Range { min, max } => AttributeRule::NumericRange {
                    min: *min,
                    max: *max,
                },
                RuleDef::Length { min, max } => AttributeRule::ArrayLength {
                    min: *min,
                    max: *max,
                },
                RuleDef::NodeType(name) => AttributeRule::NodeType(
                    builder
                        .type_id(name)
                        .ok_or_else(|| SchemaError::UnknownType(name.clone()))?,
                ),
            };
            info = info.with_rule(rule);
        }
        Ok(info)
    }
}

/// Convert a JSON literal to a value of `kind`
fn json_to_value(kind: AttributeKind, value: &Value) -> std::result::Result<AttributeValue, String> {
    if value.is_null() {
        return Ok(AttributeValue::Null);
    }
    let mismatch = || format!("{value} is not a valid {kind}");

    fn array<T>(value: &Value, item: impl Fn(&Value) -> Option<T>) -> Option<Vec<T>> {
        value.as_array()?.iter().map(item).collect()
    }

    let converted = match kind {
        AttributeKind::Bool => value.as_bool().map(AttributeValue::Bool),
        AttributeKind::Int => value.as_i64().map(AttributeValue::Int),
        AttributeKind::Float => value.as_f64().map(AttributeValue::Float),
        AttributeKind::String => value.as_str().map(|s| AttributeValue::String(s.to_string())),
        AttributeKind::Uri => value.as_str().map(|s| AttributeValue::Uri(s.to_string())),
        AttributeKind::BoolArray => array(value, Value::as_bool).map(AttributeValue::BoolArray),
        AttributeKind::IntArray => array(value, Value::as_i64).map(AttributeValue::IntArray),
        AttributeKind::FloatArray => array(value, Value::as_f64).map(AttributeValue::FloatArray),
        AttributeKind::StringArray => {
            array(value, |v| v.as_str().map(str::to_string)).map(AttributeValue::StringArray)
        }
        AttributeKind::Reference => return Err("reference attributes cannot have a default".to_string()),
    };
    converted.ok_or_else(mismatch)
}
