//! Core value types shared by the schema, the arena and the document
//!
//! Key design principles:
//! 1. Nodes are addressed by a 4+4 byte generational handle, never by pointer
//! 2. Attribute values are a closed enum, one variant per attribute kind
//! 3. Absence is explicit (`AttributeValue::Null`), not an empty string

use serde::{Deserialize, Serialize};
use std::fmt;

/// Node handle: arena slot plus generation.
///
/// A released slot bumps its generation, so stale handles to a reused slot
/// fail lookups instead of silently aliasing the new node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub index: u32,
    pub generation: u32,
}

impl NodeId {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Index of a node type inside its schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeTypeId(pub u32);

/// Primitive kind of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Bool,
    Int,
    Float,
    String,
    Uri,
    BoolArray,
    IntArray,
    FloatArray,
    StringArray,
    /// Weak link to another node; does not affect tree structure
    Reference,
}

impl AttributeKind {
    /// Value used when neither the attribute nor the schema supplies one
    pub fn default_value(&self) -> AttributeValue {
        match self {
            AttributeKind::Bool => AttributeValue::Bool(false),
            AttributeKind::Int => AttributeValue::Int(0),
            AttributeKind::Float => AttributeValue::Float(0.0),
            AttributeKind::String | AttributeKind::Uri | AttributeKind::Reference => {
                AttributeValue::Null
            }
            AttributeKind::BoolArray => AttributeValue::BoolArray(Vec::new()),
            AttributeKind::IntArray => AttributeValue::IntArray(Vec::new()),
            AttributeKind::FloatArray => AttributeValue::FloatArray(Vec::new()),
            AttributeKind::StringArray => AttributeValue::StringArray(Vec::new()),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            AttributeKind::BoolArray
                | AttributeKind::IntArray
                | AttributeKind::FloatArray
                | AttributeKind::StringArray
        )
    }

    /// Only textual kinds can serve as a node's id attribute
    pub fn supports_identifier(&self) -> bool {
        matches!(self, AttributeKind::String | AttributeKind::Uri)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AttributeKind::Bool => "bool",
            AttributeKind::Int => "int",
            AttributeKind::Float => "float",
            AttributeKind::String => "string",
            AttributeKind::Uri => "uri",
            AttributeKind::BoolArray => "bool[]",
            AttributeKind::IntArray => "int[]",
            AttributeKind::FloatArray => "float[]",
            AttributeKind::StringArray => "string[]",
            AttributeKind::Reference => "reference",
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Attribute value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Uri(String),
    BoolArray(Vec<bool>),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    StringArray(Vec<String>),
    Reference(NodeId),
}

impl AttributeValue {
    /// Kind of a non-null value
    pub fn kind(&self) -> Option<AttributeKind> {
        Some(match self {
            AttributeValue::Null => return None,
            AttributeValue::Bool(_) => AttributeKind::Bool,
            AttributeValue::Int(_) => AttributeKind::Int,
            AttributeValue::Float(_) => AttributeKind::Float,
            AttributeValue::String(_) => AttributeKind::String,
            AttributeValue::Uri(_) => AttributeKind::Uri,
            AttributeValue::BoolArray(_) => AttributeKind::BoolArray,
            AttributeValue::IntArray(_) => AttributeKind::IntArray,
            AttributeValue::FloatArray(_) => AttributeKind::FloatArray,
            AttributeValue::StringArray(_) => AttributeKind::StringArray,
            AttributeValue::Reference(_) => AttributeKind::Reference,
        })
    }

    /// Null conforms to every kind (it clears the attribute)
    pub fn conforms_to(&self, kind: AttributeKind) -> bool {
        match self.kind() {
            None => true,
            Some(actual) => actual == kind,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Textual view of String and Uri values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) | AttributeValue::Uri(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<NodeId> {
        match self {
            AttributeValue::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Element count for array values
    pub fn array_len(&self) -> Option<usize> {
        match self {
            AttributeValue::BoolArray(v) => Some(v.len()),
            AttributeValue::IntArray(v) => Some(v.len()),
            AttributeValue::FloatArray(v) => Some(v.len()),
            AttributeValue::StringArray(v) => Some(v.len()),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => f.write_str("null"),
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Int(i) => write!(f, "{i}"),
            AttributeValue::Float(x) => write!(f, "{x}"),
            AttributeValue::String(s) | AttributeValue::Uri(s) => write!(f, "{s:?}"),
            AttributeValue::BoolArray(v) => write!(f, "{v:?}"),
            AttributeValue::IntArray(v) => write!(f, "{v:?}"),
            AttributeValue::FloatArray(v) => write!(f, "{v:?}"),
            AttributeValue::StringArray(v) => write!(f, "{v:?}"),
            AttributeValue::Reference(id) => write!(f, "->{id}"),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Int(value as i64)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<NodeId> for AttributeValue {
    fn from(value: NodeId) -> Self {
        AttributeValue::Reference(value)
    }
}

impl From<Vec<bool>> for AttributeValue {
    fn from(value: Vec<bool>) -> Self {
        AttributeValue::BoolArray(value)
    }
}

impl From<Vec<i64>> for AttributeValue {
    fn from(value: Vec<i64>) -> Self {
        AttributeValue::IntArray(value)
    }
}

impl From<Vec<f64>> for AttributeValue {
    fn from(value: Vec<f64>) -> Self {
        AttributeValue::FloatArray(value)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(value: Vec<String>) -> Self {
        AttributeValue::StringArray(value)
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(AttributeValue::Null)
    }
}
