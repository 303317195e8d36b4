//! Error types for DOM operations
//!
//! Simple, flat error hierarchy. Schema problems get their own enum because
//! they only happen while a schema is being built.

use crate::types::NodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DomError>;

pub type SchemaResult<T> = std::result::Result<T, SchemaError>;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Type '{0}' is frozen")]
    Frozen(String),

    #[error("Duplicate type: {0}")]
    DuplicateType(String),

    #[error("Duplicate attribute '{attribute}' on type '{node_type}'")]
    DuplicateAttribute { node_type: String, attribute: String },

    #[error("Duplicate child slot '{slot}' on type '{node_type}'")]
    DuplicateChild { node_type: String, slot: String },

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Unknown attribute '{attribute}' on type '{node_type}'")]
    UnknownAttribute { node_type: String, attribute: String },

    #[error("Attribute '{attribute}' of kind {kind} cannot be an id")]
    InvalidIdAttribute { attribute: String, kind: &'static str },

    #[error("Invalid default for attribute '{attribute}': {reason}")]
    InvalidDefault { attribute: String, reason: String },

    #[error("Cyclic base type chain through '{0}'")]
    CyclicBaseType(String),
}

#[derive(Debug, Error)]
pub enum DomError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Type constraint violation: {0}")]
    TypeConstraintViolation(String),

    #[error("Invalid value for attribute '{attribute}': {reason}")]
    InvalidAttributeValue { attribute: String, reason: String },

    #[error("Attribute '{attribute}' does not belong to type '{node_type}'")]
    UnknownAttribute { node_type: String, attribute: String },

    #[error("Child slot '{slot}' does not belong to type '{node_type}'")]
    UnknownChildSlot { node_type: String, slot: String },

    #[error("Child slot '{0}' is not a list")]
    NotAList(String),

    #[error("Child slot '{0}' is a list")]
    NotASingleton(String),

    #[error("Index {index} out of range for slot '{slot}' (len {len})")]
    IndexOutOfRange {
        slot: String,
        index: usize,
        len: usize,
    },

    #[error("Inserting {child} under {parent} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },

    #[error("Node {0} still has a parent")]
    NodeAttached(NodeId),

    #[error("Type '{node_type}' does not support capability {capability}")]
    Adaptation {
        node_type: String,
        capability: &'static str,
    },

    #[error("Mutation attempted during event dispatch (depth {depth})")]
    Reentrancy { depth: usize },

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Document changed outside a transaction")]
    OutsideTransaction,

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("{event} vetoed by observer: {reason}")]
    Vetoed { event: &'static str, reason: String },

    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),
}
