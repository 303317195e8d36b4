//! Copy/paste and drag/drop contract
//!
//! A payload is a list of node snapshots tagged with a format string, so
//! clipboard text from another application is rejected instead of being
//! half-parsed.

use crate::error::{ContextError, Result};
use atf_dom::{Document, NodeId, NodeSnapshot};
use serde::{Deserialize, Serialize};

pub const PAYLOAD_FORMAT: &str = "atf-dom/nodes";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomPayload {
    pub format: String,
    pub nodes: Vec<NodeSnapshot>,
}

impl DomPayload {
    pub fn new(nodes: Vec<NodeSnapshot>) -> Self {
        Self {
            format: PAYLOAD_FORMAT.to_string(),
            nodes,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let payload: Self = serde_json::from_str(json)?;
        if payload.format != PAYLOAD_FORMAT {
            return Err(ContextError::InvalidPayload(format!(
                "unsupported format '{}'",
                payload.format
            )));
        }
        Ok(payload)
    }
}

/// Operations behind Copy, Paste and Delete
pub trait InstancingContext {
    fn can_copy(&self, document: &Document) -> bool;

    fn copy(&self, document: &Document) -> Result<DomPayload>;

    fn can_insert(&self, document: &Document, payload: &DomPayload) -> bool;

    /// Insert the payload and return the new nodes
    fn insert(&self, document: &mut Document, payload: &DomPayload) -> Result<Vec<NodeId>>;

    fn can_delete(&self, document: &Document) -> bool;

    /// Delete the current items and return how many subtrees were removed
    fn delete(&self, document: &mut Document) -> Result<usize>;
}
