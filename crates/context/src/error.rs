//! Error types for context operations

use atf_dom::DomError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ContextError>;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("DOM error: {0}")]
    Dom(#[from] DomError),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("No place to insert a '{0}'")]
    NoInsertionTarget(String),

    #[error("Nothing selected")]
    EmptySelection,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
