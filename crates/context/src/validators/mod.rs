//! Concrete Validator Implementations
//!
//! Each validator is a separate module for clarity.

pub mod reference;
pub mod unique_id;

pub use reference::{DanglingPolicy, ReferenceValidator};
pub use unique_id::UniqueIdValidator;
