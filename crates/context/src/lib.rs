//! ATF Context Library
//!
//! The contracts UI code consumes on top of an [`atf_dom::Document`]:
//! tree views, item-level change notification, selection, copy/paste
//! and transaction validators.
//!
//! # Architecture
//!
//! 1. **Observers, not callbacks into the tree**: every context that reacts
//!    to edits is a [`atf_dom::DomObserver`] registered on the document
//! 2. **Transactions everywhere**: editing operations run inside named
//!    transactions, so they undo as one step
//! 3. **Validators repair, then commit**: fixes made while a transaction is
//!    ending are part of that transaction

pub mod editing;
pub mod error;
pub mod instancing;
pub mod observable;
pub mod selection;
pub mod tree_view;
pub mod validator;
pub mod validators;

#[cfg(test)]
mod testing;

pub use editing::EditingContext;
pub use error::{ContextError, Result};
pub use instancing::{DomPayload, InstancingContext, PAYLOAD_FORMAT};
pub use observable::{ItemEvent, ObservableContext, ReportingMode};
pub use selection::SelectionContext;
pub use tree_view::{flatten, DomTreeView, SlotTreeView, TreeView};
pub use validator::{Validator, ValidatorManager};
pub use validators::{DanglingPolicy, ReferenceValidator, UniqueIdValidator};
