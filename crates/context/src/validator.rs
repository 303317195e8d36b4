//! Validator System - transaction-scoped consistency checks
//!
//! Validators watch the changes of a transaction and get one chance to
//! repair the tree while it is ending. Repairs are recorded in the same
//! transaction, so undo reverts the edit and its repair together.
//!
//! Philosophy:
//! - Composition over one observer per rule
//! - A failing validator cancels the transaction

use atf_dom::{Document, DomEvent, DomObserver, ObserverId};
use std::rc::Rc;

/// Watches document changes and fixes what a transaction broke
///
/// Only `on_ending` may mutate the document; every other hook sees it
/// read-only.
pub trait Validator {
    /// Human-readable name for logging
    fn name(&self) -> &str;

    /// Called for every attribute and child event
    fn on_change(&self, document: &Document, event: &DomEvent) {
        let _ = (document, event);
    }

    fn on_beginning(&self, document: &Document) {
        let _ = document;
    }

    /// Last chance to repair the tree. An error cancels the transaction.
    fn on_ending(&self, document: &mut Document) -> atf_dom::Result<()> {
        let _ = document;
        Ok(())
    }

    fn on_ended(&self, document: &Document) {
        let _ = document;
    }

    fn on_cancelled(&self, document: &Document) {
        let _ = document;
    }
}

/// Dispatches document events to every registered validator
#[derive(Default)]
pub struct ValidatorManager {
    validators: Vec<Box<dyn Validator>>,
}

impl ValidatorManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, validator: Box<dyn Validator>) {
        tracing::debug!("Registered validator: {}", validator.name());
        self.validators.push(validator);
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Register the manager on `document`
    pub fn attach(self, document: &mut Document) -> (Rc<Self>, ObserverId) {
        let manager = Rc::new(self);
        let id = document.observe(manager.clone());
        (manager, id)
    }
}

impl DomObserver for ValidatorManager {
    fn name(&self) -> &str {
        "ValidatorManager"
    }

    fn on_event(&self, document: &mut Document, event: &DomEvent) -> atf_dom::Result<()> {
        match event {
            DomEvent::TransactionBeginning { .. } => {
                for validator in &self.validators {
                    validator.on_beginning(document);
                }
            }
            DomEvent::TransactionEnding { name } => {
                for validator in &self.validators {
                    if let Err(e) = validator.on_ending(document) {
                        tracing::warn!(
                            "[{}] Rejected transaction '{}': {}",
                            validator.name(),
                            name,
                            e
                        );
                        return Err(e);
                    }
                }
            }
            DomEvent::TransactionEnded { .. } => {
                for validator in &self.validators {
                    validator.on_ended(document);
                }
            }
            DomEvent::TransactionCancelled { .. } => {
                for validator in &self.validators {
                    validator.on_cancelled(document);
                }
            }
            _ => {
                for validator in &self.validators {
                    validator.on_change(document, event);
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ValidatorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.validators.iter().map(|v| v.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixture;
    use atf_dom::DomError;
    use std::cell::RefCell;

    struct TestValidator {
        name: String,
        log: Rc<RefCell<Vec<String>>>,
        reject: bool,
    }

    impl Validator for TestValidator {
        fn name(&self) -> &str {
            &self.name
        }

        fn on_change(&self, _document: &Document, event: &DomEvent) {
            self.log.borrow_mut().push(format!("{}:{}", self.name, event.name()));
        }

        fn on_ending(&self, _document: &mut Document) -> atf_dom::Result<()> {
            self.log.borrow_mut().push(format!("{}:ending", self.name));
            if self.reject {
                return Err(DomError::Transaction("rejected".to_string()));
            }
            Ok(())
        }

        fn on_cancelled(&self, _document: &Document) {
            self.log.borrow_mut().push(format!("{}:cancelled", self.name));
        }
    }

    #[test]
    fn test_validator_dispatch() {
        let fx = fixture();
        let (mut doc, _, nodes) = fx.scene(&["a"]);
        let log = Rc::new(RefCell::new(Vec::new()));

        let mut manager = ValidatorManager::new();
        manager.register(Box::new(TestValidator {
            name: "test1".to_string(),
            log: log.clone(),
            reject: false,
        }));
        manager.register(Box::new(TestValidator {
            name: "test2".to_string(),
            log: log.clone(),
            reject: false,
        }));
        assert_eq!(manager.len(), 2);
        manager.attach(&mut doc);

        doc.do_transaction("Rename", |doc| doc.set_attribute(nodes[0], &fx.name, "b"))
            .unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                "test1:AttributeChanging",
                "test2:AttributeChanging",
                "test1:AttributeChanged",
                "test2:AttributeChanged",
                "test1:ending",
                "test2:ending",
            ]
        );
    }

    #[test]
    fn test_rejecting_validator_cancels_transaction() {
        let fx = fixture();
        let (mut doc, _, nodes) = fx.scene(&["a"]);
        let log = Rc::new(RefCell::new(Vec::new()));

        let mut manager = ValidatorManager::new();
        manager.register(Box::new(TestValidator {
            name: "strict".to_string(),
            log: log.clone(),
            reject: true,
        }));
        manager.attach(&mut doc);

        let result = doc.do_transaction("Rename", |doc| doc.set_attribute(nodes[0], &fx.name, "b"));
        assert!(matches!(result, Err(DomError::Transaction(_))));
        assert_eq!(doc.get_id(nodes[0]).as_deref(), Some("a"));
        assert!(!doc.can_undo());
        assert_eq!(log.borrow().last().map(String::as_str), Some("strict:cancelled"));
    }
}
