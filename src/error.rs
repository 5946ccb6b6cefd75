//! Error types for the forwarding pipeline.
//!
//! Configuration problems are returned as values so that a settings
//! surface can render them. Nothing in here is ever propagated back to the
//! code that logged the event.

use std::fmt;
use thiserror::Error;

/// Errors raised while populating the registries at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("destination '{0}' is already registered")]
    DuplicateDestination(String),

    #[error("no destination registered with slug '{0}'")]
    UnknownDestination(String),
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Name of the settings field (or `alert_rules`).
    pub field: String,
    /// Human-readable message suitable for display next to the field.
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// All validation failures collected during one save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Returns the message for the given field, if it failed.
    pub fn for_field(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Errors returned from the settings save path.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    #[error("settings validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("settings store failure: {0}")]
    Store(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl SettingsError {
    /// The field-level errors, when this is a validation failure.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            SettingsError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Faults raised by a rule predicate. Always degraded to "no match".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("invalid rule configuration: {0}")]
    InvalidConfig(String),

    #[error("rule evaluation failed: {0}")]
    Evaluation(String),
}

/// Errors returned when a delivery cannot be queued.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("delivery queue is closed")]
    Closed,
}
