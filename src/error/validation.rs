use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

/// Field-level validation errors, surfaced inline to the submitting form
/// (HTTP 400) rather than as a redirect.
#[derive(Debug, Clone, Default, Serialize, ThisError)]
#[error("Submission failed validation")]
pub struct FieldErrors {
    /// Errors not attributable to a single field (e.g. "Invalid username or
    /// password").
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub form: Vec<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, message: impl Into<String>) -> Self {
        self.fields
            .entry(name.to_string())
            .or_default()
            .push(message.into());
        self
    }

    pub fn form(mut self, message: impl Into<String>) -> Self {
        self.form.push(message.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.form.is_empty() && self.fields.is_empty()
    }

    /// Convenience for the common single-field rejection.
    pub fn single(name: &str, message: impl Into<String>) -> Self {
        Self::new().field(name, message)
    }
}
