//! Error types for wellness-core

use thiserror::Error;

use crate::models::FieldViolation;

/// Result type alias using wellness-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in wellness-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// One or more model fields failed validation
    #[error("Validation failed: {}", join_messages(.0))]
    Validation(Vec<FieldViolation>),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a validation error from a single violation
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldViolation::new(field, message)])
    }

    /// The violations carried by a `Validation` error, if any
    #[must_use]
    pub fn violations(&self) -> &[FieldViolation] {
        match self {
            Self::Validation(violations) => violations,
            _ => &[],
        }
    }
}

/// Join violation messages into a single human-readable string
#[must_use]
pub fn join_messages(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(FieldViolation::full_message)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_joins_violations() {
        let error = Error::Validation(vec![
            FieldViolation::new("name", "can't be blank"),
            FieldViolation::new("email", "is invalid"),
        ]);
        assert_eq!(
            error.to_string(),
            "Validation failed: name can't be blank, email is invalid"
        );
    }

    #[test]
    fn test_base_violation_has_no_field_prefix() {
        let error = Error::validation("base", "overlaps with another appointment");
        assert_eq!(
            error.to_string(),
            "Validation failed: overlaps with another appointment"
        );
    }

    #[test]
    fn test_violations_accessor() {
        let error = Error::validation("phone", "can't be blank");
        assert_eq!(error.violations().len(), 1);
        assert!(Error::NotFound("x".into()).violations().is_empty());
    }
}
