//! Data models for the wellness platform

mod appointment;
mod client;

pub use appointment::{Appointment, AppointmentId, AppointmentStatus, ParseStatusError};
pub use client::{Client, ClientId};

use serde::Serialize;

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    /// Field the violation applies to; `base` for record-level failures
    pub field: String,
    /// Human-readable message, e.g. "can't be blank"
    pub message: String,
}

impl FieldViolation {
    /// Create a new violation for the given field
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Render as `"field message"`; `base` violations carry no field prefix
    #[must_use]
    pub fn full_message(&self) -> String {
        if self.field == "base" {
            self.message.clone()
        } else {
            format!("{} {}", self.field, self.message)
        }
    }
}
