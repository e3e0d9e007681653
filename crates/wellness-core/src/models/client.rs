//! Client model

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::FieldViolation;
use crate::error::{Error, Result};

/// A unique identifier for a client, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Create a new unique client ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ClientId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A clinic client tracked locally and mirrored in the external scheduling
/// system via their `external_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    /// Unique identifier
    pub id: ClientId,
    /// Identifier in the external scheduling system
    pub external_id: String,
    /// Full name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Contact phone number
    pub phone: String,
    /// Free-form notes
    pub notes: Option<String>,
    /// Inactive clients are hidden from listings but kept for history
    pub active: bool,
    /// When the last successful outbound push completed
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Opaque copy of the most recent remote payload
    pub external_data: Map<String, Value>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// Create a new active client with the given contact details
    #[must_use]
    pub fn new(
        external_id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ClientId::new(),
            external_id: external_id.into(),
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
            notes: None,
            active: true,
            last_synced_at: None,
            external_data: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Check every field-level rule, collecting all violations at once
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();

        if self.external_id.trim().is_empty() {
            violations.push(FieldViolation::new("external_id", "can't be blank"));
        }
        if self.name.trim().is_empty() {
            violations.push(FieldViolation::new("name", "can't be blank"));
        }
        if self.email.trim().is_empty() {
            violations.push(FieldViolation::new("email", "can't be blank"));
        } else if !is_valid_email(&self.email) {
            violations.push(FieldViolation::new("email", "is invalid"));
        }
        if self.phone.trim().is_empty() {
            violations.push(FieldViolation::new("phone", "can't be blank"));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(violations))
        }
    }

    /// Whether this client carries enough identity to be pushed to the
    /// external scheduling system (external id, name, and email)
    #[must_use]
    pub fn valid_for_remote_sync(&self) -> bool {
        !self.external_id.trim().is_empty()
            && !self.name.trim().is_empty()
            && !self.email.trim().is_empty()
    }
}

/// Loose email shape check: one `@`, something on both sides, a dot in the
/// domain, no whitespace
fn is_valid_email(value: &str) -> bool {
    let re = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid regex");
    re.is_match(value.trim())
}
