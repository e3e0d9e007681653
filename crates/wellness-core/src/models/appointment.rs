//! Appointment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::{ClientId, FieldViolation};
use crate::error::{Error, Result};

/// A unique identifier for an appointment, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppointmentId(Uuid);

impl AppointmentId {
    /// Create a new unique appointment ID using UUID v7
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

impl Default for AppointmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AppointmentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle state of an appointment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    /// Every status, in lifecycle order
    pub const ALL: [Self; 4] = [
        Self::Scheduled,
        Self::Confirmed,
        Self::Cancelled,
        Self::Completed,
    ];

    /// Lowercase wire/storage representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a status string doesn't name a known status
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown appointment status `{0}`")]
pub struct ParseStatusError(String);

impl FromStr for AppointmentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// A booked time slot for a client, mirrored in the external scheduling
/// system via its `external_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    /// Unique identifier
    pub id: AppointmentId,
    /// Identifier in the external scheduling system
    pub external_id: String,
    /// Owning client
    pub client_id: ClientId,
    /// Slot start (UTC)
    pub start_time: DateTime<Utc>,
    /// Slot end (UTC), exclusive
    pub end_time: DateTime<Utc>,
    /// Lifecycle state
    pub status: AppointmentStatus,
    /// Kind of visit, e.g. "consultation" or "checkup"
    pub appointment_type: String,
    /// Free-form notes
    pub notes: Option<String>,
    /// When the last successful outbound push completed
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Opaque copy of the most recent remote payload
    pub external_data: Map<String, Value>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Create a new scheduled appointment for the given slot
    #[must_use]
    pub fn new(
        external_id: impl Into<String>,
        client_id: ClientId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        appointment_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AppointmentId::new(),
            external_id: external_id.into(),
            client_id,
            start_time,
            end_time,
            status: AppointmentStatus::Scheduled,
            appointment_type: appointment_type.into(),
            notes: None,
            last_synced_at: None,
            external_data: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Check every field-level rule, collecting all violations at once
    ///
    /// Overlap with other appointments is a storage-level rule enforced on
    /// insert, not here.
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();

        if self.external_id.trim().is_empty() {
            violations.push(FieldViolation::new("external_id", "can't be blank"));
        }
        if self.appointment_type.trim().is_empty() {
            violations.push(FieldViolation::new("appointment_type", "can't be blank"));
        }
        if self.end_time <= self.start_time {
            violations.push(FieldViolation::new("end_time", "must be after start time"));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(violations))
        }
    }

    /// Slot length in whole minutes
    #[must_use]
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes().max(0)
    }

    /// Starts in the future, regardless of status
    #[must_use]
    pub fn is_upcoming(&self) -> bool {
        self.start_time > Utc::now()
    }

    /// Already finished
    #[must_use]
    pub fn is_past(&self) -> bool {
        self.end_time < Utc::now()
    }

    /// Starts on the current UTC date
    #[must_use]
    pub fn is_today(&self) -> bool {
        self.start_time.date_naive() == Utc::now().date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn slot(offset_hours: i64, length_hours: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc::now() + Duration::hours(offset_hours);
        (start, start + Duration::hours(length_hours))
    }

    #[test]
    fn test_status_round_trip() {
        for status in AppointmentStatus::ALL {
            let parsed: AppointmentStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_status_rejects_unknown() {
        assert!("pending".parse::<AppointmentStatus>().is_err());
        // Exact lowercase only
        assert!("Scheduled".parse::<AppointmentStatus>().is_err());
    }

    #[test]
    fn test_appointment_new_defaults() {
        let (start, end) = slot(24, 1);
        let appointment = Appointment::new("apt_001", ClientId::new(), start, end, "consultation");
        assert_eq!(appointment.status, AppointmentStatus::Scheduled);
        assert!(appointment.notes.is_none());
        assert!(appointment.last_synced_at.is_none());
        assert!(appointment.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_slot() {
        let (start, end) = slot(24, 1);
        let appointment = Appointment::new("apt_001", ClientId::new(), end, start, "consultation");
        let error = appointment.validate().unwrap_err();
        assert_eq!(
            error.violations()[0].full_message(),
            "end_time must be after start time"
        );
    }

    #[test]
    fn test_validate_rejects_zero_length_slot() {
        let (start, _) = slot(24, 1);
        let appointment = Appointment::new("apt_001", ClientId::new(), start, start, "checkup");
        assert!(appointment.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_type() {
        let (start, end) = slot(24, 1);
        let appointment = Appointment::new("apt_001", ClientId::new(), start, end, "  ");
        let error = appointment.validate().unwrap_err();
        assert_eq!(error.violations()[0].field, "appointment_type");
    }

    #[test]
    fn test_duration_minutes() {
        let (start, end) = slot(24, 2);
        let appointment = Appointment::new("apt_001", ClientId::new(), start, end, "massage");
        assert_eq!(appointment.duration_minutes(), 120);
    }

    #[test]
    fn test_is_upcoming_ignores_status() {
        let (start, end) = slot(24, 1);
        let mut appointment =
            Appointment::new("apt_001", ClientId::new(), start, end, "consultation");
        assert!(appointment.is_upcoming());

        // A cancelled slot in the future still counts as upcoming
        appointment.status = AppointmentStatus::Cancelled;
        assert!(appointment.is_upcoming());
    }

    #[test]
    fn test_is_past() {
        let (start, end) = slot(-3, 1);
        let appointment = Appointment::new("apt_001", ClientId::new(), start, end, "consultation");
        assert!(appointment.is_past());
        assert!(!appointment.is_upcoming());
    }

    #[test]
    fn test_is_today_uses_utc_date() {
        let now = Utc::now();
        let today = Appointment::new(
            "apt_001",
            ClientId::new(),
            now,
            now + Duration::minutes(30),
            "consultation",
        );
        assert!(today.is_today());

        let tomorrow = Appointment::new(
            "apt_002",
            ClientId::new(),
            now + Duration::days(1),
            now + Duration::days(1) + Duration::minutes(30),
            "consultation",
        );
        assert!(!tomorrow.is_today());
    }
}
