//! Database layer for the wellness platform

mod appointment_repository;
mod client_repository;
mod connection;
mod migrations;
mod seed;

pub use appointment_repository::{
    AppointmentFilter, AppointmentRepository, SqliteAppointmentRepository,
};
pub use client_repository::{ClientRepository, SqliteClientRepository};
pub use connection::Database;
pub use seed::seed_demo_data;

use chrono::{DateTime, TimeZone, Utc};

/// Timestamps are stored as Unix milliseconds (INTEGER columns)
pub(crate) fn to_millis(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub(crate) fn from_optional_millis(millis: Option<i64>) -> Option<DateTime<Utc>> {
    millis.map(from_millis)
}
