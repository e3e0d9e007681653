//! Demo seed data for local development

use chrono::{DateTime, Duration, NaiveTime, Utc};
use rusqlite::Connection;

use super::{
    AppointmentRepository, ClientRepository, SqliteAppointmentRepository, SqliteClientRepository,
};
use crate::error::Result;
use crate::models::{Appointment, AppointmentStatus, Client};

/// Insert a small demo roster, keyed by external id so re-runs are no-ops
///
/// Returns the number of records actually inserted.
pub fn seed_demo_data(conn: &Connection) -> Result<usize> {
    let clients = SqliteClientRepository::new(conn);
    let appointments = SqliteAppointmentRepository::new(conn);
    let mut inserted = 0;

    let roster = [
        ("client_001", "John Smith", "john.smith@example.com", "555-0101"),
        ("client_002", "Sarah Johnson", "sarah.johnson@example.com", "555-0102"),
        ("client_003", "Michael Brown", "michael.brown@example.com", "555-0103"),
        ("client_004", "Emily Davis", "emily.davis@example.com", "555-0104"),
        ("client_005", "David Wilson", "david.wilson@example.com", "555-0105"),
    ];

    for (external_id, name, email, phone) in roster {
        if clients.find_by_external_id(external_id)?.is_none() {
            clients.insert(&Client::new(external_id, name, email, phone))?;
            inserted += 1;
        }
    }

    let slots = [
        ("apt_001", "client_001", 1_i64, 9_u32, "consultation", AppointmentStatus::Confirmed),
        ("apt_002", "client_002", 1, 14, "checkup", AppointmentStatus::Scheduled),
        ("apt_003", "client_003", 2, 10, "consultation", AppointmentStatus::Scheduled),
        ("apt_004", "client_004", 3, 11, "therapy", AppointmentStatus::Scheduled),
        ("apt_005", "client_005", 7, 15, "consultation", AppointmentStatus::Scheduled),
    ];

    for (external_id, client_external_id, days_ahead, hour, kind, status) in slots {
        if appointments.find_by_external_id(external_id)?.is_some() {
            continue;
        }
        let Some(client) = clients.find_by_external_id(client_external_id)? else {
            continue;
        };

        let start = upcoming_slot(days_ahead, hour);
        let mut appointment = Appointment::new(
            external_id,
            client.id,
            start,
            start + Duration::hours(1),
            kind,
        );
        appointment.status = status;
        appointments.insert(&appointment)?;
        inserted += 1;
    }

    Ok(inserted)
}

/// A slot `days_ahead` days from now starting at the given hour (UTC)
fn upcoming_slot(days_ahead: i64, hour: u32) -> DateTime<Utc> {
    let date = (Utc::now() + Duration::days(days_ahead)).date_naive();
    let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    date.and_time(time).and_utc()
}
