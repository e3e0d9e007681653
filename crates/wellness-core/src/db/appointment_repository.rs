//! Appointment repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::Value;

use super::{from_millis, from_optional_millis, to_millis};
use crate::error::{Error, Result};
use crate::models::{Appointment, AppointmentId, AppointmentStatus, ClientId, FieldViolation};

/// Narrowing criteria for appointment listings
#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    /// Exact status match
    pub status: Option<AppointmentStatus>,
    /// Slots starting at or after this instant
    pub starts_on_or_after: Option<DateTime<Utc>>,
    /// Slots ending at or before this instant
    pub ends_on_or_before: Option<DateTime<Utc>>,
    /// Owned by this client
    pub client_id: Option<ClientId>,
    /// Exact appointment type match
    pub appointment_type: Option<String>,
}

/// Trait for appointment storage operations
pub trait AppointmentRepository {
    /// Insert a new appointment
    ///
    /// Rejects duplicate external ids and slots that overlap an existing
    /// appointment for the same client. Overlap is enforced here only;
    /// updates may move a slot freely.
    fn insert(&self, appointment: &Appointment) -> Result<()>;

    /// Overwrite an existing appointment row
    fn update(&self, appointment: &Appointment) -> Result<()>;

    /// Get an appointment by ID
    fn get(&self, id: &AppointmentId) -> Result<Option<Appointment>>;

    /// Look up an appointment by its external scheduling-system id
    fn find_by_external_id(&self, external_id: &str) -> Result<Option<Appointment>>;

    /// List appointments matching the filter, earliest first
    fn list(
        &self,
        filter: &AppointmentFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Appointment>>;

    /// Count appointments matching the filter
    fn count(&self, filter: &AppointmentFilter) -> Result<usize>;

    /// All appointments for one client, earliest first
    fn list_for_client(&self, client_id: &ClientId) -> Result<Vec<Appointment>>;

    /// Number of appointments for one client
    fn count_for_client(&self, client_id: &ClientId) -> Result<usize>;

    /// Change the lifecycle status, returning the updated row
    fn set_status(&self, id: &AppointmentId, status: AppointmentStatus) -> Result<Appointment>;

    /// Record a successful outbound push at the given instant
    fn mark_synced(&self, id: &AppointmentId, at: DateTime<Utc>) -> Result<()>;

    /// Delete an appointment
    fn delete(&self, id: &AppointmentId) -> Result<()>;
}

/// `SQLite` implementation of `AppointmentRepository`
pub struct SqliteAppointmentRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteAppointmentRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Half-open interval check: slots sharing only an endpoint don't clash.
    /// Status is deliberately ignored, so cancelled slots still block.
    fn has_overlap(&self, candidate: &Appointment) -> Result<bool> {
        let overlapping = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM appointments
                 WHERE client_id = ?1
                   AND id != ?2
                   AND start_time < ?3
                   AND end_time > ?4
             )",
            params![
                candidate.client_id.as_str(),
                candidate.id.as_str(),
                to_millis(candidate.end_time),
                to_millis(candidate.start_time),
            ],
            |row| row.get::<_, i64>(0).map(|v| v != 0),
        )?;

        Ok(overlapping)
    }

    /// Parse an appointment from a database row
    fn parse_appointment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Appointment> {
        let id: String = row.get(0)?;
        let client_id: String = row.get(2)?;
        let status: String = row.get(5)?;
        let external_data: Value = row.get(9)?;
        Ok(Appointment {
            id: id.parse().unwrap_or_default(),
            external_id: row.get(1)?,
            client_id: client_id.parse().unwrap_or_default(),
            start_time: from_millis(row.get(3)?),
            end_time: from_millis(row.get(4)?),
            status: status.parse().unwrap_or(AppointmentStatus::Scheduled),
            appointment_type: row.get(6)?,
            notes: row.get(7)?,
            last_synced_at: from_optional_millis(row.get(8)?),
            external_data: match external_data {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
            created_at: from_millis(row.get(10)?),
            updated_at: from_millis(row.get(11)?),
        })
    }
}

/// Build the WHERE clause and bound values for a filter
fn filter_sql(filter: &AppointmentFilter) -> (String, Vec<SqlValue>) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();

    if let Some(status) = filter.status {
        clauses.push("status = ?");
        values.push(SqlValue::Text(status.as_str().to_string()));
    }
    if let Some(from) = filter.starts_on_or_after {
        clauses.push("start_time >= ?");
        values.push(SqlValue::Integer(to_millis(from)));
    }
    if let Some(until) = filter.ends_on_or_before {
        clauses.push("end_time <= ?");
        values.push(SqlValue::Integer(to_millis(until)));
    }
    if let Some(client_id) = filter.client_id {
        clauses.push("client_id = ?");
        values.push(SqlValue::Text(client_id.as_str()));
    }
    if let Some(kind) = &filter.appointment_type {
        clauses.push("appointment_type = ?");
        values.push(SqlValue::Text(kind.clone()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    (where_sql, values)
}

impl AppointmentRepository for SqliteAppointmentRepository<'_> {
    fn insert(&self, appointment: &Appointment) -> Result<()> {
        if self
            .find_by_external_id(&appointment.external_id)?
            .is_some()
        {
            return Err(Error::Validation(vec![FieldViolation::new(
                "external_id",
                "has already been taken",
            )]));
        }

        if self.has_overlap(appointment)? {
            return Err(Error::Validation(vec![FieldViolation::new(
                "base",
                "Appointment overlaps with existing appointment for this client",
            )]));
        }

        self.conn.execute(
            "INSERT INTO appointments (id, external_id, client_id, start_time, end_time, status,
                                       appointment_type, notes, last_synced_at, external_data,
                                       created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                appointment.id.as_str(),
                appointment.external_id,
                appointment.client_id.as_str(),
                to_millis(appointment.start_time),
                to_millis(appointment.end_time),
                appointment.status.as_str(),
                appointment.appointment_type,
                appointment.notes,
                appointment.last_synced_at.map(to_millis),
                Value::Object(appointment.external_data.clone()),
                to_millis(appointment.created_at),
                to_millis(appointment.updated_at),
            ],
        )?;

        Ok(())
    }

    fn update(&self, appointment: &Appointment) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE appointments
             SET external_id = ?, client_id = ?, start_time = ?, end_time = ?, status = ?,
                 appointment_type = ?, notes = ?, last_synced_at = ?, external_data = ?,
                 updated_at = ?
             WHERE id = ?",
            params![
                appointment.external_id,
                appointment.client_id.as_str(),
                to_millis(appointment.start_time),
                to_millis(appointment.end_time),
                appointment.status.as_str(),
                appointment.appointment_type,
                appointment.notes,
                appointment.last_synced_at.map(to_millis),
                Value::Object(appointment.external_data.clone()),
                to_millis(appointment.updated_at),
                appointment.id.as_str(),
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("appointment {}", appointment.id)));
        }

        Ok(())
    }

    fn get(&self, id: &AppointmentId) -> Result<Option<Appointment>> {
        let result = self.conn.query_row(
            "SELECT id, external_id, client_id, start_time, end_time, status, appointment_type,
                    notes, last_synced_at, external_data, created_at, updated_at
             FROM appointments WHERE id = ?",
            params![id.as_str()],
            Self::parse_appointment,
        );

        match result {
            Ok(appointment) => Ok(Some(appointment)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn find_by_external_id(&self, external_id: &str) -> Result<Option<Appointment>> {
        let result = self.conn.query_row(
            "SELECT id, external_id, client_id, start_time, end_time, status, appointment_type,
                    notes, last_synced_at, external_data, created_at, updated_at
             FROM appointments WHERE external_id = ?",
            params![external_id],
            Self::parse_appointment,
        );

        match result {
            Ok(appointment) => Ok(Some(appointment)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(
        &self,
        filter: &AppointmentFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Appointment>> {
        let (where_sql, mut values) = filter_sql(filter);
        let sql = format!(
            "SELECT id, external_id, client_id, start_time, end_time, status, appointment_type,
                    notes, last_synced_at, external_data, created_at, updated_at
             FROM appointments{where_sql}
             ORDER BY start_time ASC
             LIMIT ? OFFSET ?"
        );
        values.push(SqlValue::Integer(limit as i64));
        values.push(SqlValue::Integer(offset as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let appointments = stmt
            .query_map(params_from_iter(values), Self::parse_appointment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(appointments)
    }

    fn count(&self, filter: &AppointmentFilter) -> Result<usize> {
        let (where_sql, values) = filter_sql(filter);
        let sql = format!("SELECT COUNT(*) FROM appointments{where_sql}");

        let count = self
            .conn
            .query_row(&sql, params_from_iter(values), |row| {
                row.get::<_, usize>(0)
            })?;

        Ok(count)
    }

    fn list_for_client(&self, client_id: &ClientId) -> Result<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, external_id, client_id, start_time, end_time, status, appointment_type,
                    notes, last_synced_at, external_data, created_at, updated_at
             FROM appointments
             WHERE client_id = ?
             ORDER BY start_time ASC",
        )?;

        let appointments = stmt
            .query_map(params![client_id.as_str()], Self::parse_appointment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(appointments)
    }

    fn count_for_client(&self, client_id: &ClientId) -> Result<usize> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM appointments WHERE client_id = ?",
            params![client_id.as_str()],
            |row| row.get::<_, usize>(0),
        )?;

        Ok(count)
    }

    fn set_status(&self, id: &AppointmentId, status: AppointmentStatus) -> Result<Appointment> {
        let rows = self.conn.execute(
            "UPDATE appointments SET status = ?, updated_at = ? WHERE id = ?",
            params![
                status.as_str(),
                to_millis(Utc::now()),
                id.as_str()
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("appointment {id}")));
        }

        self.get(id)?
            .ok_or_else(|| Error::NotFound(format!("appointment {id}")))
    }

    fn mark_synced(&self, id: &AppointmentId, at: DateTime<Utc>) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE appointments SET last_synced_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![to_millis(at), id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("appointment {id}")));
        }

        Ok(())
    }

    fn delete(&self, id: &AppointmentId) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM appointments WHERE id = ?", params![id.as_str()])?;

        if rows == 0 {
            return Err(Error::NotFound(format!("appointment {id}")));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ClientRepository, Database, SqliteClientRepository};
    use crate::models::Client;
    use chrono::TimeZone;

    fn setup() -> (Database, ClientId) {
        let db = Database::open_in_memory().unwrap();
        let client = Client::new("client_001", "John Smith", "john@example.com", "555-0101");
        SqliteClientRepository::new(db.connection())
            .insert(&client)
            .unwrap();
        (db, client.id)
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, day, hour, 0, 0).unwrap()
    }

    fn slot(n: u32, client_id: ClientId, start: DateTime<Utc>, hours: i64) -> Appointment {
        Appointment::new(
            format!("apt_{n:03}"),
            client_id,
            start,
            start + chrono::Duration::hours(hours),
            "consultation",
        )
    }

    #[test]
    fn test_insert_and_get() {
        let (db, client_id) = setup();
        let repo = SqliteAppointmentRepository::new(db.connection());

        let mut appointment = slot(1, client_id, at(1, 10), 1);
        appointment.notes = Some("First visit".to_string());
        appointment
            .external_data
            .insert("room".to_string(), Value::String("2B".to_string()));
        repo.insert(&appointment).unwrap();

        let fetched = repo.get(&appointment.id).unwrap().unwrap();
        assert_eq!(fetched.id, appointment.id);
        assert_eq!(fetched.client_id, client_id);
        assert_eq!(fetched.status, AppointmentStatus::Scheduled);
        assert_eq!(fetched.start_time, at(1, 10));
        assert_eq!(fetched.notes, Some("First visit".to_string()));
        assert_eq!(fetched.external_data, appointment.external_data);
    }

    #[test]
    fn test_duplicate_external_id_rejected() {
        let (db, client_id) = setup();
        let repo = SqliteAppointmentRepository::new(db.connection());

        repo.insert(&slot(1, client_id, at(1, 10), 1)).unwrap();

        let mut duplicate = slot(2, client_id, at(2, 10), 1);
        duplicate.external_id = "apt_001".to_string();
        let error = repo.insert(&duplicate).unwrap_err();
        assert!(error.to_string().contains("has already been taken"));
    }

    #[test]
    fn test_insert_rejects_overlap() {
        let (db, client_id) = setup();
        let repo = SqliteAppointmentRepository::new(db.connection());

        repo.insert(&slot(1, client_id, at(1, 10), 1)).unwrap();

        // 10:30-11:30 clashes with 10:00-11:00
        let clashing = slot(2, client_id, at(1, 10) + chrono::Duration::minutes(30), 1);
        let error = repo.insert(&clashing).unwrap_err();
        assert!(error.to_string().contains("overlaps"));
        assert!(repo.get(&clashing.id).unwrap().is_none());
    }

    #[test]
    fn test_touching_slots_do_not_overlap() {
        let (db, client_id) = setup();
        let repo = SqliteAppointmentRepository::new(db.connection());

        repo.insert(&slot(1, client_id, at(1, 10), 1)).unwrap();
        // 11:00-12:00 touches 10:00-11:00 at the endpoint only
        repo.insert(&slot(2, client_id, at(1, 11), 1)).unwrap();

        assert_eq!(repo.count(&AppointmentFilter::default()).unwrap(), 2);
    }

    #[test]
    fn test_overlap_is_scoped_to_client() {
        let (db, client_id) = setup();
        let clients = SqliteClientRepository::new(db.connection());
        let other = Client::new("client_002", "Sarah Johnson", "sarah@example.com", "555-0102");
        clients.insert(&other).unwrap();

        let repo = SqliteAppointmentRepository::new(db.connection());
        repo.insert(&slot(1, client_id, at(1, 10), 1)).unwrap();
        // Same slot, different client
        repo.insert(&slot(2, other.id, at(1, 10), 1)).unwrap();
    }

    #[test]
    fn test_update_may_move_slot_into_overlap() {
        let (db, client_id) = setup();
        let repo = SqliteAppointmentRepository::new(db.connection());

        repo.insert(&slot(1, client_id, at(1, 10), 1)).unwrap();
        let mut second = slot(2, client_id, at(1, 14), 1);
        repo.insert(&second).unwrap();

        // Overlap is a creation-time rule only
        second.start_time = at(1, 10) + chrono::Duration::minutes(30);
        second.end_time = second.start_time + chrono::Duration::hours(1);
        second.updated_at = Utc::now();
        repo.update(&second).unwrap();

        let fetched = repo.get(&second.id).unwrap().unwrap();
        assert_eq!(fetched.start_time, second.start_time);
    }

    #[test]
    fn test_list_orders_by_start_time_and_paginates() {
        let (db, client_id) = setup();
        let repo = SqliteAppointmentRepository::new(db.connection());

        // Insert out of order across several days
        for (n, day) in [(1_u32, 3_u32), (2, 1), (3, 2)] {
            repo.insert(&slot(n, client_id, at(day, 10), 1)).unwrap();
        }

        let all = repo.list(&AppointmentFilter::default(), 10, 0).unwrap();
        let ids: Vec<_> = all.iter().map(|a| a.external_id.as_str()).collect();
        assert_eq!(ids, vec!["apt_002", "apt_003", "apt_001"]);

        let page2 = repo.list(&AppointmentFilter::default(), 2, 2).unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].external_id, "apt_001");
    }

    #[test]
    fn test_filter_by_status() {
        let (db, client_id) = setup();
        let repo = SqliteAppointmentRepository::new(db.connection());

        let first = slot(1, client_id, at(1, 10), 1);
        repo.insert(&first).unwrap();
        repo.insert(&slot(2, client_id, at(2, 10), 1)).unwrap();
        repo.set_status(&first.id, AppointmentStatus::Cancelled)
            .unwrap();

        let filter = AppointmentFilter {
            status: Some(AppointmentStatus::Cancelled),
            ..Default::default()
        };
        let cancelled = repo.list(&filter, 10, 0).unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, first.id);
        assert_eq!(repo.count(&filter).unwrap(), 1);
    }

    #[test]
    fn test_filter_by_date_range() {
        let (db, client_id) = setup();
        let repo = SqliteAppointmentRepository::new(db.connection());

        for (n, day) in [(1_u32, 1_u32), (2, 3), (3, 5)] {
            repo.insert(&slot(n, client_id, at(day, 10), 1)).unwrap();
        }

        let filter = AppointmentFilter {
            starts_on_or_after: Some(at(3, 0)),
            ..Default::default()
        };
        assert_eq!(repo.list(&filter, 10, 0).unwrap().len(), 2);

        let filter = AppointmentFilter {
            starts_on_or_after: Some(at(3, 0)),
            ends_on_or_before: Some(at(3, 23)),
            ..Default::default()
        };
        let day3 = repo.list(&filter, 10, 0).unwrap();
        assert_eq!(day3.len(), 1);
        assert_eq!(day3[0].external_id, "apt_002");
    }

    #[test]
    fn test_filter_by_client_and_type() {
        let (db, client_id) = setup();
        let clients = SqliteClientRepository::new(db.connection());
        let other = Client::new("client_002", "Sarah Johnson", "sarah@example.com", "555-0102");
        clients.insert(&other).unwrap();

        let repo = SqliteAppointmentRepository::new(db.connection());
        repo.insert(&slot(1, client_id, at(1, 10), 1)).unwrap();
        let mut massage = slot(2, other.id, at(2, 10), 1);
        massage.appointment_type = "massage".to_string();
        repo.insert(&massage).unwrap();

        let filter = AppointmentFilter {
            client_id: Some(other.id),
            ..Default::default()
        };
        assert_eq!(repo.list(&filter, 10, 0).unwrap().len(), 1);

        let filter = AppointmentFilter {
            appointment_type: Some("massage".to_string()),
            ..Default::default()
        };
        let found = repo.list(&filter, 10, 0).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, massage.id);
    }

    #[test]
    fn test_count_is_unaffected_by_pagination() {
        let (db, client_id) = setup();
        let repo = SqliteAppointmentRepository::new(db.connection());

        for n in 1..=5 {
            repo.insert(&slot(n, client_id, at(n, 10), 1)).unwrap();
        }

        assert_eq!(repo.list(&AppointmentFilter::default(), 2, 0).unwrap().len(), 2);
        assert_eq!(repo.count(&AppointmentFilter::default()).unwrap(), 5);
    }

    #[test]
    fn test_list_and_count_for_client() {
        let (db, client_id) = setup();
        let clients = SqliteClientRepository::new(db.connection());
        let other = Client::new("client_002", "Sarah Johnson", "sarah@example.com", "555-0102");
        clients.insert(&other).unwrap();

        let repo = SqliteAppointmentRepository::new(db.connection());
        repo.insert(&slot(1, client_id, at(2, 10), 1)).unwrap();
        repo.insert(&slot(2, client_id, at(1, 10), 1)).unwrap();
        repo.insert(&slot(3, other.id, at(1, 12), 1)).unwrap();

        let mine = repo.list_for_client(&client_id).unwrap();
        assert_eq!(mine.len(), 2);
        // Earliest first
        assert_eq!(mine[0].external_id, "apt_002");
        assert_eq!(repo.count_for_client(&client_id).unwrap(), 2);
        assert_eq!(repo.count_for_client(&other.id).unwrap(), 1);
    }

    #[test]
    fn test_set_status_returns_updated_row() {
        let (db, client_id) = setup();
        let repo = SqliteAppointmentRepository::new(db.connection());

        let appointment = slot(1, client_id, at(1, 10), 1);
        repo.insert(&appointment).unwrap();

        let updated = repo
            .set_status(&appointment.id, AppointmentStatus::Confirmed)
            .unwrap();
        assert_eq!(updated.status, AppointmentStatus::Confirmed);
        assert!(updated.updated_at >= appointment.updated_at);
    }

    #[test]
    fn test_set_status_missing_returns_not_found() {
        let (db, _) = setup();
        let repo = SqliteAppointmentRepository::new(db.connection());
        let error = repo
            .set_status(&AppointmentId::new(), AppointmentStatus::Cancelled)
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[test]
    fn test_mark_synced() {
        let (db, client_id) = setup();
        let repo = SqliteAppointmentRepository::new(db.connection());

        let appointment = slot(1, client_id, at(1, 10), 1);
        repo.insert(&appointment).unwrap();

        let stamp = Utc::now();
        repo.mark_synced(&appointment.id, stamp).unwrap();

        let fetched = repo.get(&appointment.id).unwrap().unwrap();
        assert_eq!(
            fetched.last_synced_at.map(|t| t.timestamp_millis()),
            Some(stamp.timestamp_millis())
        );
    }

    #[test]
    fn test_delete() {
        let (db, client_id) = setup();
        let repo = SqliteAppointmentRepository::new(db.connection());

        let appointment = slot(1, client_id, at(1, 10), 1);
        repo.insert(&appointment).unwrap();
        repo.delete(&appointment.id).unwrap();

        assert!(repo.get(&appointment.id).unwrap().is_none());
        assert!(matches!(
            repo.delete(&appointment.id).unwrap_err(),
            Error::NotFound(_)
        ));
    }
}
