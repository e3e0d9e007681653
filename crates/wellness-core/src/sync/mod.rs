//! Reconciliation between local storage and the external scheduling system
//!
//! Inbound passes fetch the full remote state and fold it into local rows,
//! one record at a time so a bad record never aborts the batch. Outbound
//! pushes mirror single entities after their local write has committed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::db::{
    AppointmentRepository, ClientRepository, Database, SqliteAppointmentRepository,
    SqliteClientRepository,
};
use crate::models::{Appointment, AppointmentId, AppointmentStatus, Client, ClientId};
use crate::remote::{
    AppointmentCreatePayload, AppointmentPushPayload, ClientPushPayload, RecordMapError,
    RemoteAppointmentRecord, RemoteClientRecord, RemoteError, SchedulingApiClient,
};

/// Result type for sync operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Errors raised at the sync boundary
#[derive(Debug, Error)]
pub enum SyncError {
    /// The referenced client has no local row
    #[error("Client not found: {0}")]
    ClientNotFound(String),

    /// The entity fails its outbound push guard
    #[error("Not eligible for sync: {0}")]
    NotEligible(String),

    /// A remote record couldn't be mapped
    #[error("Record mapping failed: {0}")]
    Map(#[from] RecordMapError),

    /// The scheduling API call failed
    #[error("{0}")]
    Remote(#[from] RemoteError),

    /// Local validation or storage failed
    #[error("{0}")]
    Core(#[from] crate::Error),
}

/// Counts from one inbound reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// Records the remote returned
    pub seen: usize,
    /// Records inserted or updated locally
    pub applied: usize,
    /// Records already up to date, or without a local owner
    pub skipped: usize,
    /// Records rejected by mapping, validation, or storage
    pub failed: usize,
}

/// A deferred outbound push, produced once a local write has committed
#[must_use = "a push intent does nothing until dispatched"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushIntent {
    /// Mirror one client
    Client(ClientId),
    /// Mirror one appointment
    Appointment(AppointmentId),
}

/// Input for first-time appointment creation
#[derive(Debug, Clone)]
pub struct NewAppointment {
    /// External id of the owning client
    pub client_external_id: String,
    /// Slot start
    pub start_time: DateTime<Utc>,
    /// Slot end
    pub end_time: DateTime<Utc>,
    /// Kind of visit, e.g. `consultation`
    pub appointment_type: String,
    /// Free-form notes
    pub notes: Option<String>,
}

/// Drives reconciliation in both directions
#[derive(Clone)]
pub struct SyncEngine {
    db: Arc<Mutex<Database>>,
    remote: SchedulingApiClient,
}

/// What happened to one inbound record
enum RecordOutcome {
    Applied,
    Skipped,
}

impl SyncEngine {
    /// Create an engine over shared storage and a scheduling API client
    pub const fn new(db: Arc<Mutex<Database>>, remote: SchedulingApiClient) -> Self {
        Self { db, remote }
    }

    /// Pull every remote client and fold it into local storage
    ///
    /// A fetch failure aborts the pass; a bad record only fails itself.
    pub async fn sync_all_clients(&self) -> SyncResult<SyncSummary> {
        let raw_records = self.remote.fetch_all_clients().await?;
        let now = Utc::now();
        let mut summary = SyncSummary {
            seen: raw_records.len(),
            ..SyncSummary::default()
        };

        let db = self.db.lock().await;
        let clients = SqliteClientRepository::new(db.connection());
        for raw in &raw_records {
            match apply_client_record(&clients, raw, now) {
                Ok(RecordOutcome::Applied) => summary.applied += 1,
                Ok(RecordOutcome::Skipped) => summary.skipped += 1,
                Err(error) => {
                    summary.failed += 1;
                    tracing::warn!("Skipping client record: {error}");
                }
            }
        }

        Ok(summary)
    }

    /// Pull every remote appointment and fold it into local storage
    ///
    /// Appointments whose owning client is unknown locally are skipped, not
    /// failed; clients are expected to arrive through their own pass first.
    pub async fn sync_all_appointments(&self) -> SyncResult<SyncSummary> {
        let raw_records = self.remote.fetch_all_appointments().await?;
        let now = Utc::now();
        let mut summary = SyncSummary {
            seen: raw_records.len(),
            ..SyncSummary::default()
        };

        let db = self.db.lock().await;
        let clients = SqliteClientRepository::new(db.connection());
        let appointments = SqliteAppointmentRepository::new(db.connection());
        for raw in &raw_records {
            match apply_appointment_record(&clients, &appointments, raw, now) {
                Ok(RecordOutcome::Applied) => summary.applied += 1,
                Ok(RecordOutcome::Skipped) => summary.skipped += 1,
                Err(error) => {
                    summary.failed += 1;
                    tracing::warn!("Skipping appointment record: {error}");
                }
            }
        }

        Ok(summary)
    }

    /// Mirror one client to the scheduling system
    ///
    /// On success the client's `last_synced_at` is stamped; on failure local
    /// state is left untouched.
    pub async fn push_client(&self, client: &Client) -> SyncResult<()> {
        if !client.valid_for_remote_sync() {
            return Err(SyncError::NotEligible(format!(
                "client {} is missing required contact fields",
                client.id
            )));
        }

        let payload = ClientPushPayload {
            external_id: client.external_id.clone(),
            name: client.name.clone(),
            email: client.email.clone(),
            phone: client.phone.clone(),
            notes: client.notes.clone(),
            active: client.active,
        };
        self.remote
            .upsert_client(&client.external_id, &payload)
            .await?;

        let db = self.db.lock().await;
        SqliteClientRepository::new(db.connection()).mark_synced(&client.id, Utc::now())?;
        Ok(())
    }

    /// Mirror one appointment to the scheduling system
    ///
    /// The owning client must exist locally to supply its external id.
    pub async fn push_appointment(&self, appointment: &Appointment) -> SyncResult<()> {
        appointment
            .validate()
            .map_err(|error| SyncError::NotEligible(error.to_string()))?;

        let client = {
            let db = self.db.lock().await;
            SqliteClientRepository::new(db.connection()).get(&appointment.client_id)?
        };
        let Some(client) = client else {
            return Err(SyncError::ClientNotFound(appointment.client_id.to_string()));
        };

        let payload = AppointmentPushPayload {
            external_id: appointment.external_id.clone(),
            client_external_id: client.external_id,
            start_time: appointment.start_time,
            end_time: appointment.end_time,
            status: appointment.status,
            appointment_type: appointment.appointment_type.clone(),
            notes: appointment.notes.clone(),
        };
        self.remote
            .upsert_appointment(&appointment.external_id, &payload)
            .await?;

        let db = self.db.lock().await;
        SqliteAppointmentRepository::new(db.connection()).mark_synced(&appointment.id, Utc::now())?;
        Ok(())
    }

    /// Book a new appointment, remote side first
    ///
    /// The remote assigns the external id (or a degraded-mode placeholder
    /// when unreachable); only then is the local row created, as `scheduled`.
    pub async fn create_appointment(&self, new: NewAppointment) -> SyncResult<Appointment> {
        let client = {
            let db = self.db.lock().await;
            SqliteClientRepository::new(db.connection())
                .find_by_external_id(&new.client_external_id)?
        };
        let Some(client) = client else {
            return Err(SyncError::ClientNotFound(new.client_external_id));
        };

        let payload = AppointmentCreatePayload {
            client_external_id: client.external_id,
            start_time: new.start_time,
            end_time: new.end_time,
            appointment_type: new.appointment_type.clone(),
            notes: new.notes.clone(),
        };
        let external_id = self.remote.create_appointment(&payload).await?;

        let mut appointment = Appointment::new(
            external_id,
            client.id,
            new.start_time,
            new.end_time,
            new.appointment_type,
        );
        appointment.notes = new.notes;
        appointment.validate()?;

        let db = self.db.lock().await;
        SqliteAppointmentRepository::new(db.connection()).insert(&appointment)?;
        Ok(appointment)
    }

    /// Change an appointment's lifecycle status
    ///
    /// The write commits locally before any network traffic; the returned
    /// intent carries the follow-up push for the caller to dispatch.
    pub async fn transition_appointment(
        &self,
        id: &AppointmentId,
        status: AppointmentStatus,
    ) -> SyncResult<(Appointment, PushIntent)> {
        let db = self.db.lock().await;
        let appointment = SqliteAppointmentRepository::new(db.connection()).set_status(id, status)?;
        drop(db);

        Ok((appointment, PushIntent::Appointment(*id)))
    }

    /// Load the intent's entity fresh and push it
    pub async fn dispatch(&self, intent: PushIntent) -> SyncResult<()> {
        match intent {
            PushIntent::Client(id) => {
                let client = {
                    let db = self.db.lock().await;
                    SqliteClientRepository::new(db.connection()).get(&id)?
                };
                let Some(client) = client else {
                    return Err(SyncError::ClientNotFound(id.to_string()));
                };
                self.push_client(&client).await
            }
            PushIntent::Appointment(id) => {
                let appointment = {
                    let db = self.db.lock().await;
                    SqliteAppointmentRepository::new(db.connection()).get(&id)?
                };
                let Some(appointment) = appointment else {
                    return Err(SyncError::Core(crate::Error::NotFound(format!(
                        "appointment {id}"
                    ))));
                };
                self.push_appointment(&appointment).await
            }
        }
    }
}

/// Fold one raw remote client into local storage
fn apply_client_record(
    clients: &SqliteClientRepository<'_>,
    raw: &Value,
    now: DateTime<Utc>,
) -> SyncResult<RecordOutcome> {
    let record = RemoteClientRecord::from_value(raw)?;
    let payload = raw.as_object().cloned().unwrap_or_default();

    match clients.find_by_external_id(&record.external_id)? {
        None => {
            let mut client = Client::new(record.external_id, record.name, record.email, record.phone);
            client.notes = record.notes;
            client.active = record.active;
            client.external_data = payload;
            client.last_synced_at = Some(now);
            client.validate()?;
            clients.insert(&client)?;
            Ok(RecordOutcome::Applied)
        }
        Some(mut existing) => {
            let unchanged = existing.name == record.name
                && existing.email == record.email
                && existing.phone == record.phone
                && existing.notes == record.notes
                && existing.active == record.active;
            if unchanged {
                return Ok(RecordOutcome::Skipped);
            }

            existing.name = record.name;
            existing.email = record.email;
            existing.phone = record.phone;
            existing.notes = record.notes;
            existing.active = record.active;
            existing.external_data = payload;
            existing.last_synced_at = Some(now);
            existing.updated_at = now;
            existing.validate()?;
            clients.update(&existing)?;
            Ok(RecordOutcome::Applied)
        }
    }
}

/// Fold one raw remote appointment into local storage
fn apply_appointment_record(
    clients: &SqliteClientRepository<'_>,
    appointments: &SqliteAppointmentRepository<'_>,
    raw: &Value,
    now: DateTime<Utc>,
) -> SyncResult<RecordOutcome> {
    let record = RemoteAppointmentRecord::from_value(raw)?;
    let payload = raw.as_object().cloned().unwrap_or_default();

    let Some(client) = clients.find_by_external_id(&record.client_external_id)? else {
        tracing::debug!(
            "Skipping appointment {}: no local client with external id {}",
            record.external_id,
            record.client_external_id
        );
        return Ok(RecordOutcome::Skipped);
    };

    match appointments.find_by_external_id(&record.external_id)? {
        None => {
            let mut appointment = Appointment::new(
                record.external_id,
                client.id,
                record.start_time,
                record.end_time,
                record.appointment_type,
            );
            appointment.status = record.status;
            appointment.notes = record.notes;
            appointment.external_data = payload;
            appointment.last_synced_at = Some(now);
            appointment.validate()?;
            appointments.insert(&appointment)?;
            Ok(RecordOutcome::Applied)
        }
        Some(mut existing) => {
            // Storage keeps millisecond precision, so compare times at that
            // granularity or every re-sync would look like a change
            let unchanged = existing.client_id == client.id
                && existing.start_time.timestamp_millis() == record.start_time.timestamp_millis()
                && existing.end_time.timestamp_millis() == record.end_time.timestamp_millis()
                && existing.status == record.status
                && existing.appointment_type == record.appointment_type
                && existing.notes == record.notes;
            if unchanged {
                return Ok(RecordOutcome::Skipped);
            }

            existing.client_id = client.id;
            existing.start_time = record.start_time;
            existing.end_time = record.end_time;
            existing.status = record.status;
            existing.appointment_type = record.appointment_type;
            existing.notes = record.notes;
            existing.external_data = payload;
            existing.last_synced_at = Some(now);
            existing.updated_at = now;
            existing.validate()?;
            appointments.update(&existing)?;
            Ok(RecordOutcome::Applied)
        }
    }
}
