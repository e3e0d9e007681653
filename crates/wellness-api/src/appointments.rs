use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use wellness_core::db::{
    AppointmentFilter, AppointmentRepository, ClientRepository, SqliteAppointmentRepository,
    SqliteClientRepository,
};
use wellness_core::sync::{NewAppointment, PushIntent, SyncError};
use wellness_core::{Appointment, AppointmentId, AppointmentStatus, ClientId};

use crate::error::ApiError;
use crate::routes::{page_params, AppState, Envelope, Pagination};

#[derive(Debug, Serialize)]
pub struct AppointmentView {
    pub id: String,
    pub external_id: String,
    pub client: ClientBrief,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub appointment_type: String,
    pub notes: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub external_data: Map<String, Value>,
    pub duration_minutes: i64,
    pub is_upcoming: bool,
    pub is_past: bool,
    pub is_today: bool,
}

#[derive(Debug, Serialize)]
pub struct ClientBrief {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct AppointmentsPage {
    pub appointments: Vec<AppointmentView>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentBody<T> {
    appointment: T,
}

fn appointment_view(
    clients: &SqliteClientRepository<'_>,
    appointment: Appointment,
) -> Result<AppointmentView, ApiError> {
    let client = clients
        .get(&appointment.client_id)?
        .ok_or_else(|| ApiError::internal("appointment references a missing client"))?;

    let duration_minutes = appointment.duration_minutes();
    let is_upcoming = appointment.is_upcoming();
    let is_past = appointment.is_past();
    let is_today = appointment.is_today();

    Ok(AppointmentView {
        id: appointment.id.as_str(),
        external_id: appointment.external_id,
        client: ClientBrief {
            id: client.id.as_str(),
            name: client.name,
            email: client.email,
        },
        start_time: appointment.start_time,
        end_time: appointment.end_time,
        status: appointment.status,
        appointment_type: appointment.appointment_type,
        notes: appointment.notes,
        last_synced_at: appointment.last_synced_at,
        external_data: appointment.external_data,
        duration_minutes,
        is_upcoming,
        is_past,
        is_today,
    })
}

fn parse_datetime_field(raw: &str, field: &str) -> Result<DateTime<Utc>, ApiError> {
    parse_datetime(raw).ok_or_else(|| ApiError::unprocessable(format!("{field} is invalid")))
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    // Timestamps without an offset are taken as UTC
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

fn invalid_status(raw: &str) -> ApiError {
    ApiError::unprocessable(format!(
        "status must be one of scheduled, confirmed, cancelled, completed; got `{raw}`"
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListAppointmentsQuery {
    status: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    client_id: Option<String>,
    appointment_type: Option<String>,
    page: Option<usize>,
    per_page: Option<usize>,
}

fn build_filter(query: &ListAppointmentsQuery) -> Result<AppointmentFilter, ApiError> {
    let mut filter = AppointmentFilter::default();

    if let Some(raw) = query.status.as_deref() {
        filter.status = Some(raw.parse().map_err(|_| invalid_status(raw))?);
    }
    if let Some(raw) = query.start_date.as_deref() {
        let date = parse_date(raw)
            .ok_or_else(|| ApiError::unprocessable("start_date must be formatted YYYY-MM-DD"))?;
        filter.starts_on_or_after = date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    if let Some(raw) = query.end_date.as_deref() {
        let date = parse_date(raw)
            .ok_or_else(|| ApiError::unprocessable("end_date must be formatted YYYY-MM-DD"))?;
        filter.ends_on_or_before = date
            .and_hms_milli_opt(23, 59, 59, 999)
            .map(|naive| naive.and_utc());
    }
    if let Some(raw) = query.client_id.as_deref() {
        filter.client_id = Some(
            raw.parse::<ClientId>()
                .map_err(|_| ApiError::unprocessable("client_id is invalid"))?,
        );
    }
    filter.appointment_type = query
        .appointment_type
        .clone()
        .filter(|value| !value.trim().is_empty());

    Ok(filter)
}

pub async fn list_appointments(
    State(state): State<AppState>,
    query: Result<Query<ListAppointmentsQuery>, QueryRejection>,
) -> Result<Json<Envelope<AppointmentsPage>>, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let (page, per_page) = page_params(query.page, query.per_page);
    let filter = build_filter(&query)?;

    let db = state.db.lock().await;
    let appointments = SqliteAppointmentRepository::new(db.connection());
    let clients = SqliteClientRepository::new(db.connection());

    let rows = appointments.list(&filter, per_page, (page - 1) * per_page)?;
    // Total counts every appointment regardless of the active filter
    let total = appointments.count(&AppointmentFilter::default())?;
    let views = rows
        .into_iter()
        .map(|appointment| appointment_view(&clients, appointment))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Envelope::data(AppointmentsPage {
        appointments: views,
        pagination: Pagination::new(page, per_page, total),
    }))
}

pub async fn get_appointment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<AppointmentView>>, ApiError> {
    let Ok(id) = id.parse::<AppointmentId>() else {
        return Err(ApiError::not_found("Appointment not found"));
    };

    let db = state.db.lock().await;
    let appointments = SqliteAppointmentRepository::new(db.connection());
    let Some(appointment) = appointments.get(&id)? else {
        return Err(ApiError::not_found("Appointment not found"));
    };

    let view = appointment_view(&SqliteClientRepository::new(db.connection()), appointment)?;
    Ok(Envelope::data(view))
}

#[derive(Debug, Deserialize)]
pub struct CreateAppointment {
    client_external_id: String,
    start_time: String,
    end_time: String,
    appointment_type: String,
    notes: Option<String>,
}

fn map_create_error(error: SyncError) -> ApiError {
    match error {
        SyncError::ClientNotFound(_) => ApiError::not_found("Client not found"),
        SyncError::Remote(remote) => ApiError::unprocessable(format!(
            "Failed to create appointment in external system: {remote}"
        )),
        SyncError::Core(core) => ApiError::from(core),
        other => ApiError::internal(other.to_string()),
    }
}

pub async fn create_appointment(
    State(state): State<AppState>,
    body: Result<Json<AppointmentBody<CreateAppointment>>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<AppointmentView>>), ApiError> {
    let Json(AppointmentBody { appointment: body }) =
        body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    let start_time = parse_datetime_field(&body.start_time, "start_time")?;
    let end_time = parse_datetime_field(&body.end_time, "end_time")?;

    let created = state
        .engine
        .create_appointment(NewAppointment {
            client_external_id: body.client_external_id,
            start_time,
            end_time,
            appointment_type: body.appointment_type,
            notes: body.notes,
        })
        .await
        .map_err(map_create_error)?;

    let view = {
        let db = state.db.lock().await;
        appointment_view(&SqliteClientRepository::new(db.connection()), created)?
    };
    Ok((
        StatusCode::CREATED,
        Envelope::with_message(view, "Appointment created successfully"),
    ))
}

#[derive(Debug, Deserialize)]
pub struct UpdateAppointment {
    start_time: Option<String>,
    end_time: Option<String>,
    appointment_type: Option<String>,
    notes: Option<String>,
    status: Option<String>,
}

pub async fn update_appointment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<AppointmentBody<UpdateAppointment>>, JsonRejection>,
) -> Result<Json<Envelope<AppointmentView>>, ApiError> {
    let Ok(id) = id.parse::<AppointmentId>() else {
        return Err(ApiError::not_found("Appointment not found"));
    };
    let Json(AppointmentBody { appointment: body }) =
        body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    let start_time = body
        .start_time
        .as_deref()
        .map(|raw| parse_datetime_field(raw, "start_time"))
        .transpose()?;
    let end_time = body
        .end_time
        .as_deref()
        .map(|raw| parse_datetime_field(raw, "end_time"))
        .transpose()?;
    let status = body
        .status
        .as_deref()
        .map(|raw| {
            raw.parse::<AppointmentStatus>()
                .map_err(|_| invalid_status(raw))
        })
        .transpose()?;

    let updated = {
        let db = state.db.lock().await;
        let appointments = SqliteAppointmentRepository::new(db.connection());
        let Some(mut appointment) = appointments.get(&id)? else {
            return Err(ApiError::not_found("Appointment not found"));
        };

        if let Some(value) = start_time {
            appointment.start_time = value;
        }
        if let Some(value) = end_time {
            appointment.end_time = value;
        }
        if let Some(value) = body.appointment_type {
            appointment.appointment_type = value;
        }
        if let Some(value) = body.notes {
            appointment.notes = Some(value);
        }
        if let Some(value) = status {
            appointment.status = value;
        }

        appointment.validate()?;
        appointment.updated_at = Utc::now();
        appointments.update(&appointment)?;
        appointment
    };

    // Push after the local commit; a failed push never fails the request
    if let Err(error) = state.engine.dispatch(PushIntent::Appointment(id)).await {
        tracing::warn!("Appointment push after update failed: {error}");
    }

    let view = {
        let db = state.db.lock().await;
        appointment_view(&SqliteClientRepository::new(db.connection()), updated)?
    };
    Ok(Envelope::with_message(view, "Appointment updated successfully"))
}

pub async fn delete_appointment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let Ok(id) = id.parse::<AppointmentId>() else {
        return Err(ApiError::not_found("Appointment not found"));
    };

    let db = state.db.lock().await;
    let appointments = SqliteAppointmentRepository::new(db.connection());
    if appointments.get(&id)?.is_none() {
        return Err(ApiError::not_found("Appointment not found"));
    }
    appointments.delete(&id)?;

    Ok(Envelope::message_only("Appointment deleted successfully"))
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<AppointmentView>>, ApiError> {
    let Ok(id) = id.parse::<AppointmentId>() else {
        return Err(ApiError::not_found("Appointment not found"));
    };

    let (cancelled, intent) = state
        .engine
        .transition_appointment(&id, AppointmentStatus::Cancelled)
        .await
        .map_err(|error| match error {
            SyncError::Core(wellness_core::Error::NotFound(_)) => {
                ApiError::not_found("Appointment not found")
            }
            other => ApiError::internal(other.to_string()),
        })?;

    if let Err(error) = state.engine.dispatch(intent).await {
        tracing::warn!("Appointment push after cancel failed: {error}");
    }

    let view = {
        let db = state.db.lock().await;
        appointment_view(&SqliteClientRepository::new(db.connection()), cancelled)?
    };
    Ok(Envelope::with_message(
        view,
        "Appointment cancelled successfully",
    ))
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::{at, seed_appointment, seed_client, test_state};

    use super::*;

    fn empty_list_query() -> ListAppointmentsQuery {
        ListAppointmentsQuery {
            status: None,
            start_date: None,
            end_date: None,
            client_id: None,
            appointment_type: None,
            page: None,
            per_page: None,
        }
    }

    fn create_body(client_external_id: &str, start: &str, end: &str) -> CreateAppointment {
        CreateAppointment {
            client_external_id: client_external_id.to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            appointment_type: "massage".to_string(),
            notes: None,
        }
    }

    fn empty_update() -> UpdateAppointment {
        UpdateAppointment {
            start_time: None,
            end_time: None,
            appointment_type: None,
            notes: None,
            status: None,
        }
    }

    #[tokio::test]
    async fn list_filters_by_status_but_total_does_not() {
        let state = test_state().await;
        let client = seed_client(&state, 1).await;
        seed_appointment(&state, "apt_001", client.id, at(1, 10), 1).await;
        let second = seed_appointment(&state, "apt_002", client.id, at(2, 10), 1).await;
        {
            let db = state.db.lock().await;
            SqliteAppointmentRepository::new(db.connection())
                .set_status(&second.id, AppointmentStatus::Confirmed)
                .unwrap();
        }

        let mut query = empty_list_query();
        query.status = Some("confirmed".to_string());
        let Json(envelope) = list_appointments(State(state), Ok(Query(query)))
            .await
            .unwrap();
        let page = envelope.data.unwrap();

        assert_eq!(page.appointments.len(), 1);
        assert_eq!(page.appointments[0].external_id, "apt_002");
        assert_eq!(page.pagination.total, 2);
    }

    #[tokio::test]
    async fn list_rejects_unknown_status() {
        let state = test_state().await;
        let mut query = empty_list_query();
        query.status = Some("pending".to_string());

        let error = list_appointments(State(state), Ok(Query(query)))
            .await
            .unwrap_err();
        assert!(
            matches!(error, ApiError::Unprocessable(message) if message.contains("status must be one of"))
        );
    }

    #[tokio::test]
    async fn list_rejects_malformed_client_id() {
        let state = test_state().await;
        let mut query = empty_list_query();
        query.client_id = Some("abc".to_string());

        let error = list_appointments(State(state), Ok(Query(query)))
            .await
            .unwrap_err();
        assert!(
            matches!(error, ApiError::Unprocessable(message) if message == "client_id is invalid")
        );
    }

    #[tokio::test]
    async fn list_narrows_to_a_date_window() {
        let state = test_state().await;
        let client = seed_client(&state, 1).await;
        seed_appointment(&state, "apt_001", client.id, at(1, 10), 1).await;
        seed_appointment(&state, "apt_002", client.id, at(5, 10), 1).await;
        seed_appointment(&state, "apt_003", client.id, at(9, 10), 1).await;

        let mut query = empty_list_query();
        query.start_date = Some("2026-09-04".to_string());
        query.end_date = Some("2026-09-06".to_string());
        let Json(envelope) = list_appointments(State(state), Ok(Query(query)))
            .await
            .unwrap();
        let page = envelope.data.unwrap();

        assert_eq!(page.appointments.len(), 1);
        assert_eq!(page.appointments[0].external_id, "apt_002");
    }

    #[tokio::test]
    async fn get_returns_derived_fields_and_client_brief() {
        let state = test_state().await;
        let client = seed_client(&state, 1).await;
        let start = Utc::now() + chrono::Duration::days(1);
        let appointment = seed_appointment(&state, "apt_001", client.id, start, 1).await;

        let Json(envelope) = get_appointment(State(state), Path(appointment.id.as_str()))
            .await
            .unwrap();
        let view = envelope.data.unwrap();

        assert_eq!(view.duration_minutes, 60);
        assert!(view.is_upcoming);
        assert!(!view.is_past);
        assert_eq!(view.client.email, "client1@example.com");
    }

    #[tokio::test]
    async fn get_missing_appointment_is_not_found() {
        let state = test_state().await;

        let error = get_appointment(State(state.clone()), Path(AppointmentId::new().as_str()))
            .await
            .unwrap_err();
        assert!(
            matches!(error, ApiError::NotFound(message) if message == "Appointment not found")
        );

        let error = get_appointment(State(state), Path("not-a-uuid".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(error, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn create_books_even_when_remote_is_down() {
        let state = test_state().await;
        seed_client(&state, 1).await;

        let (status, Json(envelope)) = create_appointment(
            State(state.clone()),
            Ok(Json(AppointmentBody {
                appointment: create_body(
                    "client_001",
                    "2026-09-01T10:00:00Z",
                    "2026-09-01T11:00:00Z",
                ),
            })),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(
            envelope.message.as_deref(),
            Some("Appointment created successfully")
        );
        let view = envelope.data.unwrap();
        assert!(view.external_id.starts_with("appointment_"));
        assert_eq!(view.status, AppointmentStatus::Scheduled);

        let db = state.db.lock().await;
        let stored = SqliteAppointmentRepository::new(db.connection())
            .find_by_external_id(&view.external_id)
            .unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn create_for_unknown_client_is_not_found() {
        let state = test_state().await;

        let error = create_appointment(
            State(state),
            Ok(Json(AppointmentBody {
                appointment: create_body(
                    "client_999",
                    "2026-09-01T10:00:00Z",
                    "2026-09-01T11:00:00Z",
                ),
            })),
        )
        .await
        .unwrap_err();

        assert!(matches!(error, ApiError::NotFound(message) if message == "Client not found"));
    }

    #[tokio::test]
    async fn create_rejects_malformed_datetime() {
        let state = test_state().await;
        seed_client(&state, 1).await;

        let error = create_appointment(
            State(state),
            Ok(Json(AppointmentBody {
                appointment: create_body("client_001", "tomorrow", "2026-09-01T11:00:00Z"),
            })),
        )
        .await
        .unwrap_err();

        assert!(
            matches!(error, ApiError::Unprocessable(message) if message == "start_time is invalid")
        );
    }

    #[tokio::test]
    async fn create_accepts_naive_timestamps_as_utc() {
        let state = test_state().await;
        seed_client(&state, 1).await;

        let (_, Json(envelope)) = create_appointment(
            State(state),
            Ok(Json(AppointmentBody {
                appointment: create_body("client_001", "2026-09-01T10:00", "2026-09-01T11:00"),
            })),
        )
        .await
        .unwrap();

        let view = envelope.data.unwrap();
        assert_eq!(view.start_time, at(1, 10));
        assert_eq!(view.end_time, at(1, 11));
    }

    #[tokio::test]
    async fn update_applies_partial_fields() {
        let state = test_state().await;
        let client = seed_client(&state, 1).await;
        let appointment = seed_appointment(&state, "apt_001", client.id, at(1, 10), 1).await;

        let mut body = empty_update();
        body.appointment_type = Some("therapy".to_string());
        body.notes = Some("bring records".to_string());
        let Json(envelope) = update_appointment(
            State(state.clone()),
            Path(appointment.id.as_str()),
            Ok(Json(AppointmentBody { appointment: body })),
        )
        .await
        .unwrap();

        assert_eq!(
            envelope.message.as_deref(),
            Some("Appointment updated successfully")
        );
        let view = envelope.data.unwrap();
        assert_eq!(view.appointment_type, "therapy");
        // Untouched fields survive a partial update
        assert_eq!(view.start_time, at(1, 10));

        let db = state.db.lock().await;
        let stored = SqliteAppointmentRepository::new(db.connection())
            .get(&appointment.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.notes.as_deref(), Some("bring records"));
    }

    #[tokio::test]
    async fn update_rejects_inverted_range() {
        let state = test_state().await;
        let client = seed_client(&state, 1).await;
        let appointment = seed_appointment(&state, "apt_001", client.id, at(1, 10), 1).await;

        let mut body = empty_update();
        body.start_time = Some("2026-09-01T12:00:00Z".to_string());
        body.end_time = Some("2026-09-01T10:00:00Z".to_string());
        let error = update_appointment(
            State(state),
            Path(appointment.id.as_str()),
            Ok(Json(AppointmentBody { appointment: body })),
        )
        .await
        .unwrap_err();

        assert!(
            matches!(error, ApiError::Unprocessable(message) if message.starts_with("Validation failed:"))
        );
    }

    #[tokio::test]
    async fn update_may_move_onto_an_occupied_slot() {
        let state = test_state().await;
        let client = seed_client(&state, 1).await;
        seed_appointment(&state, "apt_001", client.id, at(1, 10), 1).await;
        let second = seed_appointment(&state, "apt_002", client.id, at(1, 12), 1).await;

        // Overlap is only enforced at creation time
        let mut body = empty_update();
        body.start_time = Some("2026-09-01T10:30:00Z".to_string());
        body.end_time = Some("2026-09-01T11:30:00Z".to_string());
        let Json(envelope) = update_appointment(
            State(state),
            Path(second.id.as_str()),
            Ok(Json(AppointmentBody { appointment: body })),
        )
        .await
        .unwrap();

        let view = envelope.data.unwrap();
        assert_eq!(view.start_time, at(1, 10) + chrono::Duration::minutes(30));
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let state = test_state().await;
        let client = seed_client(&state, 1).await;
        let appointment = seed_appointment(&state, "apt_001", client.id, at(1, 10), 1).await;

        let Json(envelope) = delete_appointment(State(state.clone()), Path(appointment.id.as_str()))
            .await
            .unwrap();
        assert_eq!(
            envelope.message.as_deref(),
            Some("Appointment deleted successfully")
        );

        let error = delete_appointment(State(state), Path(appointment.id.as_str()))
            .await
            .unwrap_err();
        assert!(matches!(error, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_commits_despite_push_failure() {
        let state = test_state().await;
        let client = seed_client(&state, 1).await;
        let appointment = seed_appointment(&state, "apt_001", client.id, at(1, 10), 1).await;

        let Json(envelope) = cancel_appointment(State(state.clone()), Path(appointment.id.as_str()))
            .await
            .unwrap();
        assert_eq!(
            envelope.message.as_deref(),
            Some("Appointment cancelled successfully")
        );
        let view = envelope.data.unwrap();
        assert_eq!(view.status, AppointmentStatus::Cancelled);

        let db = state.db.lock().await;
        let stored = SqliteAppointmentRepository::new(db.connection())
            .get(&appointment.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, AppointmentStatus::Cancelled);
        // The failed push leaves the sync stamp untouched
        assert!(stored.last_synced_at.is_none());
    }
}
