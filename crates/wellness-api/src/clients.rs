use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use wellness_core::db::{
    AppointmentRepository, ClientRepository, SqliteAppointmentRepository, SqliteClientRepository,
};
use wellness_core::{AppointmentStatus, Client, ClientId};

use crate::error::ApiError;
use crate::routes::{page_params, AppState, Envelope, Pagination};

const SEARCH_LIMIT: usize = 10;

#[derive(Debug, Serialize)]
pub struct ClientView {
    pub id: String,
    pub external_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub notes: Option<String>,
    pub active: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub external_data: Map<String, Value>,
    pub appointment_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ClientDetail {
    #[serde(flatten)]
    pub client: ClientView,
    pub appointments: Vec<AppointmentBrief>,
}

#[derive(Debug, Serialize)]
pub struct AppointmentBrief {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub appointment_type: String,
}

#[derive(Debug, Serialize)]
pub struct ClientsPage {
    pub clients: Vec<ClientView>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
    pub clients: Vec<ClientView>,
    pub query: String,
}

fn client_view(
    appointments: &SqliteAppointmentRepository<'_>,
    client: Client,
) -> Result<ClientView, wellness_core::Error> {
    let appointment_count = appointments.count_for_client(&client.id)?;
    Ok(ClientView {
        id: client.id.as_str(),
        external_id: client.external_id,
        name: client.name,
        email: client.email,
        phone: client.phone,
        notes: client.notes,
        active: client.active,
        last_synced_at: client.last_synced_at,
        external_data: client.external_data,
        appointment_count,
    })
}

#[derive(Debug, Deserialize)]
pub struct ListClientsQuery {
    page: Option<usize>,
    per_page: Option<usize>,
    search: Option<String>,
}

pub async fn list_clients(
    State(state): State<AppState>,
    query: Result<Query<ListClientsQuery>, QueryRejection>,
) -> Result<Json<Envelope<ClientsPage>>, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let (page, per_page) = page_params(query.page, query.per_page);

    let db = state.db.lock().await;
    let clients = SqliteClientRepository::new(db.connection());
    let appointments = SqliteAppointmentRepository::new(db.connection());

    let rows = clients.list_active(query.search.as_deref(), per_page, (page - 1) * per_page)?;
    // Total stays the full active count even when a search narrows the page
    let total = clients.count_active()?;
    let views = rows
        .into_iter()
        .map(|client| client_view(&appointments, client))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Envelope::data(ClientsPage {
        clients: views,
        pagination: Pagination::new(page, per_page, total),
    }))
}

pub async fn get_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<ClientDetail>>, ApiError> {
    let Ok(id) = id.parse::<ClientId>() else {
        return Err(ApiError::not_found("Client not found"));
    };

    let db = state.db.lock().await;
    let clients = SqliteClientRepository::new(db.connection());
    let appointments = SqliteAppointmentRepository::new(db.connection());

    let Some(client) = clients.get(&id)? else {
        return Err(ApiError::not_found("Client not found"));
    };

    let briefs = appointments
        .list_for_client(&id)?
        .into_iter()
        .map(|appointment| AppointmentBrief {
            id: appointment.id.as_str(),
            start_time: appointment.start_time,
            end_time: appointment.end_time,
            status: appointment.status,
            appointment_type: appointment.appointment_type,
        })
        .collect();

    let view = client_view(&appointments, client)?;
    Ok(Envelope::data(ClientDetail {
        client: view,
        appointments: briefs,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
}

pub async fn search_clients(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Envelope<SearchResults>>, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let raw = query.q.unwrap_or_default();
    let term = raw.trim();
    if term.is_empty() {
        return Err(ApiError::bad_request("Search query is required"));
    }

    let db = state.db.lock().await;
    let clients = SqliteClientRepository::new(db.connection());
    let appointments = SqliteAppointmentRepository::new(db.connection());

    let views = clients
        .search(term, SEARCH_LIMIT)?
        .into_iter()
        .map(|client| client_view(&appointments, client))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Envelope::data(SearchResults {
        clients: views,
        query: term.to_string(),
    }))
}
