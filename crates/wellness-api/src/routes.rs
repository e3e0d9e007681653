use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use wellness_core::db::Database;
use wellness_core::remote::SchedulingApiClient;
use wellness_core::sync::{SyncEngine, SyncSummary};

use crate::appointments;
use crate::clients;
use crate::error::ApiError;
use crate::scheduler::SchedulerHealth;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub engine: SyncEngine,
    pub remote: SchedulingApiClient,
    pub scheduler: Arc<SchedulerHealth>,
}

pub fn app_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/clients", get(clients::list_clients))
        .route("/clients/search", get(clients::search_clients))
        .route("/clients/{id}", get(clients::get_client))
        .route(
            "/appointments",
            get(appointments::list_appointments).post(appointments::create_appointment),
        )
        .route(
            "/appointments/{id}",
            get(appointments::get_appointment)
                .put(appointments::update_appointment)
                .patch(appointments::update_appointment)
                .delete(appointments::delete_appointment),
        )
        .route(
            "/appointments/{id}/cancel",
            patch(appointments::cancel_appointment),
        )
        .route("/sync/clients", post(trigger_client_sync))
        .route("/sync/appointments", post(trigger_appointment_sync));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

// Uniform response envelope: data and message are omitted when absent, so a
// delete renders as just {"success": true, "message": "..."}
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    pub fn data(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: None,
        })
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        })
    }
}

impl Envelope<()> {
    pub fn message_only(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data: None,
            message: Some(message.into()),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl Pagination {
    pub fn new(page: usize, per_page: usize, total: usize) -> Self {
        Self {
            page,
            per_page,
            total,
            total_pages: total.div_ceil(per_page),
        }
    }
}

/// Clamp raw paging parameters to page >= 1 and per_page in 1..=100
pub fn page_params(page: Option<usize>, per_page: Option<usize>) -> (usize, usize) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(20).clamp(1, 100);
    (page, per_page)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    version: &'static str,
    services: ServiceReport,
}

#[derive(Debug, Serialize)]
struct ServiceReport {
    database: bool,
    scheduler: bool,
    external_api: bool,
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = state.db.lock().await.ping().is_ok();
    let scheduler = state.scheduler.all_alive();
    // Informational only; an unreachable scheduling system never flips the
    // overall status
    let external_api = state.remote.health_check().await;

    let healthy = database && scheduler;
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "unhealthy" },
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION"),
            services: ServiceReport {
                database,
                scheduler,
                external_api,
            },
        }),
    )
}

async fn trigger_client_sync(
    State(state): State<AppState>,
) -> Result<Json<Envelope<SyncSummary>>, ApiError> {
    let summary = state
        .engine
        .sync_all_clients()
        .await
        .map_err(|error| ApiError::external(format!("Failed to fetch clients: {error}")))?;
    Ok(Envelope::with_message(summary, "Client sync completed"))
}

async fn trigger_appointment_sync(
    State(state): State<AppState>,
) -> Result<Json<Envelope<SyncSummary>>, ApiError> {
    let summary = state
        .engine
        .sync_all_appointments()
        .await
        .map_err(|error| ApiError::external(format!("Failed to fetch appointments: {error}")))?;
    Ok(Envelope::with_message(summary, "Appointment sync completed"))
}
