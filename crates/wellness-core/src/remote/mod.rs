//! Typed client for the external scheduling API
//!
//! The remote speaks plain JSON: `GET /clients` and `GET /appointments`
//! return `{"clients": [...]}` / `{"appointments": [...]}` envelopes,
//! mirror writes go to `PUT /{resource}/{external_id}`, and bookings are
//! created with `POST /appointments` which answers `{"external_id": "..."}`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::AppointmentStatus;
use crate::util::{compact_text, is_http_url};

/// Result type for remote operations
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Errors raised by the scheduling API client
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Client-side configuration problem
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),

    /// The remote host couldn't be reached
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote answered with a non-success status
    #[error("HTTP {status}: {detail}")]
    Rejected { status: u16, detail: String },

    /// The remote answered 2xx but the body didn't have the expected shape
    #[error("Unexpected response payload: {0}")]
    Payload(String),
}

impl RemoteError {
    /// True when the failure means the scheduling system is unreachable
    /// (connection refused, DNS failure, timeout) rather than rejecting us
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Transport(error) => error.is_connect() || error.is_timeout(),
            _ => false,
        }
    }
}

/// Connection settings for the external scheduling API
#[derive(Debug, Clone)]
pub struct RemoteApiConfig {
    /// Base URL, e.g. `https://mock.api`
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Immediate retries for idempotent fetches
    pub max_retries: u32,
}

impl RemoteApiConfig {
    /// Create a configuration with default timeout (30s) and retries (3)
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }

    /// Set the per-request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how often idempotent fetches are retried
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// HTTP client for the external scheduling system
#[derive(Debug, Clone)]
pub struct SchedulingApiClient {
    base_url: String,
    http: reqwest::Client,
    max_retries: u32,
}

impl SchedulingApiClient {
    /// Build a client, normalizing and validating the base URL
    pub fn new(config: RemoteApiConfig) -> RemoteResult<Self> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if !is_http_url(&base_url) {
            return Err(RemoteError::InvalidConfiguration(format!(
                "base URL must start with http:// or https://, got `{base_url}`"
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| RemoteError::InvalidConfiguration(error.to_string()))?;

        Ok(Self {
            base_url,
            http,
            max_retries: config.max_retries,
        })
    }

    /// GET with immediate retries on transport failures
    async fn get_with_retry(&self, url: &str) -> RemoteResult<reqwest::Response> {
        let mut attempt = 0;
        loop {
            match self.http.get(url).send().await {
                Ok(response) => return Ok(response),
                Err(error)
                    if attempt < self.max_retries
                        && (error.is_connect() || error.is_timeout()) =>
                {
                    attempt += 1;
                    tracing::debug!(
                        "GET {url} failed ({error}), retry {attempt}/{}",
                        self.max_retries
                    );
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Fetch every client record the remote knows about, unparsed
    pub async fn fetch_all_clients(&self) -> RemoteResult<Vec<Value>> {
        let url = format!("{}/clients", self.base_url);
        let response = self.get_with_retry(&url).await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let envelope = response
            .json::<ClientsEnvelope>()
            .await
            .map_err(|error| RemoteError::Payload(error.to_string()))?;
        Ok(envelope.clients)
    }

    /// Fetch every appointment record the remote knows about, unparsed
    pub async fn fetch_all_appointments(&self) -> RemoteResult<Vec<Value>> {
        let url = format!("{}/appointments", self.base_url);
        let response = self.get_with_retry(&url).await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let envelope = response
            .json::<AppointmentsEnvelope>()
            .await
            .map_err(|error| RemoteError::Payload(error.to_string()))?;
        Ok(envelope.appointments)
    }

    /// Create or update the remote mirror of a client
    pub async fn upsert_client(
        &self,
        external_id: &str,
        payload: &ClientPushPayload,
    ) -> RemoteResult<()> {
        let url = format!("{}/clients/{external_id}", self.base_url);
        let response = self.http.put(&url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(())
    }

    /// Create or update the remote mirror of an appointment
    pub async fn upsert_appointment(
        &self,
        external_id: &str,
        payload: &AppointmentPushPayload,
    ) -> RemoteResult<()> {
        let url = format!("{}/appointments/{external_id}", self.base_url);
        let response = self.http.put(&url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(())
    }

    /// Book an appointment remotely, returning the external id it assigned
    ///
    /// When the scheduling system is unreachable the booking still succeeds,
    /// in degraded mode, with a locally generated placeholder id. An explicit
    /// rejection (HTTP error status) is still a hard failure.
    pub async fn create_appointment(
        &self,
        payload: &AppointmentCreatePayload,
    ) -> RemoteResult<String> {
        let url = format!("{}/appointments", self.base_url);
        let response = match self.http.post(&url).json(payload).send().await {
            Ok(response) => response,
            Err(error) if error.is_connect() || error.is_timeout() => {
                let placeholder = placeholder_external_id();
                tracing::warn!(
                    "Scheduling API unreachable, booking {placeholder} in degraded mode: {error}"
                );
                return Ok(placeholder);
            }
            Err(error) => return Err(error.into()),
        };

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let envelope = response
            .json::<CreatedEnvelope>()
            .await
            .map_err(|error| RemoteError::Payload(error.to_string()))?;

        envelope
            .external_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| RemoteError::Payload("create response carried no external id".into()))
    }

    /// Probe `GET /health` with a short deadline
    ///
    /// A 2xx answer counts as healthy; this is informational only and never
    /// gates overall service health.
    pub async fn health_check(&self) -> bool {
        self.http
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .is_ok_and(|response| response.status().is_success())
    }
}

/// Convert a non-success response into a `Rejected` error
async fn rejection(response: reqwest::Response) -> RemoteError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    RemoteError::Rejected {
        status,
        detail: compact_text(&body),
    }
}

/// Locally generated stand-in external id: `appointment_` plus 16 hex chars
fn placeholder_external_id() -> String {
    let hex = Uuid::now_v7().simple().to_string();
    // The tail of a v7 UUID is the random section
    format!("appointment_{}", &hex[16..])
}

#[derive(Debug, Deserialize)]
struct ClientsEnvelope {
    #[serde(default)]
    clients: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct AppointmentsEnvelope {
    #[serde(default)]
    appointments: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct CreatedEnvelope {
    external_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Outbound payloads
// ---------------------------------------------------------------------------

/// Mirror payload for `PUT /clients/{external_id}`
#[derive(Debug, Clone, Serialize)]
pub struct ClientPushPayload {
    pub external_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub notes: Option<String>,
    pub active: bool,
}

/// Mirror payload for `PUT /appointments/{external_id}`
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentPushPayload {
    pub external_id: String,
    pub client_external_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub appointment_type: String,
    pub notes: Option<String>,
}

/// Booking request for `POST /appointments`
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentCreatePayload {
    pub client_external_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub appointment_type: String,
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Inbound record mapping
// ---------------------------------------------------------------------------

/// Why a raw remote record couldn't be mapped
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordMapError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is invalid: {detail}")]
    InvalidField { field: &'static str, detail: String },
}

/// A remote client record, mapped field by field from the raw payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteClientRecord {
    pub external_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub notes: Option<String>,
    pub active: bool,
}

impl RemoteClientRecord {
    /// Map one raw record, rejecting missing or mistyped fields
    pub fn from_value(value: &Value) -> Result<Self, RecordMapError> {
        Ok(Self {
            external_id: required_str(value, "external_id")?,
            name: required_str(value, "name")?,
            email: required_str(value, "email")?,
            phone: required_str(value, "phone")?,
            notes: optional_str(value, "notes")?,
            active: optional_bool(value, "active", true)?,
        })
    }
}

/// A remote appointment record, mapped field by field from the raw payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAppointmentRecord {
    pub external_id: String,
    pub client_external_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub appointment_type: String,
    pub notes: Option<String>,
}

impl RemoteAppointmentRecord {
    /// Map one raw record, rejecting missing or mistyped fields
    pub fn from_value(value: &Value) -> Result<Self, RecordMapError> {
        Ok(Self {
            external_id: required_str(value, "external_id")?,
            client_external_id: required_str(value, "client_external_id")?,
            start_time: required_time(value, "start_time")?,
            end_time: required_time(value, "end_time")?,
            status: required_status(value, "status")?,
            appointment_type: required_str(value, "appointment_type")?,
            notes: optional_str(value, "notes")?,
        })
    }
}

fn required_str(value: &Value, field: &'static str) -> Result<String, RecordMapError> {
    match value.get(field) {
        None | Some(Value::Null) => Err(RecordMapError::MissingField(field)),
        Some(Value::String(s)) if s.trim().is_empty() => Err(RecordMapError::InvalidField {
            field,
            detail: "must not be blank".to_string(),
        }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(RecordMapError::InvalidField {
            field,
            detail: format!("expected a string, got {other}"),
        }),
    }
}

fn optional_str(value: &Value, field: &'static str) -> Result<Option<String>, RecordMapError> {
    match value.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(RecordMapError::InvalidField {
            field,
            detail: format!("expected a string, got {other}"),
        }),
    }
}

fn optional_bool(value: &Value, field: &'static str, default: bool) -> Result<bool, RecordMapError> {
    match value.get(field) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(RecordMapError::InvalidField {
            field,
            detail: format!("expected a boolean, got {other}"),
        }),
    }
}

fn required_time(value: &Value, field: &'static str) -> Result<DateTime<Utc>, RecordMapError> {
    let raw = required_str(value, field)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RecordMapError::InvalidField {
            field,
            detail: format!("not an RFC 3339 timestamp: {error}"),
        })
}

fn required_status(value: &Value, field: &'static str) -> Result<AppointmentStatus, RecordMapError> {
    let raw = required_str(value, field)?;
    raw.parse().map_err(|_| RecordMapError::InvalidField {
        field,
        detail: format!("must be one of scheduled, confirmed, cancelled, completed; got `{raw}`"),
    })
}
