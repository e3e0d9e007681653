use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

// Messages render verbatim in the response envelope, so variants carry the
// finished text instead of a prefix.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("{0}")]
    External(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::Unprocessable(message.into())
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::External(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<wellness_core::Error> for ApiError {
    fn from(error: wellness_core::Error) -> Self {
        match &error {
            wellness_core::Error::NotFound(_) => Self::NotFound(error.to_string()),
            wellness_core::Error::Validation(_) => Self::Unprocessable(error.to_string()),
            _ => Self::Internal(error.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::External(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn response_parts(error: ApiError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn maps_variants_to_statuses() {
        let cases = [
            (ApiError::bad_request("x"), StatusCode::BAD_REQUEST),
            (ApiError::not_found("x"), StatusCode::NOT_FOUND),
            (
                ApiError::unprocessable("x"),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (ApiError::external("x"), StatusCode::BAD_GATEWAY),
            (ApiError::internal("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            let (status, _) = response_parts(error).await;
            assert_eq!(status, expected);
        }
    }

    #[tokio::test]
    async fn body_carries_message_verbatim() {
        let (_, body) = response_parts(ApiError::not_found("Client not found")).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Client not found");
    }

    #[tokio::test]
    async fn core_validation_maps_to_unprocessable() {
        let core = wellness_core::Error::validation("end_time", "must be after start time");
        let (status, body) = response_parts(ApiError::from(core)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body["error"],
            "Validation failed: end_time must be after start time"
        );
    }

    #[tokio::test]
    async fn core_not_found_maps_to_404() {
        let core = wellness_core::Error::NotFound("appointment abc".to_string());
        let (status, _) = response_parts(ApiError::from(core)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
