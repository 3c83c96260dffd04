//! Custom error types for the API service

use agenda::AgendaError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Custom error type for the API service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Unauthorized access
    #[error("Unauthorized")]
    Unauthorized,

    /// Bad request with message
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// The board has not finished loading
    #[error("{0}")]
    Unavailable(String),

    /// Internal server error
    #[error("Internal server error")]
    InternalServerError,
}

impl From<AgendaError> for ApiError {
    fn from(err: AgendaError) -> Self {
        match err {
            AgendaError::Validation(e) => ApiError::BadRequest(e.to_string()),
            AgendaError::EventNotFound(_) => ApiError::NotFound(err.to_string()),
            AgendaError::NotCreator => ApiError::Forbidden(err.to_string()),
            AgendaError::EventFull => ApiError::Conflict(err.to_string()),
            AgendaError::Store(e) => {
                error!("Store operation failed: {}", e);
                ApiError::InternalServerError
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!("Request failed: {:#}", err);
        ApiError::InternalServerError
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use agenda::{StoreError, ValidationError};
    use uuid::Uuid;

    fn status(err: AgendaError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_agenda_errors_map_to_status() {
        assert_eq!(
            status(AgendaError::Validation(ValidationError::Missing("title"))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(AgendaError::EventNotFound(Uuid::new_v4())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status(AgendaError::NotCreator), StatusCode::FORBIDDEN);
        assert_eq!(status(AgendaError::EventFull), StatusCode::CONFLICT);
        assert_eq!(
            status(AgendaError::Store(StoreError::Unavailable("down".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_validation_message_is_kept() {
        let err = ApiError::from(AgendaError::Validation(ValidationError::Missing("location")));
        assert_eq!(err.to_string(), "location is required");
    }
}
