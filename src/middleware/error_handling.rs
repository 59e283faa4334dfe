use crate::error::AppError;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

/// Wire shape of every error body the service produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
    pub error_type: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

// Map domain errors to HTTP responses
pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (error_type, code) = match err {
        AppError::Validation { .. } => ("validation_error", "INVALID_REQUEST"),
        AppError::Unauthorized => ("authentication_error", "INVALID_CREDENTIALS"),
        AppError::Forbidden => ("authorization_error", "AUTHORIZATION_ERROR"),
        // Storage read failures deliberately share the not-found shape.
        AppError::NotFound | AppError::Storage(_) => ("not_found_error", "MESSAGE_NOT_FOUND"),
        AppError::Config(_) | AppError::StartServer(_) => {
            ("server_error", "INTERNAL_SERVER_ERROR")
        }
        AppError::Database(_) => ("server_error", "DATABASE_ERROR"),
        AppError::Internal => ("server_error", "INTERNAL_SERVER_ERROR"),
    };

    let field = match err {
        AppError::Validation { field, .. } => Some((*field).to_string()),
        _ => None,
    };

    let response = ErrorResponse {
        error: match status {
            StatusCode::BAD_REQUEST => "Bad Request",
            StatusCode::UNAUTHORIZED => "Unauthorized",
            StatusCode::FORBIDDEN => "Forbidden",
            StatusCode::NOT_FOUND => "Not Found",
            StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
            _ => "Error",
        }
        .to_string(),
        message: err.to_string(),
        status: status.as_u16(),
        error_type: error_type.to_string(),
        code: code.to_string(),
        field,
    };

    (status, response)
}

pub fn into_response(err: AppError) -> impl IntoResponse {
    let (status, response) = map_error(&err);
    if status.is_server_error() {
        tracing::error!(
            status = status.as_u16(),
            retryable = err.is_retryable(),
            error = %err,
            "request failed"
        );
    }
    (status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_carry_the_field() {
        let (status, body) = map_error(&AppError::validation("body", "message body is required"));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error_type, "validation_error");
        assert_eq!(body.field.as_deref(), Some("body"));
    }

    #[test]
    fn storage_failures_look_like_not_found() {
        let (status, body) = map_error(&AppError::Storage("read failed".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.code, "MESSAGE_NOT_FOUND");

        let (status, _) = map_error(&AppError::NotFound);
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn auth_errors_map_to_401_and_403() {
        assert_eq!(map_error(&AppError::Unauthorized).0, StatusCode::UNAUTHORIZED);
        assert_eq!(map_error(&AppError::Forbidden).0, StatusCode::FORBIDDEN);
    }

    #[test]
    fn database_errors_are_500_and_opaque() {
        let (status, body) = map_error(&AppError::Database(sqlx::Error::PoolClosed));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error_type, "server_error");
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(AppError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(AppError::Database(sqlx::Error::PoolClosed).is_retryable());
        assert!(AppError::Internal.is_retryable());

        assert!(!AppError::Database(sqlx::Error::RowNotFound).is_retryable());
        assert!(!AppError::NotFound.is_retryable());
        assert!(!AppError::validation("body", "required").is_retryable());
    }
}
