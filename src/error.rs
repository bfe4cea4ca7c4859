use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::LAST_METHOD_WARNING;

/// Error taxonomy of the auth-binding subsystem. Everything except
/// `TransientStorage` is terminal for the current attempt and surfaced to
/// the caller verbatim; the service never retries on the caller's behalf.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Account not found")]
    NotFound,

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Auth method already linked to this account")]
    AlreadyLinked,

    #[error("Auth method already linked to another account")]
    LinkedElsewhere,

    #[error("Proof invalid: {0}")]
    ProofInvalid(String),

    #[error("Unlinking the last auth method requires confirmation")]
    ConfirmationRequired,

    #[error("Account is not entitled to API keys")]
    NotEntitled,

    #[error("Transient storage failure: {0}")]
    TransientStorage(anyhow::Error),

    #[error("Email error: {0}")]
    EmailError(String),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<lettre::error::Error> for AppError {
    fn from(err: lettre::error::Error) -> Self {
        AppError::EmailError(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
            #[serde(skip_serializing_if = "Option::is_none")]
            required_phrase: Option<&'static str>,
        }

        let (status, error_message, details, required_phrase) = match self {
            AppError::ValidationError(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation error".to_string(),
                Some(err.to_string()),
                None,
            ),
            AppError::BadRequest(err) => (StatusCode::BAD_REQUEST, err.to_string(), None, None),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                "Account not found".to_string(),
                None,
                None,
            ),
            AppError::Unauthorized(err) => (StatusCode::UNAUTHORIZED, err.to_string(), None, None),
            AppError::AlreadyLinked => (
                StatusCode::CONFLICT,
                "Auth method already linked to this account".to_string(),
                None,
                None,
            ),
            AppError::LinkedElsewhere => (
                StatusCode::CONFLICT,
                "Auth method already linked to another account".to_string(),
                None,
                None,
            ),
            AppError::ProofInvalid(msg) => (
                StatusCode::UNAUTHORIZED,
                "Proof invalid".to_string(),
                Some(msg),
                None,
            ),
            // Programmatic callers get the explicit error plus the phrase
            // an interactive caller would have to type; no silent block.
            AppError::ConfirmationRequired => (
                StatusCode::PRECONDITION_REQUIRED,
                "Unlinking the last auth method requires confirmation".to_string(),
                None,
                Some(LAST_METHOD_WARNING),
            ),
            AppError::NotEntitled => (
                StatusCode::FORBIDDEN,
                "Account is not entitled to API keys".to_string(),
                None,
                None,
            ),
            AppError::TransientStorage(err) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Transient storage failure".to_string(),
                Some(err.to_string()),
                None,
            ),
            AppError::EmailError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Email error".to_string(),
                Some(msg),
                None,
            ),
            AppError::ConfigError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error".to_string(),
                Some(err.to_string()),
                None,
            ),
            AppError::InternalError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                Some(err.to_string()),
                None,
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: error_message,
                details,
                required_phrase,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_required_maps_to_precondition_required() {
        let response = AppError::ConfirmationRequired.into_response();
        assert_eq!(response.status(), StatusCode::PRECONDITION_REQUIRED);
    }

    #[test]
    fn conflict_errors_map_to_409() {
        assert_eq!(
            AppError::AlreadyLinked.into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::LinkedElsewhere.into_response().status(),
            StatusCode::CONFLICT
        );
    }
}
