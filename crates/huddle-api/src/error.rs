use axum::Json;
use axum::extract::FromRequest;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use huddle_db::StoreError;
use huddle_types::api::ErrorResponse;

/// Errors surfaced to API callers.
///
/// `Client` and `Validation` carry what the caller did wrong and are shown
/// as-is. `Internal` is logged and masked as a generic 500.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Client {
        status: StatusCode,
        message: String,
        explanation: String,
    },

    #[error("{message}")]
    Validation { message: String, errors: Vec<String> },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn client(
        status: StatusCode,
        message: impl Into<String>,
        explanation: impl Into<String>,
    ) -> Self {
        Self::Client {
            status,
            message: message.into(),
            explanation: explanation.into(),
        }
    }

    pub fn not_found(message: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self::client(StatusCode::NOT_FOUND, message, explanation)
    }

    pub fn unauthorized(message: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self::client(StatusCode::UNAUTHORIZED, message, explanation)
    }

    pub fn bad_request(message: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self::client(StatusCode::BAD_REQUEST, message, explanation)
    }

    pub fn forbidden(message: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self::client(StatusCode::FORBIDDEN, message, explanation)
    }

    pub fn validation(errors: Vec<String>) -> Self {
        let message = errors.join(", ");
        Self::Validation { message, errors }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Client { status, .. } => *status,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message that is safe to hand to a client.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { field } => {
                Self::validation(vec![format!("{} already exists", field)])
            }
            StoreError::NotFound(what) => Self::not_found("Resource not found", what),
            StoreError::Unexpected(e) => Self::Internal(e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text(), "Invalid data sent from the client")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Client {
                message,
                explanation,
                ..
            } => ErrorResponse {
                success: false,
                message,
                explanation,
                errors: Vec::new(),
            },
            Self::Validation { message, errors } => ErrorResponse {
                success: false,
                message,
                explanation: "Validation failed".to_string(),
                errors,
            },
            Self::Internal(e) => {
                error!("Internal error: {:#}", e);
                ErrorResponse {
                    success: false,
                    message: "Internal server error".to_string(),
                    explanation: "Something went wrong, please try again later".to_string(),
                    errors: Vec::new(),
                }
            }
        };
        (status, Json(body)).into_response()
    }
}

/// `Json` extractor whose rejection renders as an [`ApiError`] (400).
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflict_becomes_validation_error() {
        let err: ApiError = StoreError::Conflict { field: "email".into() }.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        match err {
            ApiError::Validation { errors, .. } => assert_eq!(errors, vec!["email already exists"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn internal_errors_are_masked() {
        let err = ApiError::Internal(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal server error");
    }
}
