//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use concierge_core::auth::AuthError;
use concierge_core::push::PushError;
use concierge_core::store::StoreError;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Message for every rejected access or refresh token.
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired token";

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Internal(detail) => {
                error!(%detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => AppError::Unauthorized("Invalid credentials".into()),
            AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::RevokedToken
            | AuthError::TokenNotFound => AppError::Unauthorized(INVALID_TOKEN_MESSAGE.into()),
            AuthError::Store(e) => AppError::from(e),
            AuthError::ConfigurationMissing(msg)
            | AuthError::InvalidConfiguration(msg)
            | AuthError::Internal(msg) => {
                AppError::Internal(msg)
            }
        }
    }
}

impl From<PushError> for AppError {
    fn from(e: PushError) -> Self {
        match e {
            PushError::InvalidSubscription(msg) => AppError::Validation(msg),
            PushError::Store(e) => AppError::from(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_errors_share_one_message() {
        for e in [
            AuthError::InvalidToken,
            AuthError::ExpiredToken,
            AuthError::RevokedToken,
            AuthError::TokenNotFound,
        ] {
            match AppError::from(e) {
                AppError::Unauthorized(msg) => assert_eq!(msg, INVALID_TOKEN_MESSAGE),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn status_codes() {
        let cases = [
            (AppError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn invalid_subscription_is_bad_request() {
        let err = AppError::from(PushError::InvalidSubscription("no keys".into()));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
