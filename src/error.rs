//! Error taxonomy for the relying party core

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpError {
    /// Login challenge requested for an account with no registered credentials.
    #[error("Account has no registered credentials")]
    UnregisteredAccount,

    /// The client claimed a credential id the identity does not own.
    #[error("Unknown credential")]
    UnknownCredential,

    /// Credential ids are globally unique by authenticator construction.
    #[error("Credential already registered")]
    DuplicateCredential,

    /// Reported signature counter did not advance; possible cloned credential.
    #[error("Signature counter regression")]
    CounterRegression,

    /// No session exists for the presented handle.
    #[error("Session not found")]
    SessionNotFound,

    /// The pending challenge was already consumed, expired, or never issued.
    #[error("Challenge expired or already used")]
    SessionExpiredOrAlreadyUsed,

    /// Deliberately generic: never reveals which verification check failed.
    #[error("Verification failed")]
    VerificationFailed,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for RpError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            RpError::UnregisteredAccount
            | RpError::UnknownCredential
            | RpError::MalformedPayload(_) => (StatusCode::BAD_REQUEST, self.to_string()),

            RpError::SessionNotFound | RpError::SessionExpiredOrAlreadyUsed => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }

            RpError::DuplicateCredential | RpError::CounterRegression => {
                (StatusCode::CONFLICT, self.to_string())
            }

            RpError::VerificationFailed => (StatusCode::UNAUTHORIZED, self.to_string()),

            RpError::Database(e) => {
                tracing::error!("database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }

            RpError::Internal(e) => {
                tracing::error!("internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "ok": false, "error": message }))).into_response()
    }
}

pub type RpResult<T> = Result<T, RpError>;
