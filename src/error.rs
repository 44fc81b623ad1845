use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{auth::AuthError, ingest::IngestError, repository::RepoError};

/// ApiError
///
/// Every way a request can end in failure. Each variant maps to one status and one short
/// machine-readable reason; the underlying detail goes to the log, never to the client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("invalid request: {0}")]
    Validation(&'static str),
    #[error("email or password is wrong")]
    InvalidCredentials,
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error("conflict: {0}")]
    Conflict(&'static str),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(AuthError::MissingCredential) => StatusCode::UNAUTHORIZED,
            ApiError::Auth(_) => StatusCode::FORBIDDEN,
            ApiError::Ingest(e) => e.status(),
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ApiError::Auth(e) => e.reason(),
            ApiError::Ingest(e) => e.reason(),
            ApiError::Validation(reason) | ApiError::NotFound(reason) | ApiError::Conflict(reason) => {
                *reason
            }
            ApiError::InvalidCredentials => "invalid_credentials",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Duplicate => ApiError::Conflict("duplicate_subject"),
            RepoError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, source = ?std::error::Error::source(&self), "request failed");
        } else {
            tracing::info!(status = status.as_u16(), reason = self.reason(), "request rejected");
        }

        (status, Json(json!({ "error": self.reason() }))).into_response()
    }
}
