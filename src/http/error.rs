//! Caller-facing error responses.
//!
//! # Responsibilities
//! - Distinguish errors the client caused from gateway failures
//! - Render client errors as a JSON string body with their status
//! - Log internal errors and answer with a generic 500
//!
//! # Design Decisions
//! - Internal error text never reaches the client
//! - Bus errors default to internal; bridges map the kinds they expect first

use axum::extract::rejection::{BytesRejection, PathRejection, QueryRejection};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::bus::subject::SubjectError;
use crate::bus::BusError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error returned by a bridge handler.
#[derive(Debug, Error)]
pub enum CallerError {
    /// The caller can act on this: bad input, missing resource, no access.
    #[error("{details}")]
    Client { status: StatusCode, details: String },

    /// Something failed inside the gateway or on the bus.
    #[error("{0}")]
    Internal(BoxError),
}

/// Standard reason phrase for `status`.
pub fn reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("")
}

impl CallerError {
    pub fn client(status: StatusCode, details: impl Into<String>) -> Self {
        Self::Client {
            status,
            details: details.into(),
        }
    }

    pub fn internal(err: impl Into<BoxError>) -> Self {
        Self::Internal(err.into())
    }

    pub fn unauthorized() -> Self {
        Self::client(StatusCode::UNAUTHORIZED, reason(StatusCode::UNAUTHORIZED))
    }

    pub fn not_found(details: impl Into<String>) -> Self {
        Self::client(StatusCode::NOT_FOUND, details)
    }

    pub fn bad_request(details: impl Into<String>) -> Self {
        Self::client(StatusCode::BAD_REQUEST, details)
    }

    pub fn method_not_allowed() -> Self {
        Self::client(
            StatusCode::METHOD_NOT_ALLOWED,
            reason(StatusCode::METHOD_NOT_ALLOWED),
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Client { status, .. } => *status,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BusError> for CallerError {
    fn from(err: BusError) -> Self {
        Self::internal(err)
    }
}

impl From<SubjectError> for CallerError {
    fn from(err: SubjectError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<PathRejection> for CallerError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for CallerError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<BytesRejection> for CallerError {
    fn from(rejection: BytesRejection) -> Self {
        Self::client(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for CallerError {
    fn into_response(self) -> Response {
        match self {
            Self::Client { status, details } => {
                let body = serde_json::Value::String(details).to_string();
                (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
            }
            Self::Internal(err) => {
                tracing::error!(error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    reason(StatusCode::INTERNAL_SERVER_ERROR),
                )
                    .into_response()
            }
        }
    }
}
