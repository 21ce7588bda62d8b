//! Request/reply bridge: `POST /req/{subject}`.
//!
//! # Responsibilities
//! - Forward the body and permitted headers as a bus request
//! - Wait for exactly one reply within the configured timeout
//! - Map the reply's service error code onto the HTTP status
//!
//! # Design Decisions
//! - No responders is a 404; every other bus failure is internal
//! - An unparseable service error code is a gateway failure, not the caller's

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::bus::subject::{self, subject_from_path};
use crate::bus::{BusError, BusMessage, SERVICE_ERROR_CODE};
use crate::http::error::{reason, CallerError};
use crate::http::server::AppState;

#[derive(Debug, Error)]
#[error("invalid service error code '{0}'")]
pub struct InvalidServiceErrorCode(String);

pub async fn request_handler(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, CallerError> {
    let Path(raw) = path?;
    let subject = subject_from_path(&raw);
    subject::validate(&subject, false)?;
    state.ctx.authorize(&headers, &subject)?;

    let policy = state.policy.load_full();
    let message = BusMessage::new(subject.as_str())
        .with_headers(policy.forward.apply(&headers))
        .with_payload(body?);

    let reply = match state.ctx.bus().request(message, policy.request_timeout).await {
        Ok(reply) => reply,
        Err(BusError::NoResponders) => {
            tracing::debug!(subject = %subject, "No responders");
            return Err(CallerError::not_found(reason(StatusCode::NOT_FOUND)));
        }
        Err(err) => return Err(err.into()),
    };

    reply_response(reply)
}

/// Turn a service reply into the HTTP response.
///
/// An absent, empty or `200` service error code means success; any other
/// value must parse as a status code and becomes the response status.
pub fn reply_response(reply: BusMessage) -> Result<Response, CallerError> {
    let status = match reply.headers.get(SERVICE_ERROR_CODE).map(str::trim) {
        None | Some("") | Some("200") => StatusCode::OK,
        Some(code) => code
            .parse::<u16>()
            .ok()
            .and_then(|c| StatusCode::from_u16(c).ok())
            .ok_or_else(|| CallerError::internal(InvalidServiceErrorCode(code.to_string())))?,
    };
    Ok((status, reply.payload).into_response())
}
