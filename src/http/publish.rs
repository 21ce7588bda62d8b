//! Publish bridge: `POST /pub/{subject}`.

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};

use crate::bus::subject::{self, subject_from_path};
use crate::bus::{BusMessage, Headers};
use crate::http::error::CallerError;
use crate::http::server::AppState;

/// Publish the request body on the subject taken from the path.
///
/// Query parameters become message headers, one per distinct name.
pub async fn publish_handler(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<StatusCode, CallerError> {
    let Path(raw) = path?;
    let subject = subject_from_path(&raw);
    subject::validate(&subject, false)?;
    let Query(params) = query?;
    let message_headers = query_headers(params)?;
    state.ctx.authorize(&headers, &subject)?;

    let message = BusMessage::new(subject.as_str())
        .with_headers(message_headers)
        .with_payload(body?);
    state.ctx.bus().publish(message).await?;

    tracing::debug!(subject = %subject, "Published");
    Ok(StatusCode::OK)
}

/// Build headers from query pairs; the first value of a repeated name wins.
///
/// Names must be non-empty and free of `:`, whitespace and control
/// characters. Values must not contain CR or LF. Either would break the
/// header block on the wire.
pub fn query_headers(params: Vec<(String, String)>) -> Result<Headers, CallerError> {
    let mut headers = Headers::new();
    for (name, value) in params {
        if name.is_empty() || name.chars().any(|c| c == ':' || c.is_whitespace() || c.is_control()) {
            return Err(CallerError::bad_request(format!("invalid header name '{}'", name.escape_debug())));
        }
        if value.contains(['\r', '\n']) {
            return Err(CallerError::bad_request(format!("invalid value for header '{}'", name)));
        }
        if !headers.contains(&name) {
            headers.insert(name, value);
        }
    }
    Ok(headers)
}
