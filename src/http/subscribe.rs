//! Subscribe bridge: `GET /sub/{subject}` as server-sent events.

use std::convert::Infallible;

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;

use crate::bus::subject::{self, subject_from_path};
use crate::http::error::CallerError;
use crate::http::server::AppState;
use crate::stream::{event, session, SessionOptions};

/// Open a streaming session and return its SSE body.
///
/// Wildcards are allowed. The bus subscription exists before the response
/// headers are sent.
pub async fn subscribe_handler(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    headers: HeaderMap,
) -> Result<Response, CallerError> {
    let Path(raw) = path?;
    let subject = subject_from_path(&raw);
    subject::validate(&subject, true)?;
    state.ctx.authorize(&headers, &subject)?;

    let policy = state.policy.load_full();
    let options = SessionOptions {
        poll_interval: policy.poll_interval,
        channel_capacity: policy.channel_capacity,
    };

    let flush = session::open(state.ctx.bus(), &subject, &options, &state.sessions).await;
    let events = flush
        .into_stream()
        .map(|message| Ok::<_, Infallible>(event::render(&message)));

    let sse = Sse::new(events);
    let response = match policy.keep_alive {
        Some(interval) => sse
            .keep_alive(KeepAlive::new().interval(interval))
            .into_response(),
        None => sse.into_response(),
    };
    Ok(response)
}
