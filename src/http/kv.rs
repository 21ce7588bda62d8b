//! Key/value bridge: `/kv/{bucket}/{key}?domain=`.
//!
//! | Method | Effect        | Success |
//! |--------|---------------|---------|
//! | GET    | read the key  | 200 + value |
//! | PUT    | write the body | 204 |
//! | DELETE | remove the key | 204 |
//!
//! The bucket is resolved before the method is looked at, so an unknown
//! bucket is a 404 for every method.

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::bus::BusError;
use crate::http::error::{reason, CallerError};
use crate::http::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct KvQuery {
    /// JetStream domain; empty means the default domain.
    #[serde(default)]
    pub domain: Option<String>,
}

pub async fn kv_handler(
    State(state): State<AppState>,
    method: Method,
    path: Result<Path<(String, String)>, PathRejection>,
    query: Result<Query<KvQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, CallerError> {
    let Path((bucket, key)) = path?;
    let Query(query) = query?;
    state.ctx.authorize(&headers, &key)?;

    let domain = query.domain.as_deref().filter(|d| !d.is_empty());
    let store = state
        .ctx
        .bus()
        .key_value(domain, &bucket)
        .await
        .map_err(|err| match err {
            BusError::NotFound(_) | BusError::NoResponders => {
                tracing::debug!(bucket = %bucket, "Bucket not found");
                CallerError::not_found("bucket not found")
            }
            other => other.into(),
        })?;

    match method {
        Method::GET => {
            let value = store.get(&key).await.map_err(key_error)?;
            Ok((
                [(header::CONTENT_TYPE, "application/octet-stream")],
                value,
            )
                .into_response())
        }
        Method::PUT => {
            let revision = store.put(&key, body?).await.map_err(key_error)?;
            tracing::debug!(bucket = %bucket, key = %key, revision, "Key written");
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Method::DELETE => {
            store.delete(&key).await.map_err(key_error)?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        _ => Err(CallerError::method_not_allowed()),
    }
}

fn key_error(err: BusError) -> CallerError {
    match err {
        BusError::NotFound(_) => CallerError::not_found(reason(StatusCode::NOT_FOUND)),
        other => other.into(),
    }
}
