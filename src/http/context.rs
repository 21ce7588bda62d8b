//! Shared bridge context.

use std::sync::Arc;

use axum::http::{header, HeaderMap};

use crate::bus::MessageBus;
use crate::http::error::CallerError;
use crate::security::auth::Authorizer;

/// The bus connection and authorization hook every bridge works against.
#[derive(Clone)]
pub struct BusContext {
    bus: Arc<dyn MessageBus>,
    auth: Arc<dyn Authorizer>,
}

impl BusContext {
    pub fn new(bus: Arc<dyn MessageBus>, auth: Arc<dyn Authorizer>) -> Self {
        Self { bus, auth }
    }

    pub fn bus(&self) -> &dyn MessageBus {
        self.bus.as_ref()
    }

    /// Ask the authorization hook whether the request's credential may act
    /// on `target`. Must be called before any bus operation.
    pub fn authorize(&self, headers: &HeaderMap, target: &str) -> Result<(), CallerError> {
        if self.auth.authorize(credential(headers), target) {
            Ok(())
        } else {
            tracing::debug!(auth_target = %target, "Authorization denied");
            Err(CallerError::unauthorized())
        }
    }
}

/// Raw `Authorization` header value, or empty when absent or not UTF-8.
pub fn credential(headers: &HeaderMap) -> &str {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}
