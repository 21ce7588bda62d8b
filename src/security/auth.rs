//! Authorization hook.
//!
//! Every bridge asks an [`Authorizer`] before it touches the bus. The hook
//! receives the raw `Authorization` header value and the target (a subject
//! or a KV key) and answers yes or no.

use crate::config::schema::{AuthConfig, AuthMode};

/// Decides whether a credential may act on a target.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, credential: &str, target: &str) -> bool;
}

impl<F> Authorizer for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn authorize(&self, credential: &str, target: &str) -> bool {
        self(credential, target)
    }
}

/// Permits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _credential: &str, _target: &str) -> bool {
        true
    }
}

/// Requires `Authorization: Bearer <token>`, for every target.
#[derive(Debug, Clone)]
pub struct StaticToken {
    expected: String,
}

impl StaticToken {
    pub fn new(token: impl AsRef<str>) -> Self {
        Self {
            expected: format!("Bearer {}", token.as_ref()),
        }
    }
}

impl Authorizer for StaticToken {
    fn authorize(&self, credential: &str, _target: &str) -> bool {
        credential == self.expected
    }
}

/// Build the authorizer selected in config.
pub fn from_config(config: &AuthConfig) -> Box<dyn Authorizer> {
    match config.mode {
        AuthMode::AllowAll => {
            tracing::warn!("Authorization disabled: every request is permitted");
            Box::new(AllowAll)
        }
        AuthMode::Token => Box::new(StaticToken::new(&config.token)),
    }
}
