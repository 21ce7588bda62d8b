//! Inbound header forwarding.
//!
//! # Responsibilities
//! - Decide which HTTP request headers reach the bus on request/reply
//! - Strip hop-by-hop and framing headers
//!
//! # Design Decisions
//! - `"*"` forwards everything except the stripped set and credentials
//! - Credentials only reach the bus when an allow-list names them
//! - Any other list is a case-insensitive allow-list
//! - Non-UTF-8 header values are skipped

use axum::http::HeaderMap;

use crate::bus::Headers;

/// Headers describing the HTTP hop itself; never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "host",
    "content-length",
];

/// Caller credentials; left out of `*` forwarding.
const CREDENTIALS: &[&str] = &["authorization", "proxy-authorization", "cookie"];

/// Which request headers are copied onto bus messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardPolicy {
    /// Everything except hop-by-hop and credential headers.
    All,
    /// Only the listed names (lowercase).
    AllowList(Vec<String>),
}

impl ForwardPolicy {
    /// Build a policy from configured names; `["*"]` means [`ForwardPolicy::All`].
    pub fn from_names(names: &[String]) -> Self {
        if names.iter().any(|n| n == "*") {
            return Self::All;
        }
        Self::AllowList(names.iter().map(|n| n.to_ascii_lowercase()).collect())
    }

    fn permits(&self, name: &str) -> bool {
        if HOP_BY_HOP.contains(&name) {
            return false;
        }
        match self {
            Self::All => !CREDENTIALS.contains(&name),
            Self::AllowList(names) => names.iter().any(|n| n == name),
        }
    }

    /// Copy the permitted headers into bus headers, keeping every value.
    pub fn apply(&self, headers: &HeaderMap) -> Headers {
        let mut forwarded = Headers::new();
        for (name, value) in headers.iter() {
            if !self.permits(name.as_str()) {
                continue;
            }
            match value.to_str() {
                Ok(v) => forwarded.append(name.as_str(), v),
                Err(_) => tracing::debug!(header = %name, "Skipping non UTF-8 header value"),
            }
        }
        forwarded
    }
}

impl Default for ForwardPolicy {
    fn default() -> Self {
        Self::All
    }
}
