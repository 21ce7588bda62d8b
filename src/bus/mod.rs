//! Message bus abstraction.
//!
//! # Data Flow
//! ```text
//! HTTP bridge
//!     → MessageBus (publish / request / subscribe / key_value)
//!     → adapter (nats.rs for a real server, memory.rs in-process)
//!     → BusMessage / BusError back to the bridge
//! ```
//!
//! # Design Decisions
//! - Bridges only see these traits; the wire client stays behind an adapter
//! - Every failure is a [`BusError`] kind, never a client-specific error type
//! - A [`Subscription`] is owned by exactly one task and polled with a timeout

pub mod error;
pub mod memory;
pub mod nats;
pub mod subject;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

pub use error::{BusError, BusResult};
pub use memory::MemoryBus;
pub use nats::NatsBus;

/// Header carrying a numeric status on service replies.
pub const SERVICE_ERROR_CODE: &str = "Nats-Service-Error-Code";

/// Bus message headers: name to ordered values.
///
/// Lookup is case-insensitive; names keep the case they were inserted with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: BTreeMap<String, Vec<String>>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to a single value, replacing earlier values.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.inner.insert(name, vec![value.into()]);
    }

    /// Add a value to `name`, keeping earlier values.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let key = self.key_for(&name).unwrap_or(name);
        self.inner.entry(key).or_default().push(value.into());
    }

    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.key_for(name)
            .and_then(|k| self.inner.get(&k))
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.key_for(name)
            .and_then(|k| self.inner.get(&k))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.key_for(name).is_some()
    }

    pub fn remove(&mut self, name: &str) {
        if let Some(key) = self.key_for(name) {
            self.inner.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterate over `(name, values)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    fn key_for(&self, name: &str) -> Option<String> {
        self.inner
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .cloned()
    }
}

/// A message as produced or consumed by the bus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusMessage {
    pub subject: String,
    pub headers: Headers,
    pub payload: Bytes,
    /// Reply subject for request/reply exchanges.
    pub reply: Option<String>,
}

impl BusMessage {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }
}

/// The message bus capability the gateway bridges to HTTP.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Fire-and-forget send.
    async fn publish(&self, message: BusMessage) -> BusResult<()>;

    /// Send and wait up to `timeout` for exactly one reply.
    async fn request(&self, message: BusMessage, timeout: Duration) -> BusResult<BusMessage>;

    /// Open a subscription on `subject` (wildcards allowed).
    async fn subscribe(&self, subject: &str) -> BusResult<Box<dyn Subscription>>;

    /// Resolve a KV bucket, optionally within a domain.
    async fn key_value(&self, domain: Option<&str>, bucket: &str) -> BusResult<Arc<dyn KeyValueStore>>;
}

/// A live subscription, polled by a single owner.
#[async_trait]
pub trait Subscription: Send {
    /// Wait up to `timeout` for the next message.
    ///
    /// Returns [`BusError::Timeout`] when nothing arrived in time and
    /// [`BusError::Closed`] once the subscription can no longer deliver.
    async fn next_message(&mut self, timeout: Duration) -> BusResult<BusMessage>;

    /// Release the subscription on the bus.
    async fn unsubscribe(self: Box<Self>) -> BusResult<()>;
}

/// A key/value bucket.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Current value of `key`; [`BusError::NotFound`] when absent.
    async fn get(&self, key: &str) -> BusResult<Bytes>;

    /// Write `value` at `key`, returning the new revision.
    async fn put(&self, key: &str, value: Bytes) -> BusResult<u64>;

    /// Remove `key`.
    async fn delete(&self, key: &str) -> BusResult<()>;
}
