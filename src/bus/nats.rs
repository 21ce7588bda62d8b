//! NATS adapter for the bus traits.
//!
//! # Responsibilities
//! - Translate [`BusMessage`] to and from `async_nats::Message`
//! - Map client error kinds onto [`BusError`]
//! - Resolve JetStream KV buckets per domain
//!
//! Connection management (reconnects, auth, TLS) is left to `async-nats`.

use std::sync::Arc;
use std::time::Duration;

use async_nats::client::RequestErrorKind;
use async_nats::jetstream;
use async_nats::jetstream::context::{
    GetStreamError, GetStreamErrorKind, KeyValueError, KeyValueErrorKind,
    RequestError as JetStreamRequestError, RequestErrorKind as JetStreamRequestErrorKind,
};
use async_nats::jetstream::ErrorCode;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;

use crate::bus::{BusError, BusMessage, BusResult, Headers, KeyValueStore, MessageBus, Subscription};

/// A [`MessageBus`] backed by a NATS connection.
#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    /// Connect to the server(s) at `url`.
    pub async fn connect(url: &str, connection_name: &str) -> BusResult<Self> {
        let client = async_nats::ConnectOptions::new()
            .name(connection_name)
            .connect(url)
            .await
            .map_err(BusError::other)?;

        tracing::info!(url = %url, name = %connection_name, "Connected to NATS");
        Ok(Self { client })
    }

    /// Wrap an already connected client.
    pub fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }

    fn jetstream(&self, domain: Option<&str>) -> jetstream::Context {
        match domain {
            Some(domain) => jetstream::with_domain(self.client.clone(), domain),
            None => jetstream::new(self.client.clone()),
        }
    }
}

fn to_nats_headers(headers: &Headers) -> async_nats::HeaderMap {
    let mut map = async_nats::HeaderMap::new();
    for (name, values) in headers.iter() {
        for value in values {
            map.append(name, value.as_str());
        }
    }
    map
}

fn from_nats_message(message: async_nats::Message) -> BusMessage {
    let mut headers = Headers::new();
    if let Some(map) = &message.headers {
        for (name, values) in map.iter() {
            for value in values {
                headers.append(name.to_string(), value.as_str());
            }
        }
    }

    BusMessage {
        subject: message.subject.to_string(),
        headers,
        payload: message.payload,
        reply: message.reply.map(|r| r.to_string()),
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, message: BusMessage) -> BusResult<()> {
        let headers = to_nats_headers(&message.headers);
        self.client
            .publish_with_headers(message.subject, headers, message.payload)
            .await
            .map_err(BusError::other)
    }

    async fn request(&self, message: BusMessage, timeout: Duration) -> BusResult<BusMessage> {
        let request = async_nats::Request::new()
            .headers(to_nats_headers(&message.headers))
            .payload(message.payload)
            .timeout(Some(timeout));

        let reply = self
            .client
            .send_request(message.subject, request)
            .await
            .map_err(|err| match err.kind() {
                RequestErrorKind::NoResponders => BusError::NoResponders,
                RequestErrorKind::TimedOut => BusError::Timeout,
                _ => BusError::other(err),
            })?;

        Ok(from_nats_message(reply))
    }

    async fn subscribe(&self, subject: &str) -> BusResult<Box<dyn Subscription>> {
        let inner = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(BusError::other)?;

        Ok(Box::new(NatsSubscription { inner }))
    }

    async fn key_value(&self, domain: Option<&str>, bucket: &str) -> BusResult<Arc<dyn KeyValueStore>> {
        let store = self
            .jetstream(domain)
            .get_key_value(bucket)
            .await
            .map_err(|err| bucket_error(err, bucket))?;

        Ok(Arc::new(NatsKv { store }))
    }
}

/// Why the stream behind a bucket could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BucketFailure {
    StreamNotFound,
    NoResponders,
    TimedOut,
    Other,
}

/// `GetBucket` wraps every stream lookup failure; find the one that happened.
fn bucket_failure(err: &KeyValueError) -> BucketFailure {
    if !matches!(err.kind(), KeyValueErrorKind::GetBucket) {
        return BucketFailure::Other;
    }

    let mut cause = std::error::Error::source(err);
    while let Some(current) = cause {
        if let Some(stream_err) = current.downcast_ref::<GetStreamError>() {
            match stream_err.kind() {
                GetStreamErrorKind::JetStream(js) if js.error_code() == ErrorCode::STREAM_NOT_FOUND => {
                    return BucketFailure::StreamNotFound;
                }
                GetStreamErrorKind::JetStream(_) => return BucketFailure::Other,
                _ => {}
            }
        }
        if let Some(request_err) = current.downcast_ref::<JetStreamRequestError>() {
            return match request_err.kind() {
                JetStreamRequestErrorKind::NoResponders => BucketFailure::NoResponders,
                JetStreamRequestErrorKind::TimedOut => BucketFailure::TimedOut,
                _ => BucketFailure::Other,
            };
        }
        cause = std::error::Error::source(current);
    }
    BucketFailure::Other
}

fn classify_bucket_failure(failure: BucketFailure, bucket: &str, detail: String) -> BusError {
    match failure {
        BucketFailure::StreamNotFound => BusError::NotFound(format!("bucket {}", bucket)),
        BucketFailure::NoResponders => BusError::NoResponders,
        BucketFailure::TimedOut => BusError::Timeout,
        BucketFailure::Other => BusError::Other(detail),
    }
}

fn bucket_error(err: KeyValueError, bucket: &str) -> BusError {
    classify_bucket_failure(bucket_failure(&err), bucket, err.to_string())
}

struct NatsSubscription {
    inner: async_nats::Subscriber,
}

#[async_trait]
impl Subscription for NatsSubscription {
    async fn next_message(&mut self, timeout: Duration) -> BusResult<BusMessage> {
        match tokio::time::timeout(timeout, self.inner.next()).await {
            Ok(Some(message)) => Ok(from_nats_message(message)),
            Ok(None) => Err(BusError::Closed),
            Err(_) => Err(BusError::Timeout),
        }
    }

    async fn unsubscribe(self: Box<Self>) -> BusResult<()> {
        let mut this = *self;
        this.inner.unsubscribe().await.map_err(BusError::other)
    }
}

struct NatsKv {
    store: jetstream::kv::Store,
}

#[async_trait]
impl KeyValueStore for NatsKv {
    async fn get(&self, key: &str) -> BusResult<Bytes> {
        self.store
            .get(key)
            .await
            .map_err(BusError::other)?
            .ok_or_else(|| BusError::NotFound(format!("key {}", key)))
    }

    async fn put(&self, key: &str, value: Bytes) -> BusResult<u64> {
        self.store.put(key, value).await.map_err(BusError::other)
    }

    async fn delete(&self, key: &str) -> BusResult<()> {
        self.store.delete(key).await.map_err(BusError::other)
    }
}
