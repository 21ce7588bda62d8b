//! In-process message bus.
//!
//! # Responsibilities
//! - Subject-based fan-out with `*` / `>` wildcards
//! - Request/reply over generated inbox subjects
//! - Domain-scoped KV buckets
//!
//! Used by the test suite and by `memory://` development mode. Messages live
//! only as long as the process; there is no persistence or replay.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::bus::subject;
use crate::bus::{BusError, BusMessage, BusResult, KeyValueStore, MessageBus, Subscription};

struct Subscriber {
    pattern: String,
    tx: mpsc::UnboundedSender<BusMessage>,
}

#[derive(Default)]
struct Inner {
    subscribers: DashMap<u64, Subscriber>,
    buckets: DashMap<(String, String), Arc<MemoryKv>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl Inner {
    fn ensure_open(&self) -> BusResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Other("connection closed".to_string()));
        }
        Ok(())
    }

    fn register(&self, pattern: &str) -> (u64, mpsc::UnboundedReceiver<BusMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(
            id,
            Subscriber {
                pattern: pattern.to_string(),
                tx,
            },
        );
        (id, rx)
    }

    /// Deliver to every matching subscriber, returning how many received it.
    fn deliver(&self, message: &BusMessage) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        for entry in self.subscribers.iter() {
            if !subject::matches(&entry.pattern, &message.subject) {
                continue;
            }
            if entry.tx.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*entry.key());
            }
        }

        for id in dead {
            self.subscribers.remove(&id);
        }
        delivered
    }

    fn has_responders(&self, subject_name: &str) -> bool {
        self.subscribers
            .iter()
            .any(|s| !s.tx.is_closed() && subject::matches(&s.pattern, subject_name))
    }
}

/// An in-process [`MessageBus`].
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or fetch) a KV bucket. `None` selects the default domain.
    pub fn create_bucket(&self, domain: Option<&str>, bucket: &str) -> Arc<MemoryKv> {
        let key = (domain.unwrap_or_default().to_string(), bucket.to_string());
        self.inner
            .buckets
            .entry(key)
            .or_insert_with(|| Arc::new(MemoryKv::default()))
            .value()
            .clone()
    }

    /// Number of live subscriptions registered with exactly this pattern.
    pub fn subscriber_count(&self, pattern: &str) -> usize {
        self.inner
            .subscribers
            .iter()
            .filter(|s| s.pattern == pattern && !s.tx.is_closed())
            .count()
    }

    /// Close the connection: every subscription ends and new operations fail.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.subscribers.clear();
        tracing::debug!("Memory bus closed");
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, message: BusMessage) -> BusResult<()> {
        self.inner.ensure_open()?;
        subject::validate(&message.subject, false).map_err(BusError::other)?;

        let delivered = self.inner.deliver(&message);
        tracing::trace!(subject = %message.subject, delivered, "Published");
        Ok(())
    }

    async fn request(&self, message: BusMessage, timeout: Duration) -> BusResult<BusMessage> {
        self.inner.ensure_open()?;
        subject::validate(&message.subject, false).map_err(BusError::other)?;

        if !self.inner.has_responders(&message.subject) {
            return Err(BusError::NoResponders);
        }

        let inbox = format!("_INBOX.{}", uuid::Uuid::new_v4().simple());
        let (id, mut rx) = self.inner.register(&inbox);
        self.inner.deliver(&message.with_reply(inbox));

        let outcome = match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(BusError::Closed),
            Err(_) => Err(BusError::Timeout),
        };
        self.inner.subscribers.remove(&id);
        outcome
    }

    async fn subscribe(&self, subject_name: &str) -> BusResult<Box<dyn Subscription>> {
        self.inner.ensure_open()?;
        subject::validate(subject_name, true).map_err(BusError::other)?;

        let (id, rx) = self.inner.register(subject_name);
        Ok(Box::new(MemorySubscription {
            id,
            rx,
            bus: Arc::clone(&self.inner),
        }))
    }

    async fn key_value(&self, domain: Option<&str>, bucket: &str) -> BusResult<Arc<dyn KeyValueStore>> {
        self.inner.ensure_open()?;

        let key = (domain.unwrap_or_default().to_string(), bucket.to_string());
        match self.inner.buckets.get(&key) {
            Some(kv) => Ok(Arc::clone(kv.value()) as Arc<dyn KeyValueStore>),
            None => Err(BusError::NotFound(format!("bucket {}", bucket))),
        }
    }
}

/// Subscription handle returned by [`MemoryBus::subscribe`].
pub struct MemorySubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<BusMessage>,
    bus: Arc<Inner>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next_message(&mut self, timeout: Duration) -> BusResult<BusMessage> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(BusError::Closed),
            Err(_) => Err(BusError::Timeout),
        }
    }

    async fn unsubscribe(self: Box<Self>) -> BusResult<()> {
        // Removal happens in Drop.
        Ok(())
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.bus.subscribers.remove(&self.id);
    }
}

/// An in-memory KV bucket.
#[derive(Default)]
pub struct MemoryKv {
    entries: DashMap<String, Bytes>,
    revision: AtomicU64,
}

impl MemoryKv {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn get(&self, key: &str) -> BusResult<Bytes> {
        self.entries
            .get(key)
            .map(|v| v.value().clone())
            .ok_or_else(|| BusError::NotFound(format!("key {}", key)))
    }

    async fn put(&self, key: &str, value: Bytes) -> BusResult<u64> {
        self.entries.insert(key.to_string(), value);
        Ok(self.revision.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn delete(&self, key: &str) -> BusResult<()> {
        self.entries
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| BusError::NotFound(format!("key {}", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLL: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_publish_fans_out_to_wildcards() {
        let bus = MemoryBus::new();
        let mut exact = bus.subscribe("orders.created").await.unwrap();
        let mut wildcard = bus.subscribe("orders.>").await.unwrap();
        let mut other = bus.subscribe("billing.*").await.unwrap();

        bus.publish(BusMessage::new("orders.created").with_payload("one")).await.unwrap();

        assert_eq!(&exact.next_message(POLL).await.unwrap().payload[..], b"one");
        assert_eq!(wildcard.next_message(POLL).await.unwrap().subject, "orders.created");
        assert_eq!(other.next_message(POLL).await, Err(BusError::Timeout));
    }

    #[tokio::test]
    async fn test_request_without_responders() {
        let bus = MemoryBus::new();
        let result = bus.request(BusMessage::new("svc.echo"), POLL).await;
        assert_eq!(result, Err(BusError::NoResponders));
    }

    #[tokio::test]
    async fn test_request_reply_roundtrip() {
        let bus = MemoryBus::new();
        let mut responder = bus.subscribe("svc.echo").await.unwrap();

        let server = bus.clone();
        tokio::spawn(async move {
            let request = responder.next_message(Duration::from_secs(1)).await.unwrap();
            let reply = BusMessage::new(request.reply.unwrap()).with_payload(request.payload);
            server.publish(reply).await.unwrap();
        });

        let reply = bus
            .request(BusMessage::new("svc.echo").with_payload("ping"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(&reply.payload[..], b"ping");
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let bus = MemoryBus::new();
        let _silent = bus.subscribe("svc.slow").await.unwrap();
        let result = bus.request(BusMessage::new("svc.slow"), Duration::from_millis(50)).await;
        assert_eq!(result, Err(BusError::Timeout));
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_released() {
        let bus = MemoryBus::new();
        let sub = bus.subscribe("orders.created").await.unwrap();
        assert_eq!(bus.subscriber_count("orders.created"), 1);

        sub.unsubscribe().await.unwrap();
        assert_eq!(bus.subscriber_count("orders.created"), 0);
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe("orders.created").await.unwrap();

        bus.close();

        assert_eq!(sub.next_message(POLL).await, Err(BusError::Closed));
        assert!(bus.subscribe("orders.created").await.is_err());
        assert!(bus.publish(BusMessage::new("orders.created")).await.is_err());
    }

    #[tokio::test]
    async fn test_key_value_buckets() {
        let bus = MemoryBus::new();
        assert!(matches!(
            bus.key_value(None, "config").await,
            Err(BusError::NotFound(_))
        ));

        bus.create_bucket(Some("hub"), "config");
        assert!(bus.key_value(None, "config").await.is_err());

        let kv = bus.key_value(Some("hub"), "config").await.unwrap();
        assert_eq!(kv.put("color", Bytes::from_static(b"blue")).await.unwrap(), 1);
        assert_eq!(kv.put("color", Bytes::from_static(b"red")).await.unwrap(), 2);
        assert_eq!(&kv.get("color").await.unwrap()[..], b"red");

        kv.delete("color").await.unwrap();
        assert!(matches!(kv.get("color").await, Err(BusError::NotFound(_))));
        assert!(matches!(kv.delete("color").await, Err(BusError::NotFound(_))));
    }
}
