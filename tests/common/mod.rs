//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bus_gateway::bus::{
    BusError, BusMessage, BusResult, KeyValueStore, MemoryBus, MessageBus, Subscription,
};
use bus_gateway::config::GatewayConfig;
use bus_gateway::security::auth::{AllowAll, Authorizer};
use bus_gateway::{BusContext, HttpServer};
use futures_util::{Stream, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A gateway running on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<()>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Config with short bus timings so tests finish quickly.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.bus.request_timeout_ms = 500;
    config.bus.poll_interval_secs = 1;
    config.stream.keep_alive_secs = 1;
    config
}

pub async fn start_gateway(bus: Arc<dyn MessageBus>) -> TestGateway {
    start_gateway_with(bus, Arc::new(AllowAll), test_config()).await
}

pub async fn start_gateway_with(
    bus: Arc<dyn MessageBus>,
    auth: Arc<dyn Authorizer>,
    config: GatewayConfig,
) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let (_, config_updates) = mpsc::unbounded_channel();

    let server = HttpServer::new(config, BusContext::new(bus, auth));
    let token = shutdown.clone();
    let handle = tokio::spawn(async move {
        server.run(listener, config_updates, token).await.unwrap();
    });

    TestGateway {
        addr,
        shutdown,
        handle,
    }
}

/// Answer every request on `subject` with `f(request)`.
pub async fn spawn_responder<F>(bus: &MemoryBus, subject: &str, f: F)
where
    F: Fn(BusMessage) -> BusMessage + Send + 'static,
{
    let mut sub = bus.subscribe(subject).await.unwrap();
    let bus = bus.clone();
    tokio::spawn(async move {
        loop {
            match sub.next_message(Duration::from_secs(5)).await {
                Ok(request) => {
                    let Some(reply_to) = request.reply.clone() else {
                        continue;
                    };
                    let mut reply = f(request);
                    reply.subject = reply_to;
                    let _ = bus.publish(reply).await;
                }
                Err(BusError::Timeout) => continue,
                Err(_) => break,
            }
        }
    });
}

/// Wait until `cond` holds, polling every 10ms for up to 5s.
pub async fn eventually<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..500 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// Counts every bus operation before delegating to a [`MemoryBus`].
#[derive(Clone, Default)]
pub struct RecordingBus {
    pub inner: MemoryBus,
    pub operations: Arc<AtomicUsize>,
}

impl RecordingBus {
    pub fn operations(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn publish(&self, message: BusMessage) -> BusResult<()> {
        self.record();
        self.inner.publish(message).await
    }

    async fn request(&self, message: BusMessage, timeout: Duration) -> BusResult<BusMessage> {
        self.record();
        self.inner.request(message, timeout).await
    }

    async fn subscribe(&self, subject: &str) -> BusResult<Box<dyn Subscription>> {
        self.record();
        self.inner.subscribe(subject).await
    }

    async fn key_value(&self, domain: Option<&str>, bucket: &str) -> BusResult<Arc<dyn KeyValueStore>> {
        self.record();
        self.inner.key_value(domain, bucket).await
    }
}

/// A bus whose subscriptions can never be established.
pub struct FailingSubscribeBus;

#[async_trait]
impl MessageBus for FailingSubscribeBus {
    async fn publish(&self, _message: BusMessage) -> BusResult<()> {
        Ok(())
    }

    async fn request(&self, _message: BusMessage, _timeout: Duration) -> BusResult<BusMessage> {
        Err(BusError::NoResponders)
    }

    async fn subscribe(&self, _subject: &str) -> BusResult<Box<dyn Subscription>> {
        Err(BusError::other("permissions violation"))
    }

    async fn key_value(&self, _domain: Option<&str>, bucket: &str) -> BusResult<Arc<dyn KeyValueStore>> {
        Err(BusError::NotFound(bucket.to_string()))
    }
}

/// One parsed server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental SSE parser over a response body. Comment lines are skipped.
pub struct SseReader {
    body: std::pin::Pin<Box<dyn Stream<Item = reqwest::Result<bytes::Bytes>> + Send>>,
    buffer: String,
}

impl SseReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            body: Box::pin(response.bytes_stream()),
            buffer: String::new(),
        }
    }

    /// Next event, `None` when the stream ended, or `Err(())` on timeout.
    pub async fn next_event(&mut self, timeout: Duration) -> Result<Option<SseEvent>, ()> {
        tokio::time::timeout(timeout, self.read_event())
            .await
            .map_err(|_| ())
    }

    async fn read_event(&mut self) -> Option<SseEvent> {
        loop {
            if let Some(event) = self.take_block() {
                return Some(event);
            }
            match self.body.next().await {
                Some(Ok(chunk)) => self.buffer.push_str(&String::from_utf8_lossy(&chunk)),
                _ => return None,
            }
        }
    }

    /// Pop complete blocks from the buffer until one carries an event.
    fn take_block(&mut self) -> Option<SseEvent> {
        while let Some(end) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..end + 2).collect();
            let mut event = String::new();
            let mut data = Vec::new();
            for line in block.lines() {
                if line.starts_with(':') {
                    continue;
                }
                if let Some(value) = line.strip_prefix("event:") {
                    event = value.trim_start().to_string();
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
                }
            }
            if !event.is_empty() || !data.is_empty() {
                return Some(SseEvent {
                    event,
                    data: data.join("\n"),
                });
            }
        }
        None
    }
}
