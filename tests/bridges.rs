//! Publish, request/reply and key/value bridges end to end.

use std::sync::Arc;
use std::time::Duration;

use bus_gateway::bus::{BusError, KeyValueStore, MemoryBus, MessageBus, SERVICE_ERROR_CODE};
use bus_gateway::security::auth::StaticToken;
use reqwest::StatusCode;

mod common;

#[tokio::test]
async fn test_publish_delivers_body_and_query_headers() {
    let bus = MemoryBus::new();
    let mut sub = bus.subscribe("orders.created").await.unwrap();
    let gateway = common::start_gateway(Arc::new(bus.clone())).await;

    let res = reqwest::Client::new()
        .post(gateway.url("/pub/orders/created?source=web&source=app&trace=7"))
        .body("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    assert!(res.bytes().await.unwrap().is_empty());

    let msg = sub.next_message(Duration::from_secs(1)).await.unwrap();
    assert_eq!(msg.subject, "orders.created");
    assert_eq!(&msg.payload[..], b"hello");
    assert_eq!(msg.headers.get("source"), Some("web"));
    assert_eq!(msg.headers.get("trace"), Some("7"));
}

#[tokio::test]
async fn test_publish_rejects_wildcards() {
    let bus = common::RecordingBus::default();
    let gateway = common::start_gateway(Arc::new(bus.clone())).await;

    let res = reqwest::Client::new()
        .post(gateway.url("/pub/orders/*"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(bus.operations(), 0);
}

#[tokio::test]
async fn test_request_returns_reply() {
    let bus = MemoryBus::new();
    common::spawn_responder(&bus, "svc.echo", |req| {
        let mut payload = b"echo:".to_vec();
        payload.extend_from_slice(&req.payload);
        req.with_payload(payload)
    })
    .await;
    let gateway = common::start_gateway(Arc::new(bus)).await;

    let res = reqwest::Client::new()
        .post(gateway.url("/req/svc/echo"))
        .body("ping")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "echo:ping");
}

#[tokio::test]
async fn test_request_forwards_headers() {
    let bus = MemoryBus::new();
    common::spawn_responder(&bus, "svc.whoami", |req| {
        let trace = req.headers.get("x-trace").unwrap_or("none").to_string();
        req.with_payload(trace)
    })
    .await;
    let gateway = common::start_gateway(Arc::new(bus)).await;

    let res = reqwest::Client::new()
        .post(gateway.url("/req/svc/whoami"))
        .header("X-Trace", "abc")
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), "abc");
}

#[tokio::test]
async fn test_request_service_error_code_becomes_status() {
    let bus = MemoryBus::new();
    common::spawn_responder(&bus, "svc.busy", |req| {
        let mut reply = req.with_payload("try later");
        reply.headers.insert(SERVICE_ERROR_CODE, "503");
        reply
    })
    .await;
    let gateway = common::start_gateway(Arc::new(bus)).await;

    let res = reqwest::Client::new()
        .post(gateway.url("/req/svc/busy"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), "try later");
}

#[tokio::test]
async fn test_request_without_responders_is_404() {
    let gateway = common::start_gateway(Arc::new(MemoryBus::new())).await;

    let res = reqwest::Client::new()
        .post(gateway.url("/req/nobody/home"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "\"Not Found\"");
}

#[tokio::test]
async fn test_request_timeout_is_internal_error() {
    let bus = MemoryBus::new();
    // Subscribed but never answers.
    let _silent = bus.subscribe("svc.slow").await.unwrap();
    let gateway = common::start_gateway(Arc::new(bus)).await;

    let res = reqwest::Client::new()
        .post(gateway.url("/req/svc/slow"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.text().await.unwrap(), "Internal Server Error");
}

#[tokio::test]
async fn test_kv_put_get_delete() {
    let bus = MemoryBus::new();
    let bucket = bus.create_bucket(None, "config");
    let gateway = common::start_gateway(Arc::new(bus)).await;
    let client = reqwest::Client::new();

    let res = client
        .put(gateway.url("/kv/config/feature.flags"))
        .body("on")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(&bucket.get("feature.flags").await.unwrap()[..], b"on");

    let res = client.get(gateway.url("/kv/config/feature.flags")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/octet-stream");
    assert_eq!(res.text().await.unwrap(), "on");

    let res = client.delete(gateway.url("/kv/config/feature.flags")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(matches!(bucket.get("feature.flags").await, Err(BusError::NotFound(_))));

    let res = client.get(gateway.url("/kv/config/feature.flags")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_kv_domain_selects_bucket() {
    let bus = MemoryBus::new();
    let edge = bus.create_bucket(Some("edge"), "config");
    edge.put("region", "eu".into()).await.unwrap();
    let gateway = common::start_gateway(Arc::new(bus)).await;
    let client = reqwest::Client::new();

    let res = client.get(gateway.url("/kv/config/region?domain=edge")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "eu");

    // The default domain has no such bucket.
    let res = client.get(gateway.url("/kv/config/region?domain=")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "\"bucket not found\"");
}

#[tokio::test]
async fn test_kv_unknown_bucket_is_404_for_every_method() {
    let gateway = common::start_gateway(Arc::new(MemoryBus::new())).await;
    let client = reqwest::Client::new();

    for method in [reqwest::Method::GET, reqwest::Method::PUT, reqwest::Method::PATCH] {
        let res = client
            .request(method, gateway.url("/kv/missing/key"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_kv_unsupported_method_is_405() {
    let bus = MemoryBus::new();
    bus.create_bucket(None, "config");
    let gateway = common::start_gateway(Arc::new(bus)).await;

    let res = reqwest::Client::new()
        .patch(gateway.url("/kv/config/key"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_unauthorized_requests_never_reach_the_bus() {
    let bus = common::RecordingBus::default();
    let gateway = common::start_gateway_with(
        Arc::new(bus.clone()),
        Arc::new(StaticToken::new("secret")),
        common::test_config(),
    )
    .await;
    let client = reqwest::Client::new();

    let requests = [
        client.post(gateway.url("/pub/orders")),
        client.post(gateway.url("/req/svc")),
        client.get(gateway.url("/sub/orders")),
        client.get(gateway.url("/kv/config/key")),
        client
            .put(gateway.url("/kv/config/key"))
            .header("authorization", "Bearer wrong"),
    ];
    for request in requests {
        let res = request.send().await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.text().await.unwrap(), "\"Unauthorized\"");
    }
    assert_eq!(bus.operations(), 0);

    let res = client
        .post(gateway.url("/pub/orders"))
        .header("authorization", "Bearer secret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(bus.operations(), 1);
}

#[tokio::test]
async fn test_authorizer_sees_kv_key_as_target() {
    let bus = MemoryBus::new();
    bus.create_bucket(None, "config").put("public.motd", "hi".into()).await.unwrap();
    let only_public = |_: &str, target: &str| target.starts_with("public.");
    let gateway =
        common::start_gateway_with(Arc::new(bus), Arc::new(only_public), common::test_config()).await;
    let client = reqwest::Client::new();

    let res = client.get(gateway.url("/kv/config/public.motd")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = client.get(gateway.url("/kv/config/private.key")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_healthz() {
    let gateway = common::start_gateway(Arc::new(MemoryBus::new())).await;
    let res = reqwest::get(gateway.url("/healthz")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_publish_failure_is_internal_error() {
    let bus = MemoryBus::new();
    let gateway = common::start_gateway(Arc::new(bus.clone())).await;
    bus.close();

    let res = reqwest::Client::new()
        .post(gateway.url("/pub/orders"))
        .body("lost")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.text().await.unwrap(), "Internal Server Error");
}

#[tokio::test]
async fn test_request_service_error_404_passes_payload_through() {
    let bus = MemoryBus::new();
    common::spawn_responder(&bus, "svc.lookup", |req| {
        let mut reply = req.with_payload("no such user");
        reply.headers.insert(SERVICE_ERROR_CODE, "404");
        reply
    })
    .await;
    let gateway = common::start_gateway(Arc::new(bus)).await;

    let res = reqwest::Client::new()
        .post(gateway.url("/req/svc/lookup"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "no such user");
}

#[tokio::test]
async fn test_request_does_not_forward_authorization() {
    let bus = MemoryBus::new();
    common::spawn_responder(&bus, "svc.creds", |req| {
        let seen = req.headers.get("authorization").unwrap_or("none").to_string();
        req.with_payload(seen)
    })
    .await;
    let gateway = common::start_gateway(Arc::new(bus)).await;

    let res = reqwest::Client::new()
        .post(gateway.url("/req/svc/creds"))
        .header("authorization", "Bearer secret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), "none");
}

async fn assert_json_bad_request(res: reqwest::Response) {
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.headers()["content-type"], "application/json");
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body.is_string());
}

#[tokio::test]
async fn test_malformed_query_is_json_bad_request() {
    let bus = MemoryBus::new();
    bus.create_bucket(None, "config");
    let gateway = common::start_gateway(Arc::new(bus)).await;

    let res = reqwest::get(gateway.url("/kv/config/k?domain=a&domain=b")).await.unwrap();
    assert_json_bad_request(res).await;
}

#[tokio::test]
async fn test_non_utf8_path_is_json_bad_request() {
    let bus = common::RecordingBus::default();
    let gateway = common::start_gateway(Arc::new(bus.clone())).await;

    let res = reqwest::Client::new()
        .post(gateway.url("/pub/orders/%FF"))
        .send()
        .await
        .unwrap();
    assert_json_bad_request(res).await;
    assert_eq!(bus.operations(), 0);
}

#[tokio::test]
async fn test_publish_rejects_header_injection_in_query() {
    let bus = common::RecordingBus::default();
    let gateway = common::start_gateway(Arc::new(bus.clone())).await;
    let client = reqwest::Client::new();

    for query in ["x=a%0D%0AInjected:%20yes", "bad%3Aname=v", "two%20words=v"] {
        let res = client
            .post(gateway.url(&format!("/pub/orders?{}", query)))
            .send()
            .await
            .unwrap();
        assert_json_bad_request(res).await;
    }
    assert_eq!(bus.operations(), 0);
}

#[tokio::test]
async fn test_kv_without_key_is_not_routed() {
    let bus = MemoryBus::new();
    bus.create_bucket(None, "config");
    let gateway = common::start_gateway(Arc::new(bus)).await;

    let res = reqwest::get(gateway.url("/kv/config/")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
