//! Integration tests for the HTTP API
//!
//! Requests are driven through the router with `oneshot`, backed by the
//! in-memory broker.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use streamgate_api::{create_router, AppState};
use streamgate_core::{
    DeliverySemantic, HandleCache, HandleCacheConfig, MemoryBroker, Publisher, ShardSelector,
    TopicKey,
};
use tower::ServiceExt;

const PRODUCE_PATH: &str = "/v1/pulsar/tenants/public/namespaces/default/topics/orders/produce";

fn test_app(shard_count: u32) -> (Router, MemoryBroker) {
    let broker = MemoryBroker::new();
    let cache = HandleCache::new(Arc::new(broker.clone()), HandleCacheConfig::default());
    let publisher = Publisher::new(
        cache,
        ShardSelector::new(shard_count),
        DeliverySemantic::AtLeastOnce,
    );
    let router = create_router(AppState {
        publisher: Arc::new(publisher),
    });
    (router, broker)
}

fn produce_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(PRODUCE_PATH)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

#[tokio::test]
async fn test_produce_returns_cost_time() {
    let (app, broker) = test_app(0);

    let response = app
        .oneshot(produce_request(r#"{"msg": "hello"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(json["costTime"].as_i64().unwrap() >= 0);

    let key = TopicKey::new("public", "default", "orders");
    assert_eq!(broker.messages(&key), vec![bytes_of("hello")]);
}

#[tokio::test]
async fn test_empty_message_is_bad_request() {
    let (app, broker) = test_app(0);

    let response = app
        .oneshot(produce_request(r#"{"msg": ""}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_bytes(response).await.is_empty());
    assert_eq!(broker.producers_created(), 0);
}

#[tokio::test]
async fn test_missing_message_is_bad_request() {
    let (app, _broker) = test_app(0);

    let response = app.oneshot(produce_request("{}")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unavailable_topic_is_server_error() {
    let (app, broker) = test_app(0);
    broker.fail_topic(&TopicKey::new("public", "default", "orders"));

    let response = app
        .oneshot(produce_request(r#"{"msg": "hello"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_sharded_produce_spreads_over_physical_topics() {
    let (app, broker) = test_app(3);

    for i in 0..6 {
        let response = app
            .clone()
            .oneshot(produce_request(&format!(r#"{{"msg": "m{}"}}"#, i)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let topics: Vec<String> = broker
        .topics()
        .iter()
        .map(|t| t.topic().to_string())
        .collect();
    assert_eq!(topics, vec!["orders_0", "orders_1", "orders_2"]);
    for topic in broker.topics() {
        assert_eq!(broker.messages(&topic).len(), 2);
    }
}

#[tokio::test]
async fn test_health_endpoints() {
    let (app, _broker) = test_app(0);

    for path in ["/health", "/live"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_ready_reports_cached_handles() {
    let (app, _broker) = test_app(0);

    let response = app
        .clone()
        .oneshot(produce_request(r#"{"msg": "hello"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["status"], "ready");
    assert!(json["cached_handles"].is_u64());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    streamgate_observability::init();
    let (app, _broker) = test_app(0);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_openapi_document() {
    let (app, _broker) = test_app(0);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(json["paths"][
        "/v1/pulsar/tenants/{tenant}/namespaces/{namespace}/topics/{topic}/produce"
    ]
    .is_object());
}

fn bytes_of(s: &str) -> axum::body::Bytes {
    axum::body::Bytes::copy_from_slice(s.as_bytes())
}
