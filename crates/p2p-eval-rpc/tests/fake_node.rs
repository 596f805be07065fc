//! RpcClient against an in-process fake node.
//!
//! The fake serves the relay REST routes and `/metrics` from one axum router
//! on an ephemeral port; the same port is used for both REST and metrics.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use p2p_eval_core::RetryPolicy;
use p2p_eval_rpc::{RpcClient, RpcError, WakuMessage};

#[derive(Default)]
struct FakeNode {
    /// Number of `/info` calls to reject with 503 before answering.
    info_failures: u32,
    info_calls: AtomicU32,
    metrics_calls: AtomicU32,
    subscriptions: Mutex<Vec<String>>,
    published: Mutex<Vec<(String, WakuMessage)>>,
}

async fn info(State(node): State<Arc<FakeNode>>) -> Result<Json<serde_json::Value>, StatusCode> {
    let n = node.info_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if n <= node.info_failures {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(Json(serde_json::json!({
        "listenAddresses": [
            "/ip4/127.0.0.1/tcp/60000/p2p/16Uiu2HAm",
            "/ip4/172.18.0.2/tcp/60000/p2p/16Uiu2HAm"
        ],
        "enrUri": "enr:-test"
    })))
}

async fn subscribe(State(node): State<Arc<FakeNode>>, Json(topics): Json<Vec<String>>) -> &'static str {
    node.subscriptions.lock().unwrap().extend(topics);
    "OK"
}

async fn publish(
    State(node): State<Arc<FakeNode>>,
    Path(topic): Path<String>,
    Json(message): Json<WakuMessage>,
) -> &'static str {
    node.published.lock().unwrap().push((topic, message));
    "OK"
}

async fn messages(State(node): State<Arc<FakeNode>>, Path(topic): Path<String>) -> Json<Vec<WakuMessage>> {
    let published = node.published.lock().unwrap();
    Json(
        published
            .iter()
            .filter(|(t, _)| *t == topic)
            .map(|(_, m)| m.clone())
            .collect(),
    )
}

async fn metrics(State(node): State<Arc<FakeNode>>) -> String {
    node.metrics_calls.fetch_add(1, Ordering::SeqCst);
    "# TYPE libp2p_peers gauge\nlibp2p_peers 1.0\n".to_string()
}

async fn spawn_fake(node: Arc<FakeNode>) -> SocketAddr {
    let router = Router::new()
        .route("/info", get(info))
        .route("/relay/v1/subscriptions", post(subscribe))
        .route("/relay/v1/messages/{topic}", post(publish).get(messages))
        .route("/metrics", get(metrics))
        .with_state(node);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr) -> RpcClient {
    RpcClient::new("127.0.0.1", addr.port(), addr.port())
        .with_timeout(Duration::from_secs(2))
        .with_retry_policy(RetryPolicy::new(5, Duration::from_millis(20)))
        .with_metrics_retry_policy(RetryPolicy::new(2, Duration::from_millis(10)))
}

/// A port with nothing listening on it.
async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn info_retries_through_startup_errors() {
    let node = Arc::new(FakeNode {
        info_failures: 2,
        ..Default::default()
    });
    let addr = spawn_fake(node.clone()).await;
    let client = client_for(addr);

    let info = client.info().await.unwrap();
    assert_eq!(info.listen_addresses.len(), 2);
    assert_eq!(
        info.routable_address().unwrap().as_str(),
        "/ip4/172.18.0.2/tcp/60000/p2p/16Uiu2HAm"
    );
    assert_eq!(node.info_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn info_exhaustion_reports_last_status() {
    let node = Arc::new(FakeNode {
        info_failures: u32::MAX,
        ..Default::default()
    });
    let addr = spawn_fake(node.clone()).await;
    let client = client_for(addr);

    let err = client.info().await.unwrap_err();
    assert_eq!(err.operation, "get_info");
    assert_eq!(err.attempts, 5);
    assert!(matches!(
        err.last_error(),
        RpcError::Status { status, .. } if *status == StatusCode::SERVICE_UNAVAILABLE
    ));
    assert_eq!(node.info_calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn subscribe_and_publish_roundtrip() {
    let node = Arc::new(FakeNode::default());
    let addr = spawn_fake(node.clone()).await;
    let client = client_for(addr);
    let topic = "/waku/2/default-waku/proto";

    client.subscribe(&[topic.to_string()]).await.unwrap();
    assert_eq!(*node.subscriptions.lock().unwrap(), vec![topic.to_string()]);

    let message = WakuMessage::new("msg-0-node-0", "num-vs-bw-content-topic");
    client.publish(topic, &message).await.unwrap();

    // The encoded topic arrives decoded on the node side.
    let published = node.published.lock().unwrap().clone();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, topic);
    assert_eq!(published[0].1, message);

    let buffered = client.messages(topic).await.unwrap();
    assert_eq!(buffered, vec![message]);
}

#[tokio::test]
async fn metrics_returns_raw_text() {
    let node = Arc::new(FakeNode::default());
    let addr = spawn_fake(node.clone()).await;
    let client = client_for(addr);

    let text = client.metrics().await.unwrap();
    assert!(text.contains("libp2p_peers 1.0"));
    assert_eq!(node.metrics_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unreachable_node_uses_metrics_budget() {
    let port = closed_port().await;
    let client = RpcClient::new("127.0.0.1", port, port)
        .with_timeout(Duration::from_secs(1))
        .with_metrics_retry_policy(RetryPolicy::new(2, Duration::from_millis(10)));

    let err = client.metrics().await.unwrap_err();
    assert_eq!(err.operation, "get_metrics");
    assert_eq!(err.attempts, 2);
    assert!(err.last_error().is_connection_error());
}
