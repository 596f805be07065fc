//! HTTP client for one node's REST API and metrics endpoint.
//!
//! Uses one pooled hyper client per [`RpcClient`], so repeated calls to the
//! same node reuse keep-alive connections. The pool is released when the
//! client is dropped or [`RpcClient::close`] is called.

use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request, header};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use p2p_eval_core::{NodeEndpoint, RetryPolicy};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::error::{RpcError, RpcResult};
use crate::message::{NodeInfo, WakuMessage};
use crate::retry::with_retry;

const USER_AGENT: &str = "p2p-eval/0.1";

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Retrying client for a node's control plane.
#[derive(Clone)]
pub struct RpcClient {
    base_url: String,
    metrics_url: String,
    http: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
    retry: RetryPolicy,
    metrics_retry: RetryPolicy,
}

impl RpcClient {
    /// Create a client for the node listening on `host`.
    pub fn new(host: &str, rest_port: u16, metrics_port: u16) -> Self {
        let base_url = format!("http://{host}:{rest_port}");
        let metrics_url = format!("http://{host}:{metrics_port}/metrics");
        let http = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .build_http();

        info!(%base_url, %metrics_url, "rpc client initialized");

        Self {
            base_url,
            metrics_url,
            http,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::control_plane(),
            metrics_retry: RetryPolicy::metrics(),
        }
    }

    /// Create a client for a node handed out by the orchestrator.
    pub fn for_endpoint(endpoint: &NodeEndpoint) -> Self {
        Self::new(&endpoint.host, endpoint.rest_port, endpoint.metrics_port)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Budget for the control-plane operations.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Budget for [`RpcClient::metrics`].
    pub fn with_metrics_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.metrics_retry = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn metrics_url(&self) -> &str {
        &self.metrics_url
    }

    /// Release the connection pool.
    pub fn close(self) {
        debug!(base_url = %self.base_url, "rpc client closed");
    }

    /// `GET /info`, one attempt.
    pub async fn try_info(&self) -> Result<NodeInfo, RpcError> {
        let uri = format!("{}/info", self.base_url);
        let body = self.send(Method::GET, &uri, "application/json", None).await?;
        decode(&uri, &body)
    }

    /// `GET /info`.
    pub async fn info(&self) -> RpcResult<NodeInfo> {
        with_retry(self.retry, "get_info", || self.try_info()).await
    }

    /// `POST /relay/v1/subscriptions` with the list of pubsub topics.
    pub async fn subscribe(&self, topics: &[String]) -> RpcResult<()> {
        let uri = format!("{}/relay/v1/subscriptions", self.base_url);
        let uri = uri.as_str();
        with_retry(self.retry, "subscribe", || async move {
            self.post_json(uri, topics, "text/plain").await.map(drop)
        })
        .await
    }

    /// `POST /relay/v1/messages/{topic}`.
    pub async fn publish(&self, topic: &str, message: &WakuMessage) -> RpcResult<()> {
        let uri = format!("{}/relay/v1/messages/{}", self.base_url, encode_segment(topic));
        let uri = uri.as_str();
        with_retry(self.retry, "publish_message", || async move {
            self.post_json(uri, message, "text/plain").await.map(drop)
        })
        .await
    }

    /// `GET /relay/v1/messages/{topic}`: messages buffered since the last call.
    pub async fn messages(&self, topic: &str) -> RpcResult<Vec<WakuMessage>> {
        let uri = format!("{}/relay/v1/messages/{}", self.base_url, encode_segment(topic));
        let uri = uri.as_str();
        with_retry(self.retry, "get_messages", || async move {
            let body = self.send(Method::GET, uri, "application/json", None).await?;
            decode(uri, &body)
        })
        .await
    }

    /// `GET /metrics` on the metrics port, as raw exposition text.
    pub async fn metrics(&self) -> RpcResult<String> {
        with_retry(self.metrics_retry, "get_metrics", || async move {
            let body = self.send(Method::GET, &self.metrics_url, "text/plain", None).await?;
            Ok(String::from_utf8_lossy(&body).into_owned())
        })
        .await
    }

    async fn post_json<T>(&self, uri: &str, payload: &T, accept: &'static str) -> Result<Bytes, RpcError>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(payload).map_err(RpcError::Encode)?;
        self.send(Method::POST, uri, accept, Some(Bytes::from(body))).await
    }

    /// Perform one request, bounded by the client timeout.
    ///
    /// Non-2xx responses are logged with their body and returned as
    /// [`RpcError::Status`].
    async fn send(
        &self,
        method: Method,
        uri: &str,
        accept: &'static str,
        json_body: Option<Bytes>,
    ) -> Result<Bytes, RpcError> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::ACCEPT, accept)
            .header(header::USER_AGENT, USER_AGENT);
        let body = match json_body {
            Some(bytes) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Full::new(bytes)
            }
            None => Full::new(Bytes::new()),
        };
        let req = builder.body(body)?;

        let exchange = async {
            let resp = self.http.request(req).await.map_err(|source| RpcError::Transport {
                uri: uri.to_string(),
                source,
            })?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|source| RpcError::Body {
                    uri: uri.to_string(),
                    source,
                })?
                .to_bytes();

            if !status.is_success() {
                let body = String::from_utf8_lossy(&body).into_owned();
                error!(%uri, status = status.as_u16(), "HTTP error");
                error!(%uri, %body, "response body");
                return Err(RpcError::Status {
                    uri: uri.to_string(),
                    status,
                    body,
                });
            }
            Ok(body)
        };

        let outcome = tokio::time::timeout(self.timeout, exchange).await;
        match outcome {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout {
                uri: uri.to_string(),
                timeout: self.timeout,
            }),
        }
    }
}

fn decode<T: DeserializeOwned>(uri: &str, body: &[u8]) -> Result<T, RpcError> {
    serde_json::from_slice(body).map_err(|source| RpcError::Decode {
        uri: uri.to_string(),
        source,
    })
}

/// Form-style percent-encoding of a single path segment.
///
/// Keeps ASCII alphanumerics and `_.-~`, turns spaces into `+`, and escapes
/// everything else (including `/`) as `%XX`.
pub fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len() * 3);
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'.' | b'-' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
