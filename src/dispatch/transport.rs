//! Outbound transport to mesh nodes

use bytes::Bytes;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::mesh::Node;
use crate::types::QueenError;

/// Default sub-path every node accepts routed signals on
pub const DEFAULT_INGEST_PATH: &str = "/ingest";

/// Path probed for node health
pub const HEALTH_PATH: &str = "/health";

/// How signals physically reach a node (allows mocking in tests)
#[async_trait::async_trait]
pub trait NodeTransport: Send + Sync {
    /// Deliver a routed body and return the node's structured response
    async fn deliver(&self, node: &Node, body: &Value) -> Result<Value, QueenError>;

    /// Whether the node answers its health endpoint
    async fn probe(&self, node: &Node) -> bool;
}

/// Production transport: JSON over HTTP POST
pub struct HttpTransport {
    client: reqwest::Client,
    ingest_path: String,
    probe_timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        request_timeout: Duration,
        probe_timeout: Duration,
        ingest_path: impl Into<String>,
    ) -> Result<Self, QueenError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| QueenError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            ingest_path: ingest_path.into(),
            probe_timeout,
        })
    }
}

#[async_trait::async_trait]
impl NodeTransport for HttpTransport {
    async fn deliver(&self, node: &Node, body: &Value) -> Result<Value, QueenError> {
        let url = node.endpoint(&self.ingest_path);
        debug!(target_node = %node.key, %url, "Forwarding signal");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| QueenError::delivery(&node.key, e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| QueenError::delivery(&node.key, e.to_string()))?;

        if !status.is_success() {
            return Err(QueenError::delivery(
                &node.key,
                format!("node answered HTTP {}", status.as_u16()),
            ));
        }

        Ok(parse_response(bytes))
    }

    async fn probe(&self, node: &Node) -> bool {
        match self
            .client
            .get(node.endpoint(HEALTH_PATH))
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(target_node = %node.key, "Health probe failed: {}", e);
                false
            }
        }
    }
}

/// Structured body if the node sent JSON, its text otherwise
fn parse_response(bytes: Bytes) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{BodyExt, Full};
    use hyper::body::Incoming;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Method, Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use serde_json::json;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    /// Minimal node: echoes /ingest bodies, answers /health, 500 elsewhere
    async fn spawn_node() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let service = service_fn(|req: Request<Incoming>| async move {
                        let path = req.uri().path().to_string();
                        let response = match (req.method().clone(), path.as_str()) {
                            (Method::POST, "/ingest") => {
                                let body = req.into_body().collect().await.unwrap().to_bytes();
                                let received: Value = serde_json::from_slice(&body).unwrap();
                                let reply = json!({"accepted": true, "type": received["type"]});
                                Response::new(Full::new(Bytes::from(reply.to_string())))
                            }
                            (Method::GET, "/health") => Response::new(Full::new(Bytes::from("ok"))),
                            _ => {
                                let mut response = Response::new(Full::new(Bytes::new()));
                                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                                response
                            }
                        };
                        Ok::<_, Infallible>(response)
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        addr
    }

    fn node_at(url: String) -> Node {
        Node {
            key: "knowledge".into(),
            name: "Knowledge".into(),
            role: "academic".into(),
            url,
            description: String::new(),
            features: vec![],
        }
    }

    fn transport(ingest: &str) -> HttpTransport {
        HttpTransport::new(Duration::from_secs(2), Duration::from_millis(500), ingest).unwrap()
    }

    #[tokio::test]
    async fn test_deliver_posts_json_to_ingest() {
        let addr = spawn_node().await;
        let node = node_at(format!("http://{}", addr));

        let reply = transport(DEFAULT_INGEST_PATH)
            .deliver(&node, &json!({"type": "academic", "source": "test"}))
            .await
            .unwrap();

        assert_eq!(reply["accepted"], true);
        assert_eq!(reply["type"], "academic");
    }

    #[tokio::test]
    async fn test_error_status_is_delivery_failure() {
        let addr = spawn_node().await;
        let node = node_at(format!("http://{}/", addr));

        let err = transport("/elsewhere")
            .deliver(&node, &json!({}))
            .await
            .unwrap_err();

        match err {
            QueenError::DeliveryFailed { node, reason } => {
                assert_eq!(node, "knowledge");
                assert!(reason.contains("500"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_node_is_delivery_failure() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let node = node_at(format!("http://{}", addr));
        let transport = transport(DEFAULT_INGEST_PATH);

        assert!(matches!(
            transport.deliver(&node, &json!({})).await,
            Err(QueenError::DeliveryFailed { .. })
        ));
        assert!(!transport.probe(&node).await);
    }

    #[tokio::test]
    async fn test_probe_healthy_node() {
        let addr = spawn_node().await;
        let node = node_at(format!("http://{}", addr));
        assert!(transport(DEFAULT_INGEST_PATH).probe(&node).await);
    }

    #[test]
    fn test_parse_response_fallbacks() {
        assert_eq!(parse_response(Bytes::new()), Value::Null);
        assert_eq!(parse_response(Bytes::from("{\"a\":1}"))["a"], 1);
        assert_eq!(parse_response(Bytes::from("plain")), json!("plain"));
    }
}
