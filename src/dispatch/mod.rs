//! Signal dispatch
//!
//! Resolves a classified [`Signal`] to its node through the shared
//! [`Topology`] and forwards it over a [`NodeTransport`]. Every forward
//! writes two `NODE_COMMUNICATION` audit records: one when it starts and
//! one with the terminal outcome.
//!
//! Broadcast sends the same signal to every node except the orchestrator.
//! Each target runs under its own timeout, so one slow node cannot hold up
//! the rest, and a failure is reported only in that node's slot.

pub mod transport;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::logging::{AuditEvent, AuditRecord, AuditTrail};
use crate::mesh::{Node, Topology};
use crate::signal::Signal;
use crate::types::QueenError;

pub use transport::{HttpTransport, NodeTransport, DEFAULT_INGEST_PATH, HEALTH_PATH};

/// Action name recorded on dispatch audit records
pub const FORWARD_ACTION: &str = "signal_forward";

/// Outcome of a successful single-node dispatch
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub success: bool,
    /// Display name of the node that accepted the signal
    pub node: String,
    pub received_at: DateTime<Utc>,
    /// Size in bytes of the forwarded JSON body
    pub payload_size: usize,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub response: Value,
}

/// One node's slot in a broadcast
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOutcome {
    pub success: bool,
    pub node: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate broadcast result.
///
/// `success` is true even when some targets failed; inspect `results` for
/// per-node status.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastResult {
    pub success: bool,
    pub results: BTreeMap<String, NodeOutcome>,
}

impl BroadcastResult {
    pub fn delivered(&self) -> usize {
        self.results.values().filter(|o| o.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.delivered()
    }
}

/// Forwards signals to mesh nodes
#[derive(Clone)]
pub struct Dispatcher {
    topology: Arc<Topology>,
    transport: Arc<dyn NodeTransport>,
    audit: AuditTrail,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        topology: Arc<Topology>,
        transport: Arc<dyn NodeTransport>,
        audit: AuditTrail,
        timeout: Duration,
    ) -> Self {
        Self {
            topology,
            transport,
            audit,
            timeout,
        }
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    /// Deliver `signal` to the node its category routes to
    pub async fn dispatch(&self, signal: &Signal) -> Result<DispatchResult, QueenError> {
        let entry = self.topology.routes().resolve(signal.category())?;
        let node = self
            .topology
            .nodes()
            .get(&entry.target)
            .ok_or_else(|| QueenError::UnknownNode(entry.target.clone()))?;

        self.forward(node, signal).await
    }

    /// Deliver `signal` to every node except the orchestrator
    pub async fn broadcast(&self, signal: &Signal) -> BroadcastResult {
        let targets: Vec<&Node> = self.topology.broadcast_targets().collect();
        info!(
            request_id = %signal.request_id(),
            targets = targets.len(),
            "Broadcasting signal"
        );

        let outcomes = join_all(targets.iter().map(|node| async move {
            let outcome = match self.forward(node, signal).await {
                Ok(result) => NodeOutcome {
                    success: true,
                    node: result.node,
                    received_at: Some(result.received_at),
                    error: None,
                },
                Err(e) => NodeOutcome {
                    success: false,
                    node: node.name.clone(),
                    received_at: None,
                    error: Some(e.to_string()),
                },
            };
            (node.key.clone(), outcome)
        }))
        .await;

        BroadcastResult {
            success: true,
            results: outcomes.into_iter().collect(),
        }
    }

    /// One time-bounded delivery with its pair of audit records
    async fn forward(&self, node: &Node, signal: &Signal) -> Result<DispatchResult, QueenError> {
        let body = signal.to_envelope();
        let payload_size = serde_json::to_vec(&body).map(|b| b.len()).unwrap_or(0);

        self.audit
            .record(self.communication(node, signal, "initiated"))
            .await;

        let delivered = match tokio::time::timeout(self.timeout, self.transport.deliver(node, &body)).await {
            Ok(result) => result,
            Err(_) => Err(QueenError::delivery(
                &node.key,
                format!("timed out after {}ms", self.timeout.as_millis()),
            )),
        };

        match delivered {
            Ok(response) => {
                self.audit
                    .record(self.communication(node, signal, "success").with("payloadSize", payload_size))
                    .await;
                info!(
                    request_id = %signal.request_id(),
                    target = %node.key,
                    "Signal delivered"
                );
                Ok(DispatchResult {
                    success: true,
                    node: node.name.clone(),
                    received_at: Utc::now(),
                    payload_size,
                    response,
                })
            }
            Err(e) => {
                warn!(
                    request_id = %signal.request_id(),
                    target = %node.key,
                    "Delivery failed: {}",
                    e
                );
                self.audit
                    .record(self.communication(node, signal, "failed").with("error", e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    fn communication(&self, node: &Node, signal: &Signal, status: &str) -> AuditRecord {
        AuditRecord::new(AuditEvent::NodeCommunication)
            .with("sourceNode", self.topology.orchestrator())
            .with("targetNode", node.key.as_str())
            .with("action", FORWARD_ACTION)
            .with("status", status)
            .with("signalType", signal.category().as_str())
            .with("requestId", signal.request_id())
    }
}

/// Scriptable transport for tests
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy)]
    pub enum Behavior {
        Accept,
        Fail,
        Hang,
    }

    #[derive(Default)]
    pub struct MockTransport {
        behaviors: HashMap<String, Behavior>,
        unhealthy: Vec<String>,
        pub delivered: Mutex<Vec<(String, Value)>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, node: &str, behavior: Behavior) -> Self {
            self.behaviors.insert(node.to_string(), behavior);
            self
        }

        pub fn unhealthy(mut self, node: &str) -> Self {
            self.unhealthy.push(node.to_string());
            self
        }

        pub fn deliveries(&self) -> Vec<(String, Value)> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl NodeTransport for MockTransport {
        async fn deliver(&self, node: &Node, body: &Value) -> Result<Value, QueenError> {
            match self.behaviors.get(&node.key).copied().unwrap_or(Behavior::Accept) {
                Behavior::Accept => {
                    self.delivered
                        .lock()
                        .unwrap()
                        .push((node.key.clone(), body.clone()));
                    Ok(serde_json::json!({"ok": true}))
                }
                Behavior::Fail => Err(QueenError::delivery(&node.key, "connection refused")),
                Behavior::Hang => futures::future::pending().await,
            }
        }

        async fn probe(&self, node: &Node) -> bool {
            !self.unhealthy.contains(&node.key)
        }
    }
}
