//! Signal ingress
//!
//! Orchestrates one inbound call end to end:
//!
//! ```text
//! RECEIVED → AUTHENTICATED → CLASSIFIED → DISPATCHED → ACKNOWLEDGED | FAILED
//! ```
//!
//! Each call writes exactly one `SIGNAL_ROUTED` record and hands the signal
//! to the [`Dispatcher`]. Errors never escape: they come back as a failure
//! acknowledgment carrying the request id. Configuration faults are hidden
//! behind an opaque error id and logged in full server-side.

pub mod webhooks;

use hyper::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::auth::{Authenticator, InboundRequest, WebhookCredentials};
use crate::dispatch::{DispatchResult, Dispatcher, NodeOutcome};
use crate::logging::{AuditEvent, AuditRecord, AuditTrail};
use crate::mesh::{Topology, WebhookProvider};
use crate::signal::{Priority, Signal, SignalCategory};
use crate::types::QueenError;

pub use webhooks::{extract_webhook, WebhookEvent};

/// Models consulted when an intelligence signal names none
pub const DEFAULT_MODELS: [&str; 3] = ["claude", "gpt", "grok"];

/// Target reported for broadcasts
pub const BROADCAST_TARGET: &str = "All Nodes";

/// Message shown to callers instead of configuration detail
pub const OPAQUE_ERROR: &str = "Internal configuration error";

/// Acknowledgment for a signal submission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DispatchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<BTreeMap<String, NodeOutcome>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_id: Option<String>,
    pub request_id: String,
}

impl SignalAck {
    fn failed(request_id: &str, failure: Failure) -> Self {
        Self {
            success: false,
            routed: None,
            target: None,
            result: None,
            results: None,
            error: Some(failure.message),
            error_id: failure.error_id,
            request_id: request_id.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        if self.success {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Acknowledgment for a provider webhook
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub success: bool,
    pub received: bool,
    /// Category the event classified to
    pub routed: SignalCategory,
    /// Unset when the category has no route
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Provider-specific echo (event, delivery, type)
    #[serde(flatten)]
    pub details: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DispatchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_id: Option<String>,
    pub request_id: String,
}

impl WebhookAck {
    pub fn status_code(&self) -> StatusCode {
        if self.success {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Caller-facing view of an error
struct Failure {
    message: String,
    error_id: Option<String>,
}

/// Entry point for signals and webhooks
#[derive(Clone)]
pub struct SignalIngress {
    topology: Arc<Topology>,
    dispatcher: Dispatcher,
    authenticator: Authenticator,
    credentials: WebhookCredentials,
    audit: AuditTrail,
}

impl SignalIngress {
    pub fn new(
        dispatcher: Dispatcher,
        authenticator: Authenticator,
        credentials: WebhookCredentials,
        audit: AuditTrail,
    ) -> Self {
        Self {
            topology: Arc::clone(dispatcher.topology()),
            dispatcher,
            authenticator,
            credentials,
            audit,
        }
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn credentials(&self) -> &WebhookCredentials {
        &self.credentials
    }

    /// Submit a signal for `category` from a `{source?, data?}` body
    pub async fn submit(&self, category: SignalCategory, body: &Value, request_id: &str) -> SignalAck {
        let outcome = if category.is_routable() {
            self.route(category, body, request_id).await
        } else {
            Ok(self.broadcast(body, request_id).await)
        };

        match outcome {
            Ok(ack) => ack,
            Err(e) => SignalAck::failed(request_id, self.failure(&e, request_id).await),
        }
    }

    async fn route(
        &self,
        category: SignalCategory,
        body: &Value,
        request_id: &str,
    ) -> Result<SignalAck, QueenError> {
        let entry = self.topology.routes().resolve(category)?;
        let source = body_source(body).unwrap_or("unknown");

        let mut payload = Map::new();
        let mut record = AuditRecord::new(AuditEvent::SignalRouted);

        if category == SignalCategory::Intelligence {
            let models = body
                .get("models")
                .filter(|m| m.is_array())
                .cloned()
                .unwrap_or_else(|| Value::from(DEFAULT_MODELS.to_vec()));
            let query = body
                .get("query")
                .filter(|q| !q.is_null())
                .or_else(|| body.get("data"))
                .cloned()
                .unwrap_or(Value::Null);
            let consensus = body.get("consensus") != Some(&Value::Bool(false));

            record = record.with("models", models.clone());
            payload.insert("query".into(), query);
            payload.insert("models".into(), models);
            payload.insert("consensusRequired".into(), Value::Bool(consensus));
        } else {
            payload.insert("data".into(), body_data(body));
        }

        let signal = Signal::new(category, source, payload, request_id, entry.priority);
        if !entry.accepts_source(signal.source()) {
            debug!(
                request_id = %request_id,
                source = %signal.source(),
                "Source is not among the route's accepted labels"
            );
        }

        record = record
            .with("signalType", category.as_str())
            .with("source", signal.source())
            .with("target", entry.target.as_str())
            .with("requestId", request_id)
            .with("priority", entry.priority.as_str());
        if let Some(ref mode) = entry.mode {
            record = record.with("mode", mode.as_str());
        }
        self.audit.record_signal(record).await;
        info!(
            request_id = %request_id,
            "[SIGNAL] {} from {} -> {}",
            category,
            signal.source(),
            entry.target
        );

        let result = self.dispatcher.dispatch(&signal).await?;

        Ok(SignalAck {
            success: true,
            routed: Some(true),
            target: Some(self.topology.target_label(entry)),
            result: Some(result),
            results: None,
            error: None,
            error_id: None,
            request_id: request_id.to_string(),
        })
    }

    async fn broadcast(&self, body: &Value, request_id: &str) -> SignalAck {
        let source = body_source(body).unwrap_or("unknown");
        let mut payload = Map::new();
        payload.insert("data".into(), body_data(body));

        let signal = Signal::new(
            SignalCategory::Broadcast,
            source,
            payload,
            request_id,
            Priority::Normal,
        );

        self.audit
            .record_signal(
                AuditRecord::new(AuditEvent::SignalRouted)
                    .with("signalType", SignalCategory::Broadcast.as_str())
                    .with("source", signal.source())
                    .with("target", "all")
                    .with("requestId", request_id)
                    .with("priority", Priority::Normal.as_str()),
            )
            .await;

        let outcome = self.dispatcher.broadcast(&signal).await;
        info!(
            request_id = %request_id,
            delivered = outcome.delivered(),
            failed = outcome.failed(),
            "Broadcast complete"
        );

        SignalAck {
            success: outcome.success,
            routed: Some(true),
            target: Some(BROADCAST_TARGET.to_string()),
            result: None,
            results: Some(outcome.results),
            error: None,
            error_id: None,
            request_id: request_id.to_string(),
        }
    }

    /// Authenticate, classify and dispatch one provider webhook.
    ///
    /// Disabled providers yield `NotFound`, failed verification
    /// `Unauthorized` and unparseable bodies `BadRequest`. Once the event is
    /// classified, dispatch failures come back inside the ack.
    pub async fn receive_webhook(
        &self,
        provider: WebhookProvider,
        request: &InboundRequest<'_>,
        request_id: &str,
    ) -> Result<WebhookAck, QueenError> {
        let source = self.topology.webhooks().get(provider);
        if !source.enabled {
            return Err(QueenError::NotFound(format!("{} webhook is disabled", provider)));
        }

        let verification = self.credentials.verification_for(provider, source.verification);
        self.authenticator
            .verify(&provider.auth_label(), &verification, request)
            .await?;

        let body: Value = if request.body.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Map::new())
        } else {
            serde_json::from_slice(request.body)?
        };

        let event = extract_webhook(provider, request.headers, &body, request_id);

        self.audit
            .record(
                AuditRecord::new(AuditEvent::WebhookReceived)
                    .with("webhookType", provider.as_str())
                    .with("payload", Value::Object(event.summary.clone()))
                    .with("status", "received")
                    .with("requestId", request_id),
            )
            .await;

        match self.route_webhook(&event, request_id).await {
            Ok((target, result)) => Ok(WebhookAck {
                success: true,
                received: true,
                routed: event.category,
                target: Some(target),
                details: event.details,
                result: Some(result),
                error: None,
                error_id: None,
                request_id: request_id.to_string(),
            }),
            Err((target, e)) => {
                let failure = self.failure(&e, request_id).await;
                Ok(WebhookAck {
                    success: false,
                    received: true,
                    routed: event.category,
                    target,
                    details: event.details,
                    result: None,
                    error: Some(failure.message),
                    error_id: failure.error_id,
                    request_id: request_id.to_string(),
                })
            }
        }
    }

    async fn route_webhook(
        &self,
        event: &WebhookEvent,
        request_id: &str,
    ) -> Result<(String, DispatchResult), (Option<String>, QueenError)> {
        let entry = self
            .topology
            .routes()
            .resolve(event.category)
            .map_err(|e| (None, e))?;
        let target = self.topology.target_label(entry);

        let signal = Signal::new(
            event.category,
            event.source.clone(),
            event.payload.clone(),
            request_id,
            entry.priority,
        );

        let mut record = AuditRecord::new(AuditEvent::SignalRouted)
            .with("signalType", event.category.as_str())
            .with("source", signal.source())
            .with("target", entry.target.as_str())
            .with("requestId", request_id)
            .with("priority", entry.priority.as_str())
            .with_all(event.routing.clone());
        if let Some(ref mode) = entry.mode {
            record = record.with("mode", mode.as_str());
        }
        self.audit.record_signal(record).await;
        info!(
            request_id = %request_id,
            "[SIGNAL] {} from {} -> {}",
            event.category,
            signal.source(),
            entry.target
        );

        match self.dispatcher.dispatch(&signal).await {
            Ok(result) => Ok((target, result)),
            Err(e) => Err((Some(target), e)),
        }
    }

    /// Turn an error into what the caller may see
    async fn failure(&self, e: &QueenError, request_id: &str) -> Failure {
        if e.is_caller_visible() {
            return Failure {
                message: e.to_string(),
                error_id: None,
            };
        }

        let error_id = Uuid::new_v4().to_string();
        error!(
            request_id = %request_id,
            error_id = %error_id,
            "Routing fault: {}",
            e
        );
        self.audit
            .record(
                AuditRecord::new(AuditEvent::Error)
                    .with("errorId", error_id.as_str())
                    .with("message", e.to_string())
                    .with("requestId", request_id),
            )
            .await;

        Failure {
            message: OPAQUE_ERROR.to_string(),
            error_id: Some(error_id),
        }
    }
}

fn body_source(body: &Value) -> Option<&str> {
    body.get("source")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// `data` when present, else the whole body
fn body_data(body: &Value) -> Value {
    match body.get("data") {
        Some(data) if !data.is_null() => data.clone(),
        _ => body.clone(),
    }
}
