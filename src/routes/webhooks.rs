//! Provider webhook endpoints
//!
//! - POST /webhooks/{github,zapier,discord,snhu,thread}
//! - GET  /webhooks/status

use bytes::Bytes;
use http_body_util::Full;
use hyper::{HeaderMap, Response, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;

use super::{error_response, json_response};
use crate::auth::InboundRequest;
use crate::mesh::{VerificationKind, WebhookProvider};
use crate::server::AppState;

/// Verify, classify and dispatch one webhook delivery
pub async fn handle_webhook(
    state: &AppState,
    provider: WebhookProvider,
    headers: &HeaderMap,
    query: Option<&str>,
    body: &[u8],
    request_id: &str,
) -> Response<Full<Bytes>> {
    let request = InboundRequest {
        headers,
        query,
        body,
    };

    match state.ingress.receive_webhook(provider, &request, request_id).await {
        Ok(ack) => json_response(ack.status_code(), &ack),
        Err(e) => error_response(e.status_code(), &e.to_string(), request_id),
    }
}

#[derive(Serialize)]
struct EndpointStatus {
    path: String,
    enabled: bool,
    verification: VerificationKind,
    /// Whether the verification secret is configured
    configured: bool,
}

#[derive(Serialize)]
struct WebhookStatus {
    status: &'static str,
    endpoints: BTreeMap<WebhookProvider, EndpointStatus>,
    timestamp: String,
}

/// Enabled flag and verification mode per webhook path
pub fn webhook_status(state: &AppState) -> Response<Full<Bytes>> {
    let webhooks = state.topology.webhooks();
    let credentials = state.ingress.credentials();

    let endpoints = WebhookProvider::ALL
        .iter()
        .map(|provider| {
            let source = webhooks.get(*provider);
            let configured = source.verification == VerificationKind::None
                || credentials.has_secret(*provider);
            (
                *provider,
                EndpointStatus {
                    path: provider.webhook_path(),
                    enabled: source.enabled,
                    verification: source.verification,
                    configured,
                },
            )
        })
        .collect();

    json_response(
        StatusCode::OK,
        &WebhookStatus {
            status: "operational",
            endpoints,
            timestamp: chrono::Utc::now().to_rfc3339(),
        },
    )
}
