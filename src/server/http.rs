//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Each request is given
//! a fresh request id, audited, and admitted before it is routed. Panics
//! inside a handler are caught at the boundary and answered with an opaque
//! 500 carrying an error id.

use bytes::Bytes;
use futures::FutureExt;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER, USER_AGENT};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{Map, Value};
use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::admission::{self, Admission, AdmissionClass, FixedWindowLimiter, Rejection};
use crate::auth::{
    AppCredentialIssuer, Authenticator, Verification, WebhookCredentials, API_KEY_HEADER,
    API_KEY_PARAM, WEBHOOK_TOKEN_PARAM,
};
use crate::config::Args;
use crate::dispatch::{Dispatcher, HttpTransport, NodeTransport};
use crate::ingress::SignalIngress;
use crate::logging::{AuditEvent, AuditRecord, AuditTrail};
use crate::mesh::{Topology, WebhookProvider};
use crate::routes::{self, error_response, json_response};
use crate::signal::SignalCategory;
use crate::types::QueenError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Correlation header set on every response
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Query parameters whose values never reach the audit trail
const SECRET_PARAMS: [&str; 2] = [API_KEY_PARAM, WEBHOOK_TOKEN_PARAM];

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Node roster, routing table and webhook sources (read-only)
    pub topology: Arc<Topology>,
    /// Signal and webhook entry points
    pub ingress: SignalIngress,
    /// Outbound transport, shared with the dispatcher for health probes
    pub transport: Arc<dyn NodeTransport>,
    pub audit: AuditTrail,
    pub admission: Arc<dyn Admission>,
    /// Guard for credential issuance
    pub api_key: Verification,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the routing path from configuration using the HTTP transport
    pub fn new(args: Args, topology: Topology, audit: AuditTrail) -> Result<Self, QueenError> {
        let transport = HttpTransport::new(
            args.dispatch_timeout(),
            args.probe_timeout(),
            args.ingest_path.clone(),
        )?;
        Ok(Self::with_transport(args, topology, audit, Arc::new(transport)))
    }

    /// Wire the routing path over an explicit transport
    pub fn with_transport(
        args: Args,
        topology: Topology,
        audit: AuditTrail,
        transport: Arc<dyn NodeTransport>,
    ) -> Self {
        let topology = Arc::new(topology);

        let dispatcher = Dispatcher::new(
            Arc::clone(&topology),
            Arc::clone(&transport),
            audit.clone(),
            args.dispatch_timeout(),
        );

        let authenticator = Authenticator::new(args.dev_mode, audit.clone()).with_app_issuer(
            AppCredentialIssuer::new(
                args.github_app_id.clone(),
                args.github_private_key_path.clone(),
            ),
        );

        let credentials = WebhookProvider::ALL
            .iter()
            .fold(WebhookCredentials::new(), |credentials, provider| {
                credentials.with(*provider, args.webhook_secret(*provider))
            });

        let ingress = SignalIngress::new(dispatcher, authenticator, credentials, audit.clone());

        let admission: Arc<dyn Admission> = Arc::new(FixedWindowLimiter::new(
            args.rate_limit.window(),
            args.rate_limit.thresholds(),
        ));

        let api_key = Verification::static_token(API_KEY_HEADER, API_KEY_PARAM, args.api_key.clone());

        Self {
            args,
            topology,
            ingress,
            transport,
            audit,
            admission,
            api_key,
            started_at: Instant::now(),
        }
    }

    /// Replace the admission policy
    pub fn with_admission(mut self, admission: Arc<dyn Admission>) -> Self {
        self.admission = admission;
        self
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), QueenError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Queen listening on {} ({} mode)",
        state.args.listen,
        state.args.mode()
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - unconfigured webhook sources skip verification");
    }

    admission::spawn_cleanup_task(Arc::clone(&state.admission));

    serve(listener, state).await;
    Ok(())
}

/// Accept connections on `listener` until the process exits
pub async fn serve(listener: TcpListener, state: Arc<AppState>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Assign the request id and run the request behind the panic boundary
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let request_id = uuid::Uuid::new_v4().to_string();

    let outcome = AssertUnwindSafe(process(&state, addr, req, &request_id))
        .catch_unwind()
        .await;

    let mut response = match outcome {
        Ok(response) => response,
        Err(panic) => internal_error(&state, &request_id, &panic_message(panic.as_ref())).await,
    };

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    Ok(to_boxed(response))
}

async fn process(
    state: &AppState,
    addr: SocketAddr,
    req: Request<Incoming>,
    request_id: &str,
) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let method = parts.method;
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().map(str::to_string);
    let headers = parts.headers;
    let ip = addr.ip().to_string();

    debug!(request_id = %request_id, "[{}] {} {}", ip, method, path);

    state
        .audit
        .record(
            AuditRecord::new(AuditEvent::Request)
                .with("requestId", request_id)
                .with("method", method.as_str())
                .with("path", path.as_str())
                .with("query", redacted_query(query.as_deref()))
                .with("ip", ip.as_str())
                .with("userAgent", header_str(&headers, USER_AGENT))
                .with("contentType", header_str(&headers, CONTENT_TYPE)),
        )
        .await;

    let class = admission_class(&path);
    if let Err(rejection) = state.admission.admit(class, &ip) {
        warn!(request_id = %request_id, ?class, %ip, "Request rejected by admission control");
        return too_many_requests(rejection);
    }

    let body = match Limited::new(body, state.args.max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large",
                request_id,
            );
        }
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Failed to read request body: {}", e),
                request_id,
            );
        }
    };

    let query = query.as_deref();

    match (method.clone(), path.as_str()) {
        (Method::GET, "/") => routes::queen_status(state),

        (Method::GET, "/health") => routes::health_check(state),
        (Method::GET, "/health/detailed") => routes::detailed_health(state),
        (Method::GET, "/health/live") => routes::liveness_check(),
        (Method::GET, "/health/ready") => routes::readiness_check(state),
        (Method::GET, "/health/nodes") => routes::node_health(state).await,

        (Method::GET, "/signals/routes") => routes::route_table(state),
        (Method::GET, "/webhooks/status") => routes::webhook_status(state),

        (Method::POST, "/auth/app-token") => {
            routes::issue_app_token(state, &headers, query, request_id).await
        }

        (Method::POST, p) => {
            if let Some(category) = p
                .strip_prefix("/signals/")
                .and_then(|c| c.parse::<SignalCategory>().ok())
            {
                routes::handle_signal(state, category, &body, request_id).await
            } else if let Some(provider) = p
                .strip_prefix("/webhooks/")
                .and_then(WebhookProvider::from_path_segment)
            {
                routes::handle_webhook(state, provider, &headers, query, &body, request_id).await
            } else {
                not_found(state, &method, &path, request_id).await
            }
        }

        _ => not_found(state, &method, &path, request_id).await,
    }
}

/// Traffic class used for admission
fn admission_class(path: &str) -> AdmissionClass {
    if path.starts_with("/signals/") {
        AdmissionClass::Signal
    } else if path.starts_with("/webhooks/") {
        AdmissionClass::Webhook
    } else if path.starts_with("/auth/") {
        AdmissionClass::Authenticated
    } else {
        AdmissionClass::General
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Query parameters as a JSON object, with token values masked
fn redacted_query(query: Option<&str>) -> Value {
    let pairs: Vec<(String, String)> = query
        .and_then(|q| serde_urlencoded::from_str(q).ok())
        .unwrap_or_default();

    let map: Map<String, Value> = pairs
        .into_iter()
        .map(|(key, value)| {
            let value = if SECRET_PARAMS.contains(&key.as_str()) {
                "[redacted]".to_string()
            } else {
                value
            };
            (key, Value::String(value))
        })
        .collect();

    Value::Object(map)
}

async fn not_found(
    state: &AppState,
    method: &Method,
    path: &str,
    request_id: &str,
) -> Response<Full<Bytes>> {
    state
        .audit
        .record(
            AuditRecord::new(AuditEvent::NotFound)
                .with("requestId", request_id)
                .with("method", method.as_str())
                .with("path", path),
        )
        .await;

    routes::not_found(path, request_id)
}

fn too_many_requests(rejection: Rejection) -> Response<Full<Bytes>> {
    let (error, message) = rejection.class.rejection_text();
    // Round up so a client never retries inside the window
    let retry_after = rejection.retry_after.as_secs()
        + u64::from(rejection.retry_after.subsec_nanos() > 0);

    let mut response = json_response(
        StatusCode::TOO_MANY_REQUESTS,
        &serde_json::json!({
            "error": error,
            "message": message,
            "retryAfter": retry_after,
        }),
    );
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

/// Opaque 500 for anything that escaped a handler
async fn internal_error(state: &AppState, request_id: &str, detail: &str) -> Response<Full<Bytes>> {
    let error_id = uuid::Uuid::new_v4().to_string();

    error!(
        request_id = %request_id,
        error_id = %error_id,
        "Unhandled error: {}",
        detail
    );

    state
        .audit
        .record(
            AuditRecord::new(AuditEvent::Error)
                .with("requestId", request_id)
                .with("errorId", error_id.as_str())
                .with("message", detail),
        )
        .await;

    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        &serde_json::json!({
            "error": "Internal server error",
            "errorId": error_id,
            "requestId": request_id,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    )
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::MockTransport;
    use crate::mesh::{MeshConfig, Node};
    use clap::Parser;
    use serde_json::json;

    fn state_with(extra: &[&str], transport: Arc<dyn NodeTransport>) -> AppState {
        let mut argv = vec!["queen"];
        argv.extend_from_slice(extra);
        let args = Args::try_parse_from(argv).unwrap();
        let topology = Topology::from_config(MeshConfig::default(), |_| None).unwrap();
        AppState::with_transport(args, topology, AuditTrail::in_memory(), transport)
    }

    fn state(extra: &[&str]) -> AppState {
        state_with(extra, Arc::new(MockTransport::new()))
    }

    async fn spawn(state: AppState) -> (String, Arc<AppState>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(state);
        tokio::spawn(serve(listener, Arc::clone(&state)));
        (format!("http://{}", addr), state)
    }

    struct PanickingTransport;

    #[async_trait::async_trait]
    impl NodeTransport for PanickingTransport {
        async fn deliver(&self, _node: &Node, _body: &Value) -> Result<Value, QueenError> {
            panic!("transport exploded");
        }

        async fn probe(&self, _node: &Node) -> bool {
            true
        }
    }

    #[test]
    fn test_admission_class_by_path() {
        assert_eq!(admission_class("/signals/academic"), AdmissionClass::Signal);
        assert_eq!(admission_class("/webhooks/github"), AdmissionClass::Webhook);
        assert_eq!(admission_class("/auth/app-token"), AdmissionClass::Authenticated);
        assert_eq!(admission_class("/health"), AdmissionClass::General);
    }

    #[test]
    fn test_query_tokens_are_redacted() {
        let query = redacted_query(Some("token=zap&apiKey=k&page=2"));
        assert_eq!(query["token"], "[redacted]");
        assert_eq!(query["apiKey"], "[redacted]");
        assert_eq!(query["page"], "2");
        assert_eq!(redacted_query(None), json!({}));
    }

    #[tokio::test]
    async fn test_signal_round_trip_carries_request_id() {
        let (base, state) = spawn(state(&[])).await;

        let response = reqwest::Client::new()
            .post(format!("{}/signals/academic", base))
            .json(&json!({"source": "test", "data": {"message": "x"}}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let header = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap();

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["target"], "Knowledge Node");
        assert_eq!(body["requestId"], header.as_str());

        let requests = state.audit.records_of(AuditEvent::Request).await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].field("path"), Some(&json!("/signals/academic")));
        assert_eq!(requests[0].field("requestId"), Some(&json!(header)));
    }

    #[tokio::test]
    async fn test_unknown_path_is_audited_not_found() {
        let (base, state) = spawn(state(&[])).await;

        let response = reqwest::get(format!("{}/nowhere", base)).await.unwrap();
        assert_eq!(response.status(), 404);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Endpoint not found");
        assert_eq!(body["path"], "/nowhere");

        assert_eq!(state.audit.records_of(AuditEvent::NotFound).await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_signal_category_is_not_found() {
        let (base, _state) = spawn(state(&[])).await;

        let response = reqwest::Client::new()
            .post(format!("{}/signals/cooking", base))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_signal_admission_rejects_over_threshold() {
        let (base, _state) = spawn(state(&["--rate-limit-signal", "1"])).await;
        let client = reqwest::Client::new();

        let first = client
            .post(format!("{}/signals/academic", base))
            .json(&json!({"data": {}}))
            .send()
            .await
            .unwrap();
        assert_eq!(first.status(), 200);

        let second = client
            .post(format!("{}/signals/academic", base))
            .json(&json!({"data": {}}))
            .send()
            .await
            .unwrap();
        assert_eq!(second.status(), 429);
        assert!(second.headers().contains_key(RETRY_AFTER));

        let body: Value = second.json().await.unwrap();
        assert_eq!(body["error"], "Too many signal requests");
        assert!(body["retryAfter"].as_u64().unwrap() > 0);

        // Other classes keep their own budget
        let health = client.get(format!("{}/health", base)).send().await.unwrap();
        assert_eq!(health.status(), 200);
    }

    #[tokio::test]
    async fn test_admission_policy_is_replaceable() {
        let state = state(&["--rate-limit-signal", "1"]).with_admission(Arc::new(admission::Unlimited));
        let (base, _state) = spawn(state).await;
        let client = reqwest::Client::new();

        for _ in 0..3 {
            let response = client
                .post(format!("{}/signals/academic", base))
                .json(&json!({"data": {}}))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 200);
        }
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let (base, _state) = spawn(state(&["--max-body-bytes", "16"])).await;

        let response = reqwest::Client::new()
            .post(format!("{}/signals/academic", base))
            .json(&json!({"data": {"message": "far more than sixteen bytes"}}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 413);
    }

    #[tokio::test]
    async fn test_webhook_status_lists_providers() {
        let (base, _state) = spawn(state(&["--github-webhook-secret", "s"])).await;

        let body: Value = reqwest::get(format!("{}/webhooks/status", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["status"], "operational");
        assert_eq!(body["endpoints"]["github"]["path"], "/webhooks/github");
        assert_eq!(body["endpoints"]["github"]["configured"], true);
        assert_eq!(body["endpoints"]["zapier"]["configured"], false);
    }

    #[tokio::test]
    async fn test_app_token_requires_api_key() {
        let (base, state) = spawn(state(&["--api-key", "k"])).await;

        let response = reqwest::Client::new()
            .post(format!("{}/auth/app-token", base))
            .header(API_KEY_HEADER, "wrong")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401);
        assert_eq!(state.audit.records_of(AuditEvent::AuthFailure).await.len(), 1);
    }

    #[tokio::test]
    async fn test_app_token_without_key_file_is_unavailable() {
        let (base, _state) = spawn(state(&[
            "--api-key",
            "k",
            "--github-private-key-path",
            "/nonexistent/key.pem",
        ]))
        .await;

        let response = reqwest::Client::new()
            .post(format!("{}/auth/app-token?apiKey=k", base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 503);
    }

    #[tokio::test]
    async fn test_app_token_issued_with_valid_key() {
        let key = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/app-key.pem");
        let (base, _state) = spawn(state(&[
            "--api-key",
            "k",
            "--github-app-id",
            "42",
            "--github-private-key-path",
            key,
        ]))
        .await;

        let response = reqwest::Client::new()
            .post(format!("{}/auth/app-token", base))
            .header(API_KEY_HEADER, "k")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["appId"], "42");
        assert!(body["token"].as_str().is_some_and(|t| t.split('.').count() == 3));
        assert!(body["requestId"].is_string());
    }

    #[tokio::test]
    async fn test_panic_becomes_opaque_error() {
        let (base, state) = spawn(state_with(&[], Arc::new(PanickingTransport))).await;

        let response = reqwest::Client::new()
            .post(format!("{}/signals/academic", base))
            .json(&json!({"data": {}}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 500);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Internal server error");
        assert!(body["errorId"].is_string());
        assert!(body["requestId"].is_string());
        assert!(!body.to_string().contains("exploded"));

        let errors = state.audit.records_of(AuditEvent::Error).await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field("errorId"), Some(&body["errorId"]));
    }

    #[tokio::test]
    async fn test_node_health_reports_offline_node() {
        let transport = MockTransport::new().unhealthy("knowledge");
        let (base, _state) = spawn(state_with(&[], Arc::new(transport))).await;

        let nodes: Value = reqwest::get(format!("{}/health/nodes", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let total = nodes["totalNodes"].as_u64().unwrap();
        assert_eq!(total, 5);
        assert_eq!(nodes["online"].as_u64().unwrap(), total - 1);
        assert_eq!(nodes["nodes"]["knowledge"]["status"], "offline");
        assert_eq!(nodes["nodes"]["swarmgate"]["status"], "online");
        // The orchestrator reports itself without a health check
        assert_eq!(nodes["nodes"]["queen"]["status"], "online");
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let (base, _state) = spawn(state(&[])).await;

        let health: Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["mesh"], "SovereignMesh");

        let ready = reqwest::get(format!("{}/health/ready", base)).await.unwrap();
        assert_eq!(ready.status(), 200);

        let nodes: Value = reqwest::get(format!("{}/health/nodes", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(nodes["online"], nodes["totalNodes"]);
    }
}
