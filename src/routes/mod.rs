//! HTTP routes for Queen

pub mod credentials;
pub mod health;
pub mod signals;
pub mod status;
pub mod webhooks;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;

pub use credentials::issue_app_token;
pub use health::{detailed_health, health_check, liveness_check, node_health, readiness_check};
pub use signals::{handle_signal, route_table};
pub use status::{not_found, queen_status};
pub use webhooks::{handle_webhook, webhook_status};

/// Serialize `body` into a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(body)
        .unwrap_or_else(|_| br#"{"error":"Serialization failed"}"#.to_vec());

    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// `{error, requestId}` with the given status
pub fn error_response(status: StatusCode, message: &str, request_id: &str) -> Response<Full<Bytes>> {
    json_response(
        status,
        &serde_json::json!({
            "error": message,
            "requestId": request_id,
        }),
    )
}
