//! Queen status and fallback responses

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::health::MESH_NAME;
use super::json_response;
use crate::mesh::Node;
use crate::server::AppState;

#[derive(Serialize)]
struct Endpoints {
    signals: &'static str,
    webhooks: &'static str,
    health: &'static str,
    auth: &'static str,
}

#[derive(Serialize)]
struct Cluster<'a> {
    nodes: Vec<&'a Node>,
    orchestrator: &'a str,
}

#[derive(Serialize)]
struct QueenStatus<'a> {
    node: &'static str,
    mesh: &'static str,
    status: &'static str,
    version: &'static str,
    mode: &'static str,
    timestamp: String,
    endpoints: Endpoints,
    cluster: Cluster<'a>,
}

/// Handle GET /
pub fn queen_status(state: &AppState) -> Response<Full<Bytes>> {
    let topology = &state.topology;
    json_response(
        StatusCode::OK,
        &QueenStatus {
            node: "Queen",
            mesh: MESH_NAME,
            status: "operational",
            version: env!("CARGO_PKG_VERSION"),
            mode: state.args.mode(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            endpoints: Endpoints {
                signals: "/signals/*",
                webhooks: "/webhooks/*",
                health: "/health",
                auth: "/auth/app-token",
            },
            cluster: Cluster {
                nodes: topology.nodes().iter().collect(),
                orchestrator: topology.orchestrator(),
            },
        },
    )
}

/// Unknown endpoint
pub fn not_found(path: &str, request_id: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({
            "error": "Endpoint not found",
            "path": path,
            "requestId": request_id,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    )
}
