//! Health check endpoints
//!
//! - /health          - basic liveness with uptime
//! - /health/detailed - process, build and configuration summary
//! - /health/live     - liveness probe
//! - /health/ready    - readiness probe (topology still valid)
//! - /health/nodes    - probes every node's /health concurrently
//!
//! Node probes are informational only. A down node never makes the queen
//! itself unhealthy.

use bytes::Bytes;
use futures::future::join_all;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;

use super::json_response;
use crate::server::AppState;

/// Mesh name reported by health endpoints
pub const MESH_NAME: &str = "SovereignMesh";

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    node: &'static str,
    mesh: &'static str,
    timestamp: String,
    /// Seconds since the server started
    uptime: u64,
}

/// Handle /health
pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            status: "healthy",
            node: "Queen",
            mesh: MESH_NAME,
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime: state.uptime().as_secs(),
        },
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DetailedHealth {
    status: &'static str,
    node: NodeInfo,
    system: SystemInfo,
    config: ConfigInfo,
    mesh_nodes: usize,
    timestamp: String,
}

#[derive(Serialize)]
struct NodeInfo {
    name: &'static str,
    role: &'static str,
    version: &'static str,
    commit: &'static str,
    build_time: &'static str,
    mesh: &'static str,
}

#[derive(Serialize)]
struct SystemInfo {
    os: &'static str,
    arch: &'static str,
    pid: u32,
    uptime: u64,
    cpus: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigInfo {
    listen: String,
    mode: &'static str,
    github_app_id: String,
    audit_enabled: bool,
    dispatch_timeout_ms: u64,
}

/// Handle /health/detailed
pub fn detailed_health(state: &AppState) -> Response<Full<Bytes>> {
    let args = &state.args;
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    json_response(
        StatusCode::OK,
        &DetailedHealth {
            status: "healthy",
            node: NodeInfo {
                name: "Queen",
                role: "orchestrator",
                version: env!("CARGO_PKG_VERSION"),
                commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
                build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
                mesh: MESH_NAME,
            },
            system: SystemInfo {
                os: std::env::consts::OS,
                arch: std::env::consts::ARCH,
                pid: std::process::id(),
                uptime: state.uptime().as_secs(),
                cpus,
            },
            config: ConfigInfo {
                listen: args.listen.to_string(),
                mode: args.mode(),
                github_app_id: args.github_app_id.clone(),
                audit_enabled: args.audit_enabled,
                dispatch_timeout_ms: args.dispatch_timeout_ms,
            },
            mesh_nodes: state.topology.nodes().len(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        },
    )
}

/// Handle /health/live
pub fn liveness_check() -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &serde_json::json!({ "live": true }))
}

/// Handle /health/ready
///
/// The topology is validated before the listener starts, so a running
/// server is ready unless validation has since been bypassed.
pub fn readiness_check(state: &AppState) -> Response<Full<Bytes>> {
    match state.topology.validate() {
        Ok(()) => json_response(StatusCode::OK, &serde_json::json!({ "ready": true })),
        Err(e) => json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &serde_json::json!({ "ready": false, "reason": e.to_string() }),
        ),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeStatus {
    name: String,
    role: String,
    url: String,
    status: &'static str,
    last_check: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClusterHealth {
    cluster: &'static str,
    total_nodes: usize,
    online: usize,
    nodes: BTreeMap<String, NodeStatus>,
    timestamp: String,
}

/// Handle /health/nodes
pub async fn node_health(state: &AppState) -> Response<Full<Bytes>> {
    let topology = &state.topology;
    let transport = &state.transport;

    let probes = join_all(topology.nodes().iter().map(|node| async move {
        // The orchestrator is this process
        let online = node.key == topology.orchestrator() || transport.probe(node).await;
        let status = NodeStatus {
            name: node.name.clone(),
            role: node.role.clone(),
            url: node.url.clone(),
            status: if online { "online" } else { "offline" },
            last_check: chrono::Utc::now().to_rfc3339(),
        };
        (node.key.clone(), status)
    }))
    .await;

    let nodes: BTreeMap<String, NodeStatus> = probes.into_iter().collect();
    let online = nodes.values().filter(|n| n.status == "online").count();

    json_response(
        StatusCode::OK,
        &ClusterHealth {
            cluster: MESH_NAME,
            total_nodes: nodes.len(),
            online,
            nodes,
            timestamp: chrono::Utc::now().to_rfc3339(),
        },
    )
}
