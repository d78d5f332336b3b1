//! Signal submission endpoints
//!
//! - POST /signals/{academic,financial,security,intelligence,interface,broadcast}
//! - GET  /signals/routes

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::Value;

use super::{error_response, json_response};
use crate::mesh::{NodeSummary, RouteEntry};
use crate::server::AppState;
use crate::signal::SignalCategory;

/// Submit a signal from a raw JSON body
pub async fn handle_signal(
    state: &AppState,
    category: SignalCategory,
    body: &[u8],
    request_id: &str,
) -> Response<Full<Bytes>> {
    let body: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &format!("Invalid JSON body: {}", e),
                    request_id,
                )
            }
        }
    };

    let ack = state.ingress.submit(category, &body, request_id).await;
    json_response(ack.status_code(), &ack)
}

#[derive(Serialize)]
struct RouteTable<'a> {
    routes: Vec<RouteRow<'a>>,
    nodes: Vec<NodeSummary>,
}

#[derive(Serialize)]
struct RouteRow<'a> {
    category: SignalCategory,
    #[serde(flatten)]
    entry: &'a RouteEntry,
    #[serde(rename = "targetName")]
    target_name: String,
}

/// Routing table and node roster (read-only, no auth)
pub fn route_table(state: &AppState) -> Response<Full<Bytes>> {
    let topology = &state.topology;
    let routes = topology
        .routes()
        .iter()
        .map(|(category, entry)| RouteRow {
            category: *category,
            entry,
            target_name: topology.target_label(entry),
        })
        .collect();

    json_response(
        StatusCode::OK,
        &RouteTable {
            routes,
            nodes: topology.nodes().summaries(),
        },
    )
}
