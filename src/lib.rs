//! Queen - central signal router for the SovereignMesh cluster
//!
//! Queen accepts events from webhook providers and direct API calls,
//! classifies each one into a signal category, and dispatches it to the
//! worker node that owns that category.
//!
//! ## Services
//!
//! - **Signals**: per-category submission and broadcast to every node
//! - **Webhooks**: GitHub, Zapier, Discord, SNHU and Thread ingestion with
//!   per-provider verification
//! - **Credentials**: short-lived GitHub App assertions behind an API key
//! - **Audit**: append-only JSONL record of every routing decision
//! - **Health**: process health plus concurrent node probes

pub mod admission;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod ingress;
pub mod logging;
pub mod mesh;
pub mod routes;
pub mod server;
pub mod signal;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{QueenError, Result};
