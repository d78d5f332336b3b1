//! HTTP server for Queen

pub mod http;

pub use http::{run, serve, AppState};
