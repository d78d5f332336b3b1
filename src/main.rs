//! Queen - central signal router for the SovereignMesh cluster

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use queen::{
    config::Args,
    logging::{AuditEvent, AuditRecord, AuditTrail},
    mesh::Topology,
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("queen={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.json_logs() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let topology = match Topology::load(args.mesh_config.as_deref()) {
        Ok(topology) => topology,
        Err(e) => {
            error!("Mesh topology error: {}", e);
            std::process::exit(1);
        }
    };

    info!("======================================");
    info!("  Queen - SovereignMesh signal router");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Orchestrator: {}", topology.orchestrator());
    info!("Nodes: {}", topology.nodes().len());
    for node in topology.nodes().iter() {
        info!("  {}: {} ({})", node.key, node.url, node.role);
    }
    info!("Routes: {}", topology.routes().len());
    info!("GitHub App: {}", args.github_app_id);
    info!(
        "Audit: {}",
        if args.audit_enabled {
            args.audit_dir.display().to_string()
        } else {
            "disabled".to_string()
        }
    );
    info!("======================================");

    let missing = args.missing_secrets();
    if args.dev_mode {
        warn!("DEV_MODE is set: unconfigured sources skip verification (every skip is audited)");
        for name in &missing {
            warn!("{} not set - verification will be skipped", name);
        }
    } else {
        for name in &missing {
            warn!("{} not set - matching requests will be rejected with 401", name);
        }
    }

    let audit = if args.audit_enabled {
        match AuditTrail::open(&args.audit_dir, args.dev_mode) {
            Ok(trail) => trail,
            Err(e) => {
                if args.dev_mode {
                    warn!("Audit trail unavailable (dev mode, continuing without): {}", e);
                    AuditTrail::disabled()
                } else {
                    error!("Failed to open audit trail in {}: {}", args.audit_dir.display(), e);
                    std::process::exit(1);
                }
            }
        }
    } else {
        warn!("Audit trail disabled");
        AuditTrail::disabled()
    };

    let port = args.listen.port();
    let state = match AppState::new(args, topology, audit.clone()) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize: {}", e);
            std::process::exit(1);
        }
    };

    audit
        .record(
            AuditRecord::new(AuditEvent::QueenStarted)
                .with("port", port)
                .with("pid", std::process::id())
                .with("mode", state.args.mode())
                .with("version", env!("CARGO_PKG_VERSION")),
        )
        .await;

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
