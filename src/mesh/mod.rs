//! Mesh topology
//!
//! The node roster, routing table and webhook source table are loaded once
//! at startup into a [`Topology`] and shared read-only (behind an `Arc`)
//! with every component that needs lookups. Nothing mutates it afterwards,
//! so no locking is involved.
//!
//! ```text
//! MESH_CONFIG (json) ──┐
//!                      ├──► MeshConfig ──► Topology::from_config ──► validate ──► Arc<Topology>
//! built-in defaults ───┘                       ▲
//!                               <KEY>_URL env overrides
//! ```

pub mod nodes;
pub mod routes;
pub mod sources;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::signal::{Priority, SignalCategory};
use crate::types::QueenError;

pub use nodes::{Node, NodeRegistry, NodeSummary};
pub use routes::{RouteEntry, RoutingTable};
pub use sources::{VerificationKind, WebhookProvider, WebhookSource, WebhookSources};

/// Key of the orchestrator node in the default roster
pub const DEFAULT_ORCHESTRATOR: &str = "queen";

/// On-disk mesh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    #[serde(default = "default_orchestrator")]
    pub orchestrator: String,
    pub nodes: BTreeMap<String, Node>,
    pub routes: BTreeMap<SignalCategory, RouteEntry>,
    #[serde(default)]
    pub webhooks: Option<BTreeMap<WebhookProvider, WebhookSource>>,
}

fn default_orchestrator() -> String {
    DEFAULT_ORCHESTRATOR.to_string()
}

impl MeshConfig {
    /// Read a JSON mesh configuration file
    pub fn from_file(path: &Path) -> Result<Self, QueenError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            QueenError::Config(format!("cannot read mesh config {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            QueenError::Config(format!("invalid mesh config {}: {}", path.display(), e))
        })
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        let node = |name: &str, role: &str, port: u16, description: &str, features: &[&str]| Node {
            key: String::new(),
            name: name.to_string(),
            role: role.to_string(),
            url: format!("http://localhost:{}", port),
            description: description.to_string(),
            features: features.iter().map(|f| f.to_string()).collect(),
        };

        let mut nodes = BTreeMap::new();
        nodes.insert(
            "queen".to_string(),
            node("Queen", "orchestrator", 3000, "Signal router and central orchestrator", &[]),
        );
        nodes.insert(
            "swarmgate".to_string(),
            node(
                "SwarmGate",
                "financial",
                3001,
                "Trading, Treasury, 7% allocation",
                &["trading", "treasury", "allocation"],
            ),
        );
        nodes.insert(
            "knowledge".to_string(),
            node(
                "Knowledge",
                "academic",
                3002,
                "Obsidian, Memory, Ingest",
                &["obsidian", "memory", "ingest"],
            ),
        );
        nodes.insert(
            "dashboard".to_string(),
            node(
                "Dashboard",
                "interface",
                3003,
                "SovereignOS UI, Metrics, Control",
                &["ui", "metrics", "control"],
            ),
        );
        nodes.insert(
            "aicouncil".to_string(),
            node(
                "AI Council",
                "intelligence",
                3004,
                "Legion of Minds - Claude, GPT, Grok, Local models",
                &["claude", "gpt", "grok", "local-proxy", "consensus"],
            ),
        );

        let mut routes = BTreeMap::new();
        routes.insert(
            SignalCategory::Academic,
            RouteEntry::new("knowledge", Priority::Normal, &["snhu", "obsidian", "research"])
                .with_label("Knowledge Node"),
        );
        routes.insert(
            SignalCategory::Financial,
            RouteEntry::new("swarmgate", Priority::High, &["thread", "trading", "treasury"]),
        );
        // Dashboard handles security in SovereignGuard mode
        routes.insert(
            SignalCategory::Security,
            RouteEntry::new("dashboard", Priority::Critical, &["audit", "alert", "breach"])
                .with_label("Dashboard (SovereignGuard mode)")
                .with_mode("sovereignguard"),
        );
        routes.insert(
            SignalCategory::Intelligence,
            RouteEntry::new("aicouncil", Priority::Normal, &["query", "consensus", "analysis"]),
        );
        routes.insert(
            SignalCategory::Interface,
            RouteEntry::new("dashboard", Priority::Normal, &["metrics", "control", "display"]),
        );

        Self {
            orchestrator: default_orchestrator(),
            nodes,
            routes,
            webhooks: None,
        }
    }
}

/// Immutable process-wide routing state
#[derive(Debug, Clone)]
pub struct Topology {
    orchestrator: String,
    nodes: NodeRegistry,
    routes: RoutingTable,
    webhooks: WebhookSources,
}

impl Topology {
    /// Build a topology without validating it
    pub fn new(
        orchestrator: impl Into<String>,
        nodes: NodeRegistry,
        routes: RoutingTable,
        webhooks: WebhookSources,
    ) -> Self {
        Self {
            orchestrator: orchestrator.into(),
            nodes,
            routes,
            webhooks,
        }
    }

    /// Build from configuration, apply `<KEY>_URL` overrides from `env`, and validate
    pub fn from_config<F>(config: MeshConfig, env: F) -> Result<Self, QueenError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut nodes = NodeRegistry::new(config.nodes);
        nodes.apply_url_overrides(env);

        // Configured providers override the defaults; unlisted ones stay enabled
        let webhooks = match config.webhooks {
            Some(overrides) => WebhookSources::default().with_overrides(overrides),
            None => WebhookSources::default(),
        };

        let topology = Self::new(
            config.orchestrator,
            nodes,
            RoutingTable::new(config.routes),
            webhooks,
        );
        topology.validate()?;
        Ok(topology)
    }

    /// Load from an optional config file, falling back to the built-in mesh
    pub fn load(path: Option<&Path>) -> Result<Self, QueenError> {
        let config = match path {
            Some(p) => {
                info!("Loading mesh config from {}", p.display());
                MeshConfig::from_file(p)?
            }
            None => MeshConfig::default(),
        };
        Self::from_config(config, |var| std::env::var(var).ok())
    }

    /// Check that every routable category resolves to a registered node
    pub fn validate(&self) -> Result<(), QueenError> {
        if !self.nodes.contains(&self.orchestrator) {
            return Err(QueenError::Config(format!(
                "orchestrator '{}' is not in the node roster",
                self.orchestrator
            )));
        }

        let mut problems = Vec::new();
        for category in SignalCategory::ALL.iter().filter(|c| c.is_routable()) {
            match self.routes.resolve(*category) {
                Ok(entry) if !self.nodes.contains(&entry.target) => problems.push(format!(
                    "route '{}' targets unknown node '{}'",
                    category, entry.target
                )),
                Ok(_) => {}
                Err(_) => problems.push(format!("no route for category '{}'", category)),
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(QueenError::Config(problems.join("; ")))
        }
    }

    pub fn orchestrator(&self) -> &str {
        &self.orchestrator
    }

    pub fn nodes(&self) -> &NodeRegistry {
        &self.nodes
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn webhooks(&self) -> &WebhookSources {
        &self.webhooks
    }

    /// Display name reported for a route: its label, else the node name, else the key
    pub fn target_label(&self, entry: &RouteEntry) -> String {
        entry
            .label
            .clone()
            .or_else(|| self.nodes.get(&entry.target).map(|n| n.name.clone()))
            .unwrap_or_else(|| entry.target.clone())
    }

    /// Nodes that receive a broadcast: everyone except the orchestrator
    pub fn broadcast_targets(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.key != self.orchestrator)
    }
}
