//! Node roster
//!
//! Downstream services keyed by a stable identifier. The roster is built
//! once at startup and only read afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A registered downstream target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable identifier (e.g. "knowledge"), filled from the roster key
    #[serde(default, skip_deserializing)]
    pub key: String,
    pub name: String,
    pub role: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
}

impl Node {
    /// Join the node base URL with `path`, tolerating stray slashes
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Public view of a node used by introspection endpoints
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub key: String,
    pub name: String,
    pub role: String,
    pub description: String,
}

impl From<&Node> for NodeSummary {
    fn from(node: &Node) -> Self {
        Self {
            key: node.key.clone(),
            name: node.name.clone(),
            role: node.role.clone(),
            description: node.description.clone(),
        }
    }
}

/// Immutable set of nodes, ordered by key
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    nodes: BTreeMap<String, Node>,
}

impl NodeRegistry {
    /// Build a registry; each node's `key` is set from the map key
    pub fn new(nodes: BTreeMap<String, Node>) -> Self {
        let nodes = nodes
            .into_iter()
            .map(|(key, mut node)| {
                node.key = key.clone();
                (key, node)
            })
            .collect();
        Self { nodes }
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn summaries(&self) -> Vec<NodeSummary> {
        self.nodes.values().map(NodeSummary::from).collect()
    }

    /// Apply `<KEY>_URL` style overrides, e.g. `KNOWLEDGE_URL`
    pub fn apply_url_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (key, node) in self.nodes.iter_mut() {
            let var = format!("{}_URL", key.to_ascii_uppercase());
            if let Some(url) = lookup(&var).filter(|u| !u.is_empty()) {
                node.url = url;
            }
        }
    }
}
