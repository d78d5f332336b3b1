//! Routing table: signal category → target node, priority, accepted sources

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::signal::{Priority, SignalCategory};
use crate::types::QueenError;

/// One row of the routing table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Key of the target node
    pub target: String,
    #[serde(default)]
    pub priority: Priority,
    /// Source labels this route is meant for
    #[serde(default)]
    pub sources: BTreeSet<String>,
    /// Display name reported back to callers; falls back to the node name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Handling mode hint recorded in the audit trail (e.g. "sovereignguard")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl RouteEntry {
    pub fn new(target: &str, priority: Priority, sources: &[&str]) -> Self {
        Self {
            target: target.to_string(),
            priority,
            sources: sources.iter().map(|s| s.to_string()).collect(),
            label: None,
            mode: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_mode(mut self, mode: &str) -> Self {
        self.mode = Some(mode.to_string());
        self
    }

    pub fn accepts_source(&self, source: &str) -> bool {
        self.sources.contains(source)
    }
}

/// Immutable category → route mapping
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct RoutingTable {
    routes: BTreeMap<SignalCategory, RouteEntry>,
}

impl RoutingTable {
    pub fn new(routes: BTreeMap<SignalCategory, RouteEntry>) -> Self {
        Self { routes }
    }

    /// Resolve a category to its route.
    ///
    /// A miss means the table was loaded without an entry for a routable
    /// category, which startup validation is supposed to rule out.
    pub fn resolve(&self, category: SignalCategory) -> Result<&RouteEntry, QueenError> {
        self.routes.get(&category).ok_or_else(|| {
            QueenError::Internal(format!(
                "routing table has no entry for category '{}'",
                category
            ))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SignalCategory, &RouteEntry)> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
