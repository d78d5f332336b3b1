//! Signals - the canonical unit routed through the mesh
//!
//! A [`Signal`] is built once per inbound call right after classification,
//! never mutated, and consumed exactly once by the dispatcher.

pub mod classify;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub use classify::{classify_declared_type, classify_github_event};

/// Closed set of signal categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalCategory {
    Academic,
    Financial,
    Security,
    Intelligence,
    Interface,
    Broadcast,
}

impl SignalCategory {
    /// Every category, in declaration order
    pub const ALL: [SignalCategory; 6] = [
        Self::Academic,
        Self::Financial,
        Self::Security,
        Self::Intelligence,
        Self::Interface,
        Self::Broadcast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Academic => "academic",
            Self::Financial => "financial",
            Self::Security => "security",
            Self::Intelligence => "intelligence",
            Self::Interface => "interface",
            Self::Broadcast => "broadcast",
        }
    }

    /// Whether this category resolves through a single routing table entry.
    /// Broadcast fans out to every node instead.
    pub fn is_routable(&self) -> bool {
        !matches!(self, Self::Broadcast)
    }
}

impl fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown signal category: {}", s))
    }
}

/// Dispatch priority, taken from the routing table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified unit of work
#[derive(Debug, Clone)]
pub struct Signal {
    category: SignalCategory,
    source: String,
    payload: Map<String, Value>,
    request_id: String,
    priority: Priority,
    created_at: DateTime<Utc>,
}

impl Signal {
    /// Build a signal stamped with the current time.
    ///
    /// An empty `source` becomes `"unknown"`.
    pub fn new(
        category: SignalCategory,
        source: impl Into<String>,
        payload: Map<String, Value>,
        request_id: impl Into<String>,
        priority: Priority,
    ) -> Self {
        let source = source.into();
        Self {
            category,
            source: if source.is_empty() { "unknown".to_string() } else { source },
            payload,
            request_id: request_id.into(),
            priority,
            created_at: Utc::now(),
        }
    }

    pub fn category(&self) -> SignalCategory {
        self.category
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Body forwarded to the target node.
    ///
    /// Payload keys are flattened next to the envelope fields; envelope
    /// fields win on collision.
    pub fn to_envelope(&self) -> Value {
        let mut body = self.payload.clone();
        body.insert("type".into(), Value::from(self.category.as_str()));
        body.insert("source".into(), Value::from(self.source.clone()));
        body.insert("timestamp".into(), Value::from(self.created_at.to_rfc3339()));
        body.insert("requestId".into(), Value::from(self.request_id.clone()));
        body.insert("priority".into(), Value::from(self.priority.as_str()));
        Value::Object(body)
    }
}
