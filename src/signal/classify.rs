//! Event classification
//!
//! Two pure, total strategies map provider-specific events to a
//! [`SignalCategory`]. Unknown inputs fall through to `Intelligence`;
//! nothing here ever rejects.

use super::SignalCategory;

/// GitHub events that carry security findings
const SECURITY_EVENTS: &[&str] = &[
    "security_advisory",
    "repository_vulnerability_alert",
    "secret_scanning_alert",
    "secret_scanning_alert_location",
    "code_scanning_alert",
    "dependabot_alert",
];

/// GitHub events about documentation and wiki pages
const KNOWLEDGE_EVENTS: &[&str] = &["wiki", "gollum"];

/// Declared `type` values sent by automation platforms
const DECLARED_TYPES: &[(&str, SignalCategory)] = &[
    ("email", SignalCategory::Academic),
    ("snhu", SignalCategory::Academic),
    ("bank", SignalCategory::Financial),
    ("thread", SignalCategory::Financial),
    ("trading", SignalCategory::Financial),
    ("alert", SignalCategory::Security),
    ("security", SignalCategory::Security),
    ("ai", SignalCategory::Intelligence),
    ("query", SignalCategory::Intelligence),
];

/// Classify a GitHub webhook by its `X-GitHub-Event` name
pub fn classify_github_event(event: &str) -> SignalCategory {
    if SECURITY_EVENTS.contains(&event) {
        SignalCategory::Security
    } else if KNOWLEDGE_EVENTS.contains(&event) {
        SignalCategory::Academic
    } else {
        SignalCategory::Intelligence
    }
}

/// Classify an integration payload by its self-declared `type`
pub fn classify_declared_type(declared: Option<&str>) -> SignalCategory {
    declared
        .and_then(|t| {
            DECLARED_TYPES
                .iter()
                .find(|(name, _)| *name == t)
                .map(|(_, category)| *category)
        })
        .unwrap_or(SignalCategory::Intelligence)
}
