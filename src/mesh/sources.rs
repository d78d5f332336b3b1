//! External signal sources (webhook providers)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Webhook providers the queen accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookProvider {
    Github,
    Zapier,
    Discord,
    Snhu,
    Thread,
}

impl WebhookProvider {
    pub const ALL: [WebhookProvider; 5] = [
        Self::Github,
        Self::Zapier,
        Self::Discord,
        Self::Snhu,
        Self::Thread,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Zapier => "zapier",
            Self::Discord => "discord",
            Self::Snhu => "snhu",
            Self::Thread => "thread",
        }
    }

    pub fn from_path_segment(segment: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.as_str() == segment)
    }

    pub fn webhook_path(&self) -> String {
        format!("/webhooks/{}", self.as_str())
    }

    /// Label used on auth audit records (e.g. "github-webhook")
    pub fn auth_label(&self) -> String {
        format!("{}-webhook", self.as_str())
    }
}

impl fmt::Display for WebhookProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a provider's requests are verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationKind {
    #[serde(rename = "hmac-sha256")]
    HmacSha256,
    #[serde(rename = "header-token")]
    HeaderToken,
    #[serde(rename = "none")]
    None,
}

impl VerificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HmacSha256 => "hmac-sha256",
            Self::HeaderToken => "header-token",
            Self::None => "none",
        }
    }
}

/// Per-provider configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSource {
    pub enabled: bool,
    pub verification: VerificationKind,
}

/// Provider table, read-only after startup
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct WebhookSources {
    sources: BTreeMap<WebhookProvider, WebhookSource>,
}

impl WebhookSources {
    pub fn new(sources: BTreeMap<WebhookProvider, WebhookSource>) -> Self {
        Self { sources }
    }

    /// Look up a provider. Providers absent from the table are disabled.
    pub fn get(&self, provider: WebhookProvider) -> WebhookSource {
        self.sources.get(&provider).copied().unwrap_or(WebhookSource {
            enabled: false,
            verification: VerificationKind::None,
        })
    }

    /// Apply configured entries over this table. Providers the overrides
    /// leave out keep their current entry.
    pub fn with_overrides(mut self, overrides: BTreeMap<WebhookProvider, WebhookSource>) -> Self {
        self.sources.extend(overrides);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&WebhookProvider, &WebhookSource)> {
        self.sources.iter()
    }
}

impl Default for WebhookSources {
    fn default() -> Self {
        let entry = |verification| WebhookSource {
            enabled: true,
            verification,
        };
        let mut sources = BTreeMap::new();
        sources.insert(WebhookProvider::Github, entry(VerificationKind::HmacSha256));
        sources.insert(WebhookProvider::Zapier, entry(VerificationKind::HeaderToken));
        sources.insert(WebhookProvider::Discord, entry(VerificationKind::HeaderToken));
        sources.insert(WebhookProvider::Snhu, entry(VerificationKind::None));
        sources.insert(WebhookProvider::Thread, entry(VerificationKind::None));
        Self { sources }
    }
}
