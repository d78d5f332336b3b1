//! Configuration for Queen
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::admission::{Thresholds, DEFAULT_WINDOW_SECS};
use crate::mesh::WebhookProvider;

/// Queen - central signal router for the mesh
#[derive(Parser, Debug, Clone)]
#[command(name = "queen")]
#[command(about = "Signal router and orchestrator for mesh worker nodes")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Non-production mode. Verification is skipped (and audited) only for
    /// sources whose secret is not configured.
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// JSON mesh topology file (built-in topology when unset)
    #[arg(long, env = "MESH_CONFIG")]
    pub mesh_config: Option<PathBuf>,

    /// GitHub App identifier, used as the credential issuer
    #[arg(long, env = "GITHUB_APP_ID", default_value = "1884781")]
    pub github_app_id: String,

    /// PEM private key for the GitHub App
    #[arg(long, env = "GITHUB_PRIVATE_KEY_PATH", default_value = "./github-app.pem")]
    pub github_private_key_path: PathBuf,

    /// Shared secret for GitHub webhook signatures
    #[arg(long, env = "GITHUB_WEBHOOK_SECRET")]
    pub github_webhook_secret: Option<String>,

    /// Token expected on Zapier webhooks
    #[arg(long, env = "ZAPIER_WEBHOOK_TOKEN")]
    pub zapier_webhook_token: Option<String>,

    /// Token expected on Discord webhooks
    #[arg(long, env = "DISCORD_WEBHOOK_TOKEN")]
    pub discord_webhook_token: Option<String>,

    /// API key guarding credential issuance
    #[arg(long, env = "SOVEREIGN_API_KEY")]
    pub api_key: Option<String>,

    /// Directory holding audit.log and signals.log
    #[arg(long, env = "AUDIT_DIR", default_value = "./logs")]
    pub audit_dir: PathBuf,

    /// Write the audit trail to disk
    #[arg(long, env = "AUDIT_ENABLED", default_value = "true")]
    pub audit_enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Per-node delivery timeout in milliseconds
    #[arg(long, env = "DISPATCH_TIMEOUT_MS", default_value = "10000")]
    pub dispatch_timeout_ms: u64,

    /// Node health probe timeout in milliseconds
    #[arg(long, env = "PROBE_TIMEOUT_MS", default_value = "2000")]
    pub probe_timeout_ms: u64,

    /// Sub-path nodes accept routed signals on
    #[arg(long, env = "INGEST_PATH", default_value = "/ingest")]
    pub ingest_path: String,

    /// Largest accepted request body
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "10485760")]
    pub max_body_bytes: usize,

    /// Admission control
    #[command(flatten)]
    pub rate_limit: RateLimitArgs,
}

/// Admission thresholds per window
#[derive(Parser, Debug, Clone)]
pub struct RateLimitArgs {
    /// Window length in seconds
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value_t = DEFAULT_WINDOW_SECS)]
    pub rate_limit_window_secs: u64,

    #[arg(long, env = "RATE_LIMIT_GENERAL", default_value = "100")]
    pub rate_limit_general: u32,

    #[arg(long, env = "RATE_LIMIT_AUTHENTICATED", default_value = "30")]
    pub rate_limit_authenticated: u32,

    #[arg(long, env = "RATE_LIMIT_WEBHOOK", default_value = "200")]
    pub rate_limit_webhook: u32,

    #[arg(long, env = "RATE_LIMIT_SIGNAL", default_value = "150")]
    pub rate_limit_signal: u32,
}

impl RateLimitArgs {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            general: self.rate_limit_general,
            authenticated: self.rate_limit_authenticated,
            webhook: self.rate_limit_webhook,
            signal: self.rate_limit_signal,
        }
    }
}

impl Args {
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn mode(&self) -> &'static str {
        if self.dev_mode {
            "development"
        } else {
            "production"
        }
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Configured secret for a webhook provider, if it has one
    pub fn webhook_secret(&self, provider: WebhookProvider) -> Option<String> {
        let secret = match provider {
            WebhookProvider::Github => &self.github_webhook_secret,
            WebhookProvider::Zapier => &self.zapier_webhook_token,
            WebhookProvider::Discord => &self.discord_webhook_token,
            WebhookProvider::Snhu | WebhookProvider::Thread => return None,
        };
        secret.clone().filter(|s| !s.is_empty())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.dispatch_timeout_ms == 0 {
            return Err("DISPATCH_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.rate_limit.rate_limit_window_secs == 0 {
            return Err("RATE_LIMIT_WINDOW_SECS must be greater than zero".to_string());
        }

        let t = self.rate_limit.thresholds();
        if t.general == 0 || t.authenticated == 0 || t.webhook == 0 || t.signal == 0 {
            return Err("rate limit thresholds must be greater than zero".to_string());
        }

        if !self.ingest_path.starts_with('/') {
            return Err("INGEST_PATH must start with '/'".to_string());
        }

        Ok(())
    }

    /// Secrets that are expected in production but missing
    pub fn missing_secrets(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.webhook_secret(WebhookProvider::Github).is_none() {
            missing.push("GITHUB_WEBHOOK_SECRET");
        }
        if self.webhook_secret(WebhookProvider::Zapier).is_none() {
            missing.push("ZAPIER_WEBHOOK_TOKEN");
        }
        if self.webhook_secret(WebhookProvider::Discord).is_none() {
            missing.push("DISCORD_WEBHOOK_TOKEN");
        }
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            missing.push("SOVEREIGN_API_KEY");
        }
        missing
    }
}
