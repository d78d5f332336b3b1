//! Authentication for inbound signals
//!
//! Provides:
//! - HMAC-SHA256 body signatures (GitHub-style webhooks)
//! - Static token checks (automation platforms, API key)
//! - Delegated app credential issuance (RS256 assertions)
//!
//! Inbound checks are expressed as a closed [`Verification`] strategy and run
//! through one [`Authenticator`], which writes exactly one audit record per
//! attempt.
//!
//! Development bypass: when the deployment runs with `DEV_MODE` *and* the
//! secret for a source is not configured, the check is skipped and the skip
//! is audited as `development-skip`. A configured secret is always enforced.

pub mod app_token;
pub mod signature;
pub mod token;

use hyper::HeaderMap;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::logging::{AuditEvent, AuditRecord, AuditTrail};
use crate::mesh::{VerificationKind, WebhookProvider};
use crate::types::QueenError;

pub use app_token::{AppClaims, AppCredential, AppCredentialIssuer};
pub use signature::{sign_body, verify_body_signature, SIGNATURE_PREFIX};
pub use token::{constant_time_eq, extract_token, header_value, query_param, token_matches};

/// GitHub signature header
pub const GITHUB_SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// API key header and query parameter
pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_KEY_PARAM: &str = "apiKey";

/// Query parameter carrying a webhook token
pub const WEBHOOK_TOKEN_PARAM: &str = "token";

/// Audit label for app credential issuance
pub const APP_CREDENTIAL_LABEL: &str = "github-app";

/// Audit label for the API key guard
pub const API_KEY_LABEL: &str = "api-key";

/// Audit reasons
pub mod reason {
    pub const MISSING_SIGNATURE: &str = "missing-signature";
    pub const INVALID_SIGNATURE: &str = "invalid-signature";
    pub const INVALID_TOKEN: &str = "invalid-token";
    pub const MISSING_SECRET: &str = "missing-secret";
    pub const DEVELOPMENT_SKIP: &str = "development-skip";
    pub const CREDENTIAL_FAILED: &str = "jwt-generation-failed";
}

/// How one inbound source is verified
#[derive(Debug, Clone)]
pub enum Verification {
    /// `sha256=<hex hmac>` over the raw body, carried in `header`
    HmacSha256 {
        header: String,
        secret: Option<String>,
    },
    /// Shared token in `header`, or in the `param` query parameter
    StaticToken {
        header: String,
        param: String,
        token: Option<String>,
    },
    /// Source is accepted without verification
    None,
}

impl Verification {
    pub fn hmac(header: &str, secret: Option<String>) -> Self {
        Self::HmacSha256 {
            header: header.to_string(),
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn static_token(header: &str, param: &str, token: Option<String>) -> Self {
        Self::StaticToken {
            header: header.to_string(),
            param: param.to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn kind(&self) -> VerificationKind {
        match self {
            Self::HmacSha256 { .. } => VerificationKind::HmacSha256,
            Self::StaticToken { .. } => VerificationKind::HeaderToken,
            Self::None => VerificationKind::None,
        }
    }
}

/// The parts of a request verification looks at
#[derive(Debug, Clone, Copy)]
pub struct InboundRequest<'a> {
    pub headers: &'a HeaderMap,
    pub query: Option<&'a str>,
    pub body: &'a [u8],
}

/// How a request got through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Verified,
    /// Development bypass, already audited
    DevelopmentSkip,
    /// Source requires no verification
    NotRequired,
}

/// Configured shared secrets per webhook provider
#[derive(Debug, Clone, Default)]
pub struct WebhookCredentials {
    secrets: BTreeMap<WebhookProvider, String>,
}

impl WebhookCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret; empty values are ignored
    pub fn with(mut self, provider: WebhookProvider, secret: Option<String>) -> Self {
        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            self.secrets.insert(provider, secret);
        }
        self
    }

    pub fn has_secret(&self, provider: WebhookProvider) -> bool {
        self.secrets.contains_key(&provider)
    }

    /// Build the verification strategy for `provider` under `kind`
    pub fn verification_for(&self, provider: WebhookProvider, kind: VerificationKind) -> Verification {
        let secret = self.secrets.get(&provider).cloned();
        match kind {
            VerificationKind::HmacSha256 => {
                let header = match provider {
                    WebhookProvider::Github => GITHUB_SIGNATURE_HEADER.to_string(),
                    other => format!("x-{}-signature-256", other.as_str()),
                };
                Verification::hmac(&header, secret)
            }
            VerificationKind::HeaderToken => Verification::static_token(
                &format!("x-{}-token", provider.as_str()),
                WEBHOOK_TOKEN_PARAM,
                secret,
            ),
            VerificationKind::None => Verification::None,
        }
    }
}

/// Runs verification strategies and records their outcomes
#[derive(Clone)]
pub struct Authenticator {
    dev_mode: bool,
    audit: AuditTrail,
    app_issuer: Option<AppCredentialIssuer>,
}

impl Authenticator {
    pub fn new(dev_mode: bool, audit: AuditTrail) -> Self {
        Self {
            dev_mode,
            audit,
            app_issuer: None,
        }
    }

    pub fn with_app_issuer(mut self, issuer: AppCredentialIssuer) -> Self {
        self.app_issuer = Some(issuer);
        self
    }

    /// Verify one inbound request for the source labelled `label`
    pub async fn verify(
        &self,
        label: &str,
        verification: &Verification,
        request: &InboundRequest<'_>,
    ) -> Result<AuthOutcome, QueenError> {
        match verification {
            Verification::None => return Ok(AuthOutcome::NotRequired),
            Verification::HmacSha256 { header, secret } => {
                let Some(secret) = secret.as_deref() else {
                    return self.unconfigured(label).await;
                };
                let Some(supplied) = header_value(request.headers, header) else {
                    return self.reject(label, reason::MISSING_SIGNATURE, "Missing signature").await;
                };
                if !verify_body_signature(secret.as_bytes(), request.body, supplied) {
                    return self.reject(label, reason::INVALID_SIGNATURE, "Invalid signature").await;
                }
            }
            Verification::StaticToken { header, param, token } => {
                let Some(expected) = token.as_deref() else {
                    return self.unconfigured(label).await;
                };
                let supplied = extract_token(request.headers, request.query, header, param);
                let valid = supplied
                    .as_deref()
                    .map(|t| token_matches(t, expected))
                    .unwrap_or(false);
                if !valid {
                    return self
                        .reject(label, reason::INVALID_TOKEN, "Invalid or missing token")
                        .await;
                }
            }
        }

        debug!(auth_type = %label, "Request verified");
        self.audit
            .record(AuditRecord::new(AuditEvent::AuthSuccess).with("authType", label))
            .await;
        Ok(AuthOutcome::Verified)
    }

    /// Issue a delegated app credential, auditing the outcome
    pub async fn issue_app_credential(&self) -> Result<AppCredential, QueenError> {
        let result = match self.app_issuer {
            Some(ref issuer) => issuer.issue(),
            None => Err(QueenError::CredentialUnavailable(
                "GitHub App not configured".into(),
            )),
        };

        match result {
            Ok(credential) => {
                self.audit
                    .record(
                        AuditRecord::new(AuditEvent::AuthSuccess)
                            .with("authType", APP_CREDENTIAL_LABEL)
                            .with("appId", credential.app_id.clone()),
                    )
                    .await;
                Ok(credential)
            }
            Err(e) => {
                warn!("App credential unavailable: {}", e);
                self.audit
                    .record(
                        AuditRecord::new(AuditEvent::AuthFailure)
                            .with("authType", APP_CREDENTIAL_LABEL)
                            .with("reason", reason::CREDENTIAL_FAILED),
                    )
                    .await;
                Err(e)
            }
        }
    }

    /// No secret configured: skip (audited) in development, reject otherwise
    async fn unconfigured(&self, label: &str) -> Result<AuthOutcome, QueenError> {
        if self.dev_mode {
            warn!(auth_type = %label, "No secret configured - skipping verification (DEV_MODE)");
            self.audit
                .record(
                    AuditRecord::new(AuditEvent::AuthSuccess)
                        .with("authType", label)
                        .with("mode", reason::DEVELOPMENT_SKIP),
                )
                .await;
            return Ok(AuthOutcome::DevelopmentSkip);
        }
        self.reject(label, reason::MISSING_SECRET, "Verification not configured")
            .await
    }

    async fn reject(
        &self,
        label: &str,
        why: &str,
        message: &str,
    ) -> Result<AuthOutcome, QueenError> {
        warn!(auth_type = %label, reason = %why, "Verification failed");
        self.audit
            .record(
                AuditRecord::new(AuditEvent::AuthFailure)
                    .with("authType", label)
                    .with("reason", why),
            )
            .await;
        Err(QueenError::Unauthorized(message.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    const SECRET: &str = "webhook-secret";

    fn request<'a>(headers: &'a HeaderMap, query: Option<&'a str>, body: &'a [u8]) -> InboundRequest<'a> {
        InboundRequest { headers, query, body }
    }

    fn signed_headers(body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let signature = sign_body(SECRET.as_bytes(), body).unwrap();
        headers.insert(GITHUB_SIGNATURE_HEADER, HeaderValue::from_str(&signature).unwrap());
        headers
    }

    async fn single_record(audit: &AuditTrail) -> AuditRecord {
        let records = audit.records().await;
        assert_eq!(records.len(), 1, "expected exactly one audit record");
        records.into_iter().next().unwrap()
    }

    #[tokio::test]
    async fn test_valid_hmac_passes() {
        let audit = AuditTrail::in_memory();
        let auth = Authenticator::new(false, audit.clone());
        let body = br#"{"zen":"hi"}"#;
        let headers = signed_headers(body);

        let outcome = auth
            .verify(
                "github-webhook",
                &Verification::hmac(GITHUB_SIGNATURE_HEADER, Some(SECRET.into())),
                &request(&headers, None, body),
            )
            .await
            .unwrap();

        assert_eq!(outcome, AuthOutcome::Verified);
        let record = single_record(&audit).await;
        assert_eq!(record.event, AuditEvent::AuthSuccess);
        assert_eq!(record.field("authType").unwrap(), "github-webhook");
    }

    #[tokio::test]
    async fn test_tampered_body_rejected() {
        let audit = AuditTrail::in_memory();
        let auth = Authenticator::new(false, audit.clone());
        let headers = signed_headers(br#"{"amount":100}"#);

        let err = auth
            .verify(
                "github-webhook",
                &Verification::hmac(GITHUB_SIGNATURE_HEADER, Some(SECRET.into())),
                &request(&headers, None, br#"{"amount":900}"#),
            )
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), hyper::StatusCode::UNAUTHORIZED);
        let record = single_record(&audit).await;
        assert_eq!(record.event, AuditEvent::AuthFailure);
        assert_eq!(record.field("reason").unwrap(), reason::INVALID_SIGNATURE);
    }

    #[tokio::test]
    async fn test_missing_signature_rejected() {
        let audit = AuditTrail::in_memory();
        let auth = Authenticator::new(true, audit.clone());
        let headers = HeaderMap::new();

        // Secret configured, so dev mode does not bypass
        let err = auth
            .verify(
                "github-webhook",
                &Verification::hmac(GITHUB_SIGNATURE_HEADER, Some(SECRET.into())),
                &request(&headers, None, b"{}"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, QueenError::Unauthorized(_)));
        let record = single_record(&audit).await;
        assert_eq!(record.field("reason").unwrap(), reason::MISSING_SIGNATURE);
    }

    #[tokio::test]
    async fn test_dev_mode_without_secret_skips_loudly() {
        for verification in [
            Verification::hmac(GITHUB_SIGNATURE_HEADER, None),
            Verification::static_token("x-zapier-token", "token", None),
        ] {
            let audit = AuditTrail::in_memory();
            let auth = Authenticator::new(true, audit.clone());
            let headers = HeaderMap::new();

            let outcome = auth
                .verify("source", &verification, &request(&headers, None, b"{}"))
                .await
                .unwrap();

            assert_eq!(outcome, AuthOutcome::DevelopmentSkip);
            let record = single_record(&audit).await;
            assert_eq!(record.event, AuditEvent::AuthSuccess);
            assert_eq!(record.field("mode").unwrap(), reason::DEVELOPMENT_SKIP);
        }
    }

    #[tokio::test]
    async fn test_production_without_secret_rejects() {
        for verification in [
            Verification::hmac(GITHUB_SIGNATURE_HEADER, None),
            Verification::static_token("x-zapier-token", "token", Some(String::new())),
        ] {
            let audit = AuditTrail::in_memory();
            let auth = Authenticator::new(false, audit.clone());
            let headers = HeaderMap::new();

            let err = auth
                .verify("source", &verification, &request(&headers, None, b"{}"))
                .await
                .unwrap_err();

            assert_eq!(err.status_code(), hyper::StatusCode::UNAUTHORIZED);
            let record = single_record(&audit).await;
            assert_eq!(record.field("reason").unwrap(), reason::MISSING_SECRET);
        }
    }

    #[tokio::test]
    async fn test_static_token_header_and_query() {
        let verification = Verification::static_token("x-zapier-token", "token", Some("zap".into()));
        let audit = AuditTrail::in_memory();
        let auth = Authenticator::new(false, audit.clone());

        let mut headers = HeaderMap::new();
        headers.insert("x-zapier-token", HeaderValue::from_static("zap"));
        assert_eq!(
            auth.verify("zapier-webhook", &verification, &request(&headers, None, b""))
                .await
                .unwrap(),
            AuthOutcome::Verified
        );

        let empty = HeaderMap::new();
        assert_eq!(
            auth.verify("zapier-webhook", &verification, &request(&empty, Some("token=zap"), b""))
                .await
                .unwrap(),
            AuthOutcome::Verified
        );

        let err = auth
            .verify("zapier-webhook", &verification, &request(&empty, Some("token=zip"), b""))
            .await
            .unwrap_err();
        assert!(matches!(err, QueenError::Unauthorized(_)));

        let failures = audit.records_of(AuditEvent::AuthFailure).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].field("reason").unwrap(), reason::INVALID_TOKEN);
        assert_eq!(audit.records().await.len(), 3);
    }

    #[tokio::test]
    async fn test_unverified_source_writes_nothing() {
        let audit = AuditTrail::in_memory();
        let auth = Authenticator::new(false, audit.clone());
        let headers = HeaderMap::new();

        let outcome = auth
            .verify("snhu-webhook", &Verification::None, &request(&headers, None, b""))
            .await
            .unwrap();
        assert_eq!(outcome, AuthOutcome::NotRequired);
        assert!(audit.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_app_credential_unconfigured() {
        let audit = AuditTrail::in_memory();
        let auth = Authenticator::new(false, audit.clone())
            .with_app_issuer(AppCredentialIssuer::new("1884781", "/missing/key.pem"));

        let err = auth.issue_app_credential().await.unwrap_err();
        assert_eq!(err.status_code(), hyper::StatusCode::SERVICE_UNAVAILABLE);

        let record = single_record(&audit).await;
        assert_eq!(record.event, AuditEvent::AuthFailure);
        assert_eq!(record.field("authType").unwrap(), APP_CREDENTIAL_LABEL);
    }

    #[test]
    fn test_verification_for_providers() {
        let creds = WebhookCredentials::new()
            .with(WebhookProvider::Github, Some("gh".into()))
            .with(WebhookProvider::Zapier, Some(String::new()));

        assert!(creds.has_secret(WebhookProvider::Github));
        assert!(!creds.has_secret(WebhookProvider::Zapier));

        match creds.verification_for(WebhookProvider::Github, VerificationKind::HmacSha256) {
            Verification::HmacSha256 { header, secret } => {
                assert_eq!(header, GITHUB_SIGNATURE_HEADER);
                assert_eq!(secret.as_deref(), Some("gh"));
            }
            other => panic!("unexpected verification {:?}", other),
        }

        match creds.verification_for(WebhookProvider::Discord, VerificationKind::HeaderToken) {
            Verification::StaticToken { header, param, token } => {
                assert_eq!(header, "x-discord-token");
                assert_eq!(param, "token");
                assert!(token.is_none());
            }
            other => panic!("unexpected verification {:?}", other),
        }

        assert!(matches!(
            creds.verification_for(WebhookProvider::Snhu, VerificationKind::None),
            Verification::None
        ));
    }
}
