//! Delegated app credentials
//!
//! When the queen calls out as its GitHub App identity it needs a short-lived
//! RS256 assertion signed with the app's private key:
//!
//! - `iat` backdated by a clock-skew margin (60s)
//! - `exp` ten minutes out
//! - `iss` the configured app id
//!
//! A missing or unreadable key fails only the operation that asked for the
//! credential.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::QueenError;

/// Backdating applied to `iat` to absorb clock drift
pub const CLOCK_SKEW_SECS: u64 = 60;

/// Assertion lifetime
pub const CREDENTIAL_TTL_SECS: u64 = 10 * 60;

/// Claims carried by an app assertion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppClaims {
    pub iat: u64,
    pub exp: u64,
    pub iss: String,
}

/// An issued assertion
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppCredential {
    pub token: String,
    pub app_id: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

/// Issues app assertions from a PEM key on disk
#[derive(Debug, Clone)]
pub struct AppCredentialIssuer {
    app_id: String,
    key_path: PathBuf,
}

impl AppCredentialIssuer {
    pub fn new(app_id: impl Into<String>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            app_id: app_id.into(),
            key_path: key_path.into(),
        }
    }

    /// Whether the key file is present (it may still fail to parse)
    pub fn key_present(&self) -> bool {
        self.key_path.is_file()
    }

    /// Sign a fresh assertion, reading the key from disk each time
    pub fn issue(&self) -> Result<AppCredential, QueenError> {
        let pem = std::fs::read(&self.key_path).map_err(|e| {
            QueenError::CredentialUnavailable(format!(
                "private key not readable at {}: {}",
                self.key_path.display(),
                e
            ))
        })?;

        let key = EncodingKey::from_rsa_pem(&pem).map_err(|e| {
            QueenError::CredentialUnavailable(format!("invalid private key: {}", e))
        })?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| QueenError::CredentialUnavailable(format!("System time error: {}", e)))?
            .as_secs();

        let claims = AppClaims {
            iat: now.saturating_sub(CLOCK_SKEW_SECS),
            exp: now + CREDENTIAL_TTL_SECS,
            iss: self.app_id.clone(),
        };

        let token = encode(&Header::new(Algorithm::RS256), &claims, &key)?;

        Ok(AppCredential {
            token,
            app_id: self.app_id.clone(),
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }
}
