//! HMAC-SHA256 webhook signatures
//!
//! Providers sign the raw request body with a shared secret and send
//! `sha256=<hex digest>` in a header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::token::constant_time_eq;

type HmacSha256 = Hmac<Sha256>;

/// Algorithm tag prefixed to every signature
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute `sha256=<hex(HMAC-SHA256(secret, body))>`
pub fn sign_body(secret: &[u8], body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(body);
    Some(format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Check a supplied signature header against the body.
///
/// Length mismatch rejects immediately (lengths are public); equal-length
/// values are compared without early exit.
pub fn verify_body_signature(secret: &[u8], body: &[u8], supplied: &str) -> bool {
    let Some(expected) = sign_body(secret, body) else {
        return false;
    };
    if expected.len() != supplied.len() {
        return false;
    }
    constant_time_eq(expected.as_bytes(), supplied.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"It's a Secret to Everybody";
    const BODY: &[u8] = b"Hello, World!";

    #[test]
    fn test_matches_github_reference_vector() {
        // Example from GitHub's webhook validation documentation
        assert_eq!(
            sign_body(SECRET, BODY).unwrap(),
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"
        );
    }

    #[test]
    fn test_valid_signature_verifies() {
        let signature = sign_body(SECRET, BODY).unwrap();
        assert!(verify_body_signature(SECRET, BODY, &signature));
    }

    #[test]
    fn test_any_single_byte_change_invalidates() {
        let body = br#"{"action":"created","zen":"Keep it logically awesome."}"#;
        let signature = sign_body(SECRET, body).unwrap();

        for i in 0..body.len() {
            let mut tampered = body.to_vec();
            tampered[i] ^= 0x01;
            assert!(
                !verify_body_signature(SECRET, &tampered, &signature),
                "byte {} flip was accepted",
                i
            );
        }
    }

    #[test]
    fn test_wrong_secret_and_malformed_headers() {
        let signature = sign_body(SECRET, BODY).unwrap();
        assert!(!verify_body_signature(b"other", BODY, &signature));
        assert!(!verify_body_signature(SECRET, BODY, ""));
        assert!(!verify_body_signature(SECRET, BODY, "sha256="));
        assert!(!verify_body_signature(SECRET, BODY, &signature[SIGNATURE_PREFIX.len()..]));
        assert!(!verify_body_signature(SECRET, BODY, &signature.replace("sha256=", "sha1=")));
    }
}
