//! Static token checks
//!
//! Tokens arrive in a header or a query parameter and are compared against
//! a configured value without leaking timing information.

use hyper::HeaderMap;
use subtle::ConstantTimeEq;

/// Constant-time byte comparison.
///
/// Unequal lengths return false straight away; equal-length inputs are
/// compared in full regardless of where they first differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Compare a supplied token with the expected one
pub fn token_matches(supplied: &str, expected: &str) -> bool {
    constant_time_eq(supplied.as_bytes(), expected.as_bytes())
}

/// Read a non-empty header value
pub fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Read a non-empty query parameter from a raw query string
pub fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query?).ok()?;
    pairs
        .into_iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value)
        .filter(|v| !v.is_empty())
}

/// Header first, then query parameter
pub fn extract_token(
    headers: &HeaderMap,
    query: Option<&str>,
    header: &str,
    param: &str,
) -> Option<String> {
    header_value(headers, header)
        .map(str::to_string)
        .or_else(|| query_param(query, param))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
        assert!(!constant_time_eq(b"hell", b"hello"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_mismatch_position_does_not_matter() {
        let expected = b"0123456789abcdef";
        let mut first = *expected;
        first[0] = b'X';
        let mut last = *expected;
        last[15] = b'X';

        assert!(!constant_time_eq(expected, &first));
        assert!(!constant_time_eq(expected, &last));
    }

    #[test]
    fn test_extract_prefers_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-zapier-token", HeaderValue::from_static("from-header"));

        assert_eq!(
            extract_token(&headers, Some("token=from-query"), "x-zapier-token", "token"),
            Some("from-header".into())
        );
        assert_eq!(
            extract_token(&HeaderMap::new(), Some("a=1&token=from-query"), "x-zapier-token", "token"),
            Some("from-query".into())
        );
        assert_eq!(
            extract_token(&HeaderMap::new(), Some("token="), "x-zapier-token", "token"),
            None
        );
        assert_eq!(extract_token(&HeaderMap::new(), None, "x-zapier-token", "token"), None);
    }

    #[test]
    fn test_query_param_decodes() {
        assert_eq!(
            query_param(Some("apiKey=a%2Bb%3D"), "apiKey"),
            Some("a+b=".into())
        );
    }
}
