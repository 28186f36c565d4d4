//! Expiry claim extraction
//!
//! The credential is a signed `header.claims.signature` token, optionally
//! wrapped in a `name=` cookie prefix. Only the claims segment is decoded and
//! only `exp` is read; the signature is never verified here.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use craftbridge_core::{BridgeError, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};

#[derive(Deserialize)]
struct Claims {
    exp: i64,
}

/// Expiry instant embedded in `credential`
pub fn expires_at(credential: &str) -> Result<DateTime<Utc>> {
    let segments: Vec<&str> = credential.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(BridgeError::Credential(format!(
            "expected 3 token segments, found {}",
            segments.len()
        )));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|e| BridgeError::Credential(format!("claims are not base64: {}", e)))?;
    let claims: Claims = serde_json::from_slice(&payload)
        .map_err(|e| BridgeError::Credential(format!("claims have no usable exp: {}", e)))?;

    DateTime::from_timestamp(claims.exp, 0)
        .ok_or_else(|| BridgeError::Credential(format!("exp out of range: {}", claims.exp)))
}

/// Short, non-reversible identifier for logging a credential
pub fn fingerprint(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    hex::encode(&digest[..4])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build an unsigned token whose claims carry `exp`
    pub(crate) fn token_expiring(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let claims = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"bridge","exp":{}}}"#, exp));
        format!("{}.{}.signature", header, claims)
    }

    #[test]
    fn test_reads_exp() {
        let token = token_expiring(1_900_000_000);
        assert_eq!(expires_at(&token).unwrap().timestamp(), 1_900_000_000);
    }

    #[test]
    fn test_cookie_prefix_is_tolerated() {
        let token = format!("session={}", token_expiring(1_800_000_000));
        assert_eq!(expires_at(&token).unwrap().timestamp(), 1_800_000_000);
    }

    #[test]
    fn test_padded_claims_segment() {
        let claims = base64::engine::general_purpose::URL_SAFE.encode(r#"{"exp": 1700000000}"#);
        assert!(claims.ends_with('='));
        let token = format!("h.{}.s", claims);
        assert_eq!(expires_at(&token).unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_unparsable_credentials() {
        for credential in ["", "opaque-cookie", "a.b", "a.!!!.c"] {
            assert!(
                matches!(expires_at(credential), Err(BridgeError::Credential(_))),
                "credential: {:?}",
                credential
            );
        }

        let no_exp = format!("h.{}.s", URL_SAFE_NO_PAD.encode(r#"{"sub":"x"}"#));
        assert!(expires_at(&no_exp).is_err());
    }

    #[test]
    fn test_fingerprint_is_short_and_stable() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        assert_eq!(fingerprint("abc").len(), 8);
    }
}
