//! Signed download-capability tokens.
//!
//! A token is `base64url(payload_json) "." base64url(hmac_sha256(payload_json))`
//! where the payload carries the purchase, the asset locator, an absolute
//! expiry, and a fresh nonce. The token is self-describing: nothing about it
//! needs server-side storage to verify, only the signing key.
//!
//! `verify` checks structure and signature only. Expiry and attempt limits
//! are policy decisions that belong to the access gate, which receives the
//! decoded payload and evaluates them against the purchase record.

use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Signing key size (256 bits)
const TOKEN_KEY_SIZE: usize = 32;

/// HMAC-SHA256 output size
const SIGNATURE_SIZE: usize = 32;

const SECONDS_PER_HOUR: i64 = 3600;

/// Holds the server-side HMAC key that signs download tokens.
/// Thread-safe and cheaply cloneable.
#[derive(Clone)]
pub struct TokenKey {
    key: [u8; TOKEN_KEY_SIZE],
}

impl TokenKey {
    /// Create a TokenKey from a base64-encoded string.
    /// The decoded key must be exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|e| AppError::Internal(format!("Invalid token key encoding: {}", e)))?;

        if decoded.len() != TOKEN_KEY_SIZE {
            return Err(AppError::Internal(format!(
                "Token key must be {} bytes, got {}",
                TOKEN_KEY_SIZE,
                decoded.len()
            )));
        }

        let mut key = [0u8; TOKEN_KEY_SIZE];
        key.copy_from_slice(&decoded);
        Ok(Self { key })
    }

    /// Generate a new random key (for initial setup).
    /// Returns the key as a base64-encoded string.
    pub fn generate() -> String {
        use rand::rngs::OsRng;
        use rand::RngCore;
        let mut key = [0u8; TOKEN_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        BASE64.encode(key)
    }

    /// Create a TokenKey from raw bytes.
    /// Note: For production, prefer `from_base64` with a securely stored key.
    pub fn from_bytes(key: [u8; TOKEN_KEY_SIZE]) -> Self {
        Self { key }
    }

    fn sign(&self, payload: &[u8]) -> [u8; SIGNATURE_SIZE] {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(payload);
        mac.finalize().into_bytes().into()
    }
}

/// The signed content of a download token.
///
/// Field order is fixed by this struct; `serde_json` serialization of it is
/// the canonical byte form the signature covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub purchase_id: String,
    /// Opaque locator of the rendered asset, resolved by object storage
    pub resource: String,
    /// Unix timestamp after which the token is dead
    pub expires_at: i64,
    /// Fresh per-issuance randomness so reissued tokens never collide
    pub nonce: String,
}

/// A freshly minted token plus the expiry baked into it.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: i64,
}

/// Verification failure. Deliberately carries no detail about which part of
/// the token was wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
}

/// Mint a signed token for one purchase/asset pair.
///
/// `ttl_hours` may be zero or negative; the resulting token is already
/// expired but still structurally valid. That is intentional, the expiry
/// policy lives in the access gate, not here.
pub fn issue(
    key: &TokenKey,
    purchase_id: &str,
    resource: &str,
    ttl_hours: i64,
) -> Result<IssuedToken> {
    let expires_at = ttl_hours
        .checked_mul(SECONDS_PER_HOUR)
        .and_then(|ttl| Utc::now().timestamp().checked_add(ttl))
        .ok_or_else(|| AppError::BadRequest("ttl_hours out of range".into()))?;
    let payload = TokenPayload {
        purchase_id: purchase_id.to_string(),
        resource: resource.to_string(),
        expires_at,
        nonce: Uuid::new_v4().as_simple().to_string(),
    };

    let payload_bytes = serde_json::to_vec(&payload)?;
    let signature = key.sign(&payload_bytes);

    let token = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(&payload_bytes),
        URL_SAFE_NO_PAD.encode(signature)
    );

    Ok(IssuedToken { token, expires_at })
}

/// Decode and authenticate a token.
///
/// Any structural problem (bad base64, missing separator, malformed JSON)
/// and any signature mismatch collapse into the same `TokenError::Invalid`.
/// The signature comparison is constant-time; no payload field is parsed
/// before the signature over the raw bytes has been checked.
pub fn verify(key: &TokenKey, token: &str) -> std::result::Result<TokenPayload, TokenError> {
    let token = token.trim();
    let (payload_b64, signature_b64) = token.split_once('.').ok_or(TokenError::Invalid)?;

    let payload_bytes = decode_part(payload_b64)?;
    let signature = decode_part(signature_b64)?;

    // Signature length is public (always 32 bytes for HMAC-SHA256), so this
    // early exit leaks nothing useful.
    if signature.len() != SIGNATURE_SIZE {
        return Err(TokenError::Invalid);
    }

    let expected = key.sign(&payload_bytes);
    if !bool::from(expected.ct_eq(signature.as_slice())) {
        return Err(TokenError::Invalid);
    }

    serde_json::from_slice(&payload_bytes).map_err(|_| TokenError::Invalid)
}

/// Base64url-decode one token segment, tolerating trailing `=` padding.
/// Links get mangled by email clients; padding stripped or added must both work.
fn decode_part(part: &str) -> std::result::Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(part.trim_end_matches('='))
        .map_err(|_| TokenError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> TokenKey {
        TokenKey::from_bytes([42u8; TOKEN_KEY_SIZE])
    }

    #[test]
    fn test_round_trip() {
        let key = test_key();
        let issued = issue(&key, "rz_pur_abc", "renders/rz_file_x.mp4", 48).unwrap();

        let payload = verify(&key, &issued.token).unwrap();
        assert_eq!(payload.purchase_id, "rz_pur_abc");
        assert_eq!(payload.resource, "renders/rz_file_x.mp4");
        assert_eq!(payload.expires_at, issued.expires_at);
        assert!(payload.expires_at > Utc::now().timestamp());
    }

    #[test]
    fn test_negative_ttl_is_accepted() {
        let key = test_key();
        let issued = issue(&key, "rz_pur_abc", "renders/a.mp4", -1).unwrap();

        // Structurally valid, just already expired
        let payload = verify(&key, &issued.token).unwrap();
        assert!(payload.expires_at < Utc::now().timestamp());
    }

    #[test]
    fn test_extreme_ttl_is_an_error() {
        let key = test_key();
        // Overflowing the expiry arithmetic must be an error, not a panic
        assert!(issue(&key, "rz_pur_abc", "renders/a.mp4", i64::MAX).is_err());
        assert!(issue(&key, "rz_pur_abc", "renders/a.mp4", i64::MIN).is_err());
    }

    #[test]
    fn test_nonce_makes_tokens_distinct() {
        let key = test_key();
        let t1 = issue(&key, "rz_pur_abc", "renders/a.mp4", 48).unwrap();
        let t2 = issue(&key, "rz_pur_abc", "renders/a.mp4", 48).unwrap();
        assert_ne!(t1.token, t2.token);
    }

    #[test]
    fn test_wrong_key_rejected() {
        let issued = issue(&test_key(), "rz_pur_abc", "renders/a.mp4", 48).unwrap();
        let other = TokenKey::from_bytes([7u8; TOKEN_KEY_SIZE]);
        assert_eq!(verify(&other, &issued.token), Err(TokenError::Invalid));
    }

    #[test]
    fn test_padding_tolerance() {
        let key = test_key();
        let issued = issue(&key, "rz_pur_abc", "renders/a.mp4", 48).unwrap();

        // Trailing padding appended to the token must not break verification
        assert!(verify(&key, &format!("{}=", issued.token)).is_ok());
        assert!(verify(&key, &format!("{}==", issued.token)).is_ok());

        // Fully re-padded segments must also verify
        use base64::engine::general_purpose::URL_SAFE;
        let (p, s) = issued.token.split_once('.').unwrap();
        let padded = format!(
            "{}.{}",
            URL_SAFE.encode(URL_SAFE_NO_PAD.decode(p).unwrap()),
            URL_SAFE.encode(URL_SAFE_NO_PAD.decode(s).unwrap())
        );
        assert!(verify(&key, &padded).is_ok());
    }

    #[test]
    fn test_garbage_rejected() {
        let key = test_key();
        assert_eq!(verify(&key, ""), Err(TokenError::Invalid));
        assert_eq!(verify(&key, "no-separator"), Err(TokenError::Invalid));
        assert_eq!(verify(&key, "a.b.c"), Err(TokenError::Invalid));
        assert_eq!(verify(&key, "!!!.###"), Err(TokenError::Invalid));
    }
}
