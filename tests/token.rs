//! Token codec tests: round-trip fidelity, tamper detection, padding
//! tolerance, and cross-purchase isolation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;

use resonate::token;

mod common;
use common::test_token_key;

const BASE64URL_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

#[test]
fn test_round_trip_preserves_all_fields() {
    let key = test_token_key();
    let issued = token::issue(&key, "rz_pur_p1", "renders/rz_file_p1.mp4", 48).unwrap();

    let payload = token::verify(&key, &issued.token).unwrap();
    assert_eq!(payload.purchase_id, "rz_pur_p1");
    assert_eq!(payload.resource, "renders/rz_file_p1.mp4");
    assert_eq!(payload.expires_at, issued.expires_at);
    assert!(!payload.nonce.is_empty());
}

#[test]
fn test_reissue_never_collides() {
    let key = test_token_key();
    let tokens: Vec<String> = (0..20)
        .map(|_| {
            token::issue(&key, "rz_pur_p1", "renders/a.mp4", 48)
                .unwrap()
                .token
        })
        .collect();

    let unique: std::collections::HashSet<&String> = tokens.iter().collect();
    assert_eq!(unique.len(), tokens.len(), "every issuance must be distinct");
}

/// Flip a single character at every position to a different alphabet
/// character; verification must fail each time.
#[test]
fn test_single_character_flips_are_rejected() {
    let key = test_token_key();
    let issued = token::issue(&key, "rz_pur_p1", "renders/a.mp4", 48).unwrap();
    let original = issued.token.as_bytes();
    let mut rng = rand::thread_rng();

    for pos in 0..original.len() {
        let mut mutated = original.to_vec();
        loop {
            let candidate = BASE64URL_ALPHABET[rng.gen_range(0..BASE64URL_ALPHABET.len())];
            if candidate != mutated[pos] {
                mutated[pos] = candidate;
                break;
            }
        }
        let mutated = String::from_utf8(mutated).unwrap();
        assert!(
            token::verify(&key, &mutated).is_err(),
            "flip at position {} must invalidate the token",
            pos
        );
    }
}

#[test]
fn test_insertions_and_deletions_are_rejected() {
    let key = test_token_key();
    let issued = token::issue(&key, "rz_pur_p1", "renders/a.mp4", 48).unwrap();
    let original = issued.token.as_bytes();
    let mut rng = rand::thread_rng();

    for _ in 0..200 {
        // Random single-character insertion
        let pos = rng.gen_range(0..=original.len());
        let ch = BASE64URL_ALPHABET[rng.gen_range(0..BASE64URL_ALPHABET.len())];
        let mut inserted = original.to_vec();
        inserted.insert(pos, ch);
        assert!(
            token::verify(&key, &String::from_utf8(inserted).unwrap()).is_err(),
            "insertion at {} must invalidate the token",
            pos
        );

        // Random single-character deletion
        let pos = rng.gen_range(0..original.len());
        let mut deleted = original.to_vec();
        deleted.remove(pos);
        assert!(
            token::verify(&key, &String::from_utf8(deleted).unwrap()).is_err(),
            "deletion at {} must invalidate the token",
            pos
        );
    }
}

#[test]
fn test_truncation_is_rejected() {
    let key = test_token_key();
    let issued = token::issue(&key, "rz_pur_p1", "renders/a.mp4", 48).unwrap();

    for len in 0..issued.token.len() {
        assert!(
            token::verify(&key, &issued.token[..len]).is_err(),
            "truncation to {} chars must invalidate the token",
            len
        );
    }
}

/// A payload referencing purchase B glued to purchase A's signature must
/// never validate: cross-purchase token confusion is impossible.
#[test]
fn test_payload_substitution_is_rejected() {
    let key = test_token_key();
    let issued = token::issue(&key, "rz_pur_a", "renders/a.mp4", 48).unwrap();
    let (payload_b64, signature_b64) = issued.token.split_once('.').unwrap();

    let payload_bytes = URL_SAFE_NO_PAD.decode(payload_b64).unwrap();
    let substituted = String::from_utf8(payload_bytes)
        .unwrap()
        .replace("rz_pur_a", "rz_pur_b");

    let forged = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(substituted.as_bytes()),
        signature_b64
    );
    assert!(token::verify(&key, &forged).is_err());
}

#[test]
fn test_tokens_for_different_purchases_do_not_cross_validate() {
    let key = test_token_key();
    let a = token::issue(&key, "rz_pur_a", "renders/a.mp4", 48).unwrap();
    let b = token::issue(&key, "rz_pur_b", "renders/b.mp4", 48).unwrap();

    // Mixing segments from two genuine tokens must fail
    let (pa, _) = a.token.split_once('.').unwrap();
    let (_, sb) = b.token.split_once('.').unwrap();
    assert!(token::verify(&key, &format!("{}.{}", pa, sb)).is_err());
}

#[test]
fn test_padding_variants_verify() {
    let key = test_token_key();
    let issued = token::issue(&key, "rz_pur_p1", "renders/a.mp4", 48).unwrap();

    assert!(token::verify(&key, &issued.token).is_ok());
    assert!(token::verify(&key, &format!("{}=", issued.token)).is_ok());
    assert!(token::verify(&key, &format!("{}==", issued.token)).is_ok());
    assert!(token::verify(&key, &format!("  {}  ", issued.token)).is_ok());
}

#[test]
fn test_pre_expired_token_still_decodes() {
    let key = test_token_key();
    let issued = token::issue(&key, "rz_pur_p1", "renders/a.mp4", -1).unwrap();

    // The codec accepts negative TTLs; expiry is gate policy
    let payload = token::verify(&key, &issued.token).unwrap();
    assert!(payload.expires_at < chrono::Utc::now().timestamp());
}
