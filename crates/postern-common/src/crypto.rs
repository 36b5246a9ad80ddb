//! Cryptographic helpers for identity binding, commit hashing and presence
//! assertions.
//!
//! The relay treats these as opaque primitives: Ed25519 signature
//! verification for identity claims and presence records, SHA-256 for the
//! preimage → commit mapping. Payload encryption never happens here; the
//! relay only ever sees ciphertext blobs.

use crate::types::{Commit, Id52, Preimage};
use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

/// Computes the commit for a preimage: `SHA-256(preimage)`.
///
/// # Examples
///
/// ```
/// let commit = postern_common::crypto::commit_of(&[7u8; 32]);
/// assert_ne!(commit, [7u8; 32]);
/// ```
#[must_use]
pub fn commit_of(preimage: &Preimage) -> Commit {
    Sha256::digest(preimage).into()
}

fn binding_message(nonce: u32, id52: &Id52) -> [u8; 36] {
    let mut msg = [0u8; 36];
    msg[..4].copy_from_slice(&nonce.to_be_bytes());
    msg[4..].copy_from_slice(id52);
    msg
}

/// Signs an identity claim: `Ed25519(nonce_be ‖ id52)`.
///
/// Used by clients answering the relay's HELLO nonce.
///
/// # Examples
///
/// ```
/// use ed25519_dalek::SigningKey;
/// use postern_common::crypto;
///
/// let key = SigningKey::from_bytes(&[1u8; 32]);
/// let id52 = key.verifying_key().to_bytes();
/// let sig = crypto::sign_binding(&key, 0xAABB, &id52);
/// assert!(crypto::verify_binding(&key.verifying_key(), 0xAABB, &id52, &sig));
/// ```
#[must_use]
pub fn sign_binding(signing_key: &SigningKey, nonce: u32, id52: &Id52) -> [u8; 64] {
    use ed25519_dalek::Signer;
    signing_key.sign(&binding_message(nonce, id52)).to_bytes()
}

/// Verifies an identity-claim signature over `nonce_be ‖ id52`.
#[must_use]
pub fn verify_binding(
    verifying_key: &VerifyingKey,
    nonce: u32,
    id52: &Id52,
    signature: &[u8; 64],
) -> bool {
    use ed25519_dalek::Verifier;
    let sig = Signature::from_bytes(signature);
    verifying_key
        .verify(&binding_message(nonce, id52), &sig)
        .is_ok()
}

fn presence_message(id52: &Id52, relay: &str, issued_at: u64, ttl_secs: u32) -> Vec<u8> {
    let relay = relay.as_bytes();
    let mut msg = Vec::with_capacity(32 + relay.len() + 12);
    msg.extend_from_slice(id52);
    msg.extend_from_slice(relay);
    msg.extend_from_slice(&issued_at.to_be_bytes());
    msg.extend_from_slice(&ttl_secs.to_be_bytes());
    msg
}

/// Signs a presence assertion: `Ed25519(id52 ‖ relay ‖ issued_at_be ‖ ttl_be)`.
#[must_use]
pub fn sign_presence(
    signing_key: &SigningKey,
    id52: &Id52,
    relay: &str,
    issued_at: u64,
    ttl_secs: u32,
) -> [u8; 64] {
    use ed25519_dalek::Signer;
    signing_key
        .sign(&presence_message(id52, relay, issued_at, ttl_secs))
        .to_bytes()
}

/// Verifies a presence-assertion signature against the asserted identity.
#[must_use]
pub fn verify_presence(
    verifying_key: &VerifyingKey,
    id52: &Id52,
    relay: &str,
    issued_at: u64,
    ttl_secs: u32,
    signature: &[u8; 64],
) -> bool {
    use ed25519_dalek::Verifier;
    let sig = Signature::from_bytes(signature);
    verifying_key
        .verify(&presence_message(id52, relay, issued_at, ttl_secs), &sig)
        .is_ok()
}

/// Returns the current Unix timestamp in seconds.
///
/// Returns 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_is_deterministic() {
        let preimage = [0x42u8; 32];
        assert_eq!(commit_of(&preimage), commit_of(&preimage));
    }

    #[test]
    fn distinct_preimages_give_distinct_commits() {
        assert_ne!(commit_of(&[1u8; 32]), commit_of(&[2u8; 32]));
    }

    #[test]
    fn binding_sign_and_verify_round_trip() {
        let key = SigningKey::from_bytes(&[9u8; 32]);
        let id52 = key.verifying_key().to_bytes();
        let sig = sign_binding(&key, 0xDEAD_BEEF, &id52);
        assert!(verify_binding(&key.verifying_key(), 0xDEAD_BEEF, &id52, &sig));
    }

    #[test]
    fn wrong_nonce_fails_binding_verification() {
        let key = SigningKey::from_bytes(&[9u8; 32]);
        let id52 = key.verifying_key().to_bytes();
        let sig = sign_binding(&key, 1, &id52);
        assert!(!verify_binding(&key.verifying_key(), 2, &id52, &sig));
    }

    #[test]
    fn wrong_identity_fails_binding_verification() {
        let key = SigningKey::from_bytes(&[9u8; 32]);
        let id52 = key.verifying_key().to_bytes();
        let sig = sign_binding(&key, 1, &id52);
        assert!(!verify_binding(&key.verifying_key(), 1, &[0u8; 32], &sig));
    }

    #[test]
    fn wrong_key_fails_binding_verification() {
        let key = SigningKey::from_bytes(&[9u8; 32]);
        let other = SigningKey::from_bytes(&[8u8; 32]);
        let id52 = key.verifying_key().to_bytes();
        let sig = sign_binding(&key, 1, &id52);
        assert!(!verify_binding(&other.verifying_key(), 1, &id52, &sig));
    }

    #[test]
    fn presence_sign_and_verify_round_trip() {
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let id52 = key.verifying_key().to_bytes();
        let sig = sign_presence(&key, &id52, "relay.example:7331", 1_700_000_000, 300);
        assert!(verify_presence(
            &key.verifying_key(),
            &id52,
            "relay.example:7331",
            1_700_000_000,
            300,
            &sig
        ));
    }

    #[test]
    fn tampered_presence_ttl_fails_verification() {
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let id52 = key.verifying_key().to_bytes();
        let sig = sign_presence(&key, &id52, "relay.example:7331", 1_700_000_000, 300);
        assert!(!verify_presence(
            &key.verifying_key(),
            &id52,
            "relay.example:7331",
            1_700_000_000,
            3000,
            &sig
        ));
    }

    #[test]
    fn unix_now_is_after_2023() {
        assert!(unix_now() > 1_700_000_000);
    }
}
