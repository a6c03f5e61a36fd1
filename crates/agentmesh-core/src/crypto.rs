// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Cryptographic primitives (C1): Ed25519 keypairs, SHA-256, unpadded
//! base64url, and JWK encode/decode (RFC 7517, OKP/Ed25519).
//!
//! No private material is ever emitted unless the caller explicitly asks
//! for it (`include_private = true` on [`keypair_to_jwk`]).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey, SIGNATURE_LENGTH};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::IdentityError;

pub const PUBLIC_KEY_LEN: usize = 32;
pub const SECRET_KEY_LEN: usize = 32;

/// An Ed25519 signing keypair.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a fresh keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Reconstruct a keypair from its 32-byte secret scalar.
    pub fn from_secret_bytes(secret: &[u8; SECRET_KEY_LEN]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn secret_key_bytes(&self) -> [u8; SECRET_KEY_LEN] {
        self.signing_key.to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LENGTH] {
        self.signing_key.sign(message).to_bytes()
    }
}

/// Verify an Ed25519 signature. Returns `false` on any malformed input
/// rather than erroring — callers treat an unverifiable signature the same
/// as an invalid one.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(key_bytes) = <[u8; PUBLIC_KEY_LEN]>::try_from(public_key) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; SIGNATURE_LENGTH]>::try_from(signature) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_bytes);
    verifying_key.verify(message, &signature).is_ok()
}

pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex_encode(&sha256(bytes))
}

pub fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

pub fn b64url_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn b64url_decode(value: &str) -> Result<Vec<u8>, IdentityError> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|_| IdentityError::InvalidBase64(value.to_string()))
}

// ---------------------------------------------------------------------------
// JWK (RFC 7517, OKP / Ed25519)
// ---------------------------------------------------------------------------

/// A single JSON Web Key representing an Ed25519 public (and optionally
/// private) key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    pub kid: String,
    #[serde(rename = "use")]
    pub use_: String,
}

/// A JWK Set — `{"keys": [...]}` — as produced by [`to_jwks`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Export a keypair as a JWK. `kid` is the owning DID. Private material
/// (`d`) is included only when `include_private` is set.
pub fn to_jwk(keypair: &KeyPair, kid: &str, include_private: bool) -> Jwk {
    Jwk {
        kty: "OKP".to_string(),
        crv: "Ed25519".to_string(),
        x: b64url_encode(&keypair.public_key_bytes()),
        d: include_private.then(|| b64url_encode(&keypair.secret_key_bytes())),
        kid: kid.to_string(),
        use_: "sig".to_string(),
    }
}

/// Export just the public key as a JWK (never contains `d`).
pub fn to_jwk_public(public_key: &[u8], kid: &str) -> Jwk {
    Jwk {
        kty: "OKP".to_string(),
        crv: "Ed25519".to_string(),
        x: b64url_encode(public_key),
        d: None,
        kid: kid.to_string(),
        use_: "sig".to_string(),
    }
}

fn check_okp_ed25519(jwk: &Jwk) -> Result<(), IdentityError> {
    if jwk.kty != "OKP" {
        return Err(IdentityError::UnsupportedKeyType(jwk.kty.clone()));
    }
    if jwk.crv != "Ed25519" {
        return Err(IdentityError::UnsupportedCurve(jwk.crv.clone()));
    }
    if jwk.x.is_empty() {
        return Err(IdentityError::MissingJwkField("x".to_string()));
    }
    Ok(())
}

/// Reconstruct a full keypair from a JWK that carries `d`. Fails with
/// [`IdentityError::PrivateKeyUnavailable`] if `d` is absent.
pub fn from_jwk(jwk: &Jwk) -> Result<KeyPair, IdentityError> {
    check_okp_ed25519(jwk)?;
    let d = jwk.d.as_ref().ok_or(IdentityError::PrivateKeyUnavailable)?;
    let secret_bytes = b64url_decode(d)?;
    let secret: [u8; SECRET_KEY_LEN] = secret_bytes
        .try_into()
        .map_err(|_| IdentityError::InvalidBase64("d".to_string()))?;
    Ok(KeyPair::from_secret_bytes(&secret))
}

/// Extract only the raw public key bytes from a JWK (works whether or not
/// `d` is present).
pub fn jwk_public_key_bytes(jwk: &Jwk) -> Result<Vec<u8>, IdentityError> {
    check_okp_ed25519(jwk)?;
    b64url_decode(&jwk.x)
}

pub fn to_jwks(keys: Vec<Jwk>) -> JwkSet {
    JwkSet { keys }
}

/// Find a key in a JWK Set. With no `kid`, returns the first key; an empty
/// set is always an error.
pub fn from_jwks<'a>(jwks: &'a JwkSet, kid: Option<&str>) -> Result<&'a Jwk, IdentityError> {
    if jwks.keys.is_empty() {
        return Err(IdentityError::EmptyJwks);
    }
    match kid {
        Some(kid) => jwks
            .keys
            .iter()
            .find(|key| key.kid == kid)
            .ok_or_else(|| IdentityError::KidNotFound(kid.to_string())),
        None => Ok(&jwks.keys[0]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let keypair = KeyPair::generate();
        let message = b"mesh handshake payload";
        let signature = keypair.sign(message);
        assert!(verify(&keypair.public_key_bytes(), message, &signature));
        assert!(!verify(&keypair.public_key_bytes(), b"tampered", &signature));
    }

    #[test]
    fn b64url_has_no_padding_or_unsafe_chars() {
        let encoded = b64url_encode(&[0xff; 32]);
        assert!(!encoded.contains('='));
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        let decoded = b64url_decode(&encoded).unwrap();
        assert_eq!(decoded, vec![0xff; 32]);
    }

    #[test]
    fn jwk_roundtrip_preserves_signing_capability() {
        let keypair = KeyPair::generate();
        let jwk = to_jwk(&keypair, "did:mesh:abc123", true);
        assert_eq!(jwk.kty, "OKP");
        assert_eq!(jwk.crv, "Ed25519");
        assert!(jwk.d.is_some());

        let restored = from_jwk(&jwk).unwrap();
        let message = b"round trip";
        let signature = restored.sign(message);
        assert!(verify(&keypair.public_key_bytes(), message, &signature));
    }

    #[test]
    fn jwk_without_private_key_rejects_from_jwk() {
        let keypair = KeyPair::generate();
        let jwk = to_jwk(&keypair, "did:mesh:abc123", false);
        assert!(jwk.d.is_none());
        let result = from_jwk(&jwk);
        assert!(matches!(result, Err(IdentityError::PrivateKeyUnavailable)));
    }

    #[test]
    fn jwk_rejects_wrong_kty_and_crv() {
        let mut jwk = to_jwk(&KeyPair::generate(), "did:mesh:x", false);
        jwk.kty = "RSA".to_string();
        assert!(matches!(from_jwk(&jwk), Err(IdentityError::UnsupportedKeyType(_))));

        let mut jwk = to_jwk(&KeyPair::generate(), "did:mesh:x", false);
        jwk.crv = "P-256".to_string();
        assert!(matches!(from_jwk(&jwk), Err(IdentityError::UnsupportedCurve(_))));
    }

    #[test]
    fn jwks_find_by_kid_and_errors() {
        let k1 = to_jwk_public(&KeyPair::generate().public_key_bytes(), "did:mesh:a");
        let k2 = to_jwk_public(&KeyPair::generate().public_key_bytes(), "did:mesh:b");
        let set = to_jwks(vec![k1, k2.clone()]);

        let found = from_jwks(&set, Some("did:mesh:b")).unwrap();
        assert_eq!(found.kid, k2.kid);

        assert!(matches!(
            from_jwks(&set, Some("did:mesh:missing")),
            Err(IdentityError::KidNotFound(_))
        ));

        let empty = to_jwks(vec![]);
        assert!(matches!(from_jwks(&empty, None), Err(IdentityError::EmptyJwks)));
    }
}
