// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Trust handshake: challenge-response mutual verification (C5).
//!
//! The protocol is symmetric — either side may initiate. Results (both
//! positive and negative) are cached per peer to avoid re-running the
//! crypto and lookups on every call; negative results get a much shorter
//! TTL so a transient failure doesn't wedge a peer out for long.

use std::collections::HashMap;

use parking_lot::RwLock;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::crypto::{self, KeyPair};
use crate::error::{HandshakeError, IdentityError};
use crate::identity::{base64_std_decode, IdentityStore};

pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 900;
pub const DEFAULT_NEGATIVE_CACHE_TTL_SECONDS: u64 = 60;
pub const DEFAULT_NONCE_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: String,
    pub nonce: String,
    pub timestamp_ms: u64,
    pub expires_in_seconds: u64,
}

impl Challenge {
    pub fn new(clock: &impl Clock, expires_in_seconds: u64) -> Self {
        let mut nonce_bytes = [0u8; 16]; // 128 bits
        OsRng.fill_bytes(&mut nonce_bytes);
        Self {
            challenge_id: crypto::hex_encode(&crypto::sha256(&nonce_bytes))[..16].to_string(),
            nonce: crypto::b64url_encode(&nonce_bytes),
            timestamp_ms: clock.now_ms(),
            expires_in_seconds,
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.timestamp_ms + self.expires_in_seconds * 1000
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub challenge_id: String,
    pub response_nonce: String,
    pub agent_did: String,
    pub capabilities: Vec<String>,
    pub trust_score: u32,
    pub signature: String,
    pub public_key: String,
}

impl ChallengeResponse {
    /// Build and sign a response. `signing_message` is
    /// `"{challenge_id}:{response_nonce}:{initiator_nonce}"`.
    pub fn build(
        challenge: &Challenge,
        agent_did: &str,
        capabilities: Vec<String>,
        trust_score: u32,
        signer: &KeyPair,
    ) -> Self {
        let mut nonce_bytes = [0u8; 16];
        OsRng.fill_bytes(&mut nonce_bytes);
        let response_nonce = crypto::b64url_encode(&nonce_bytes);
        let message = signing_message(&challenge.challenge_id, &response_nonce, &challenge.nonce);
        let signature = signer.sign(message.as_bytes());

        Self {
            challenge_id: challenge.challenge_id.clone(),
            response_nonce,
            agent_did: agent_did.to_string(),
            capabilities,
            trust_score,
            signature: crypto::b64url_encode(&signature),
            public_key: crypto::b64url_encode(&signer.public_key_bytes()),
        }
    }
}

fn signing_message(challenge_id: &str, response_nonce: &str, initiator_nonce: &str) -> String {
    format!("{challenge_id}:{response_nonce}:{initiator_nonce}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeResult {
    pub verified: bool,
    pub peer_did: String,
    pub trust_score: u32,
    pub capabilities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub latency_ms: u64,
    pub completed_at_ms: u64,
}

#[derive(Clone)]
struct CacheEntry {
    result: HandshakeResult,
    cached_at_ms: u64,
    ttl_ms: u64,
}

impl CacheEntry {
    fn is_fresh(&self, now_ms: u64) -> bool {
        now_ms < self.cached_at_ms + self.ttl_ms
    }
}

/// Initiates and verifies handshakes, caching results per peer DID.
pub struct TrustHandshake<C: Clock> {
    clock: C,
    cache: RwLock<HashMap<String, CacheEntry>>,
    cache_ttl_seconds: u64,
    negative_cache_ttl_seconds: u64,
    nonce_skew_seconds: i64,
}

impl<C: Clock> TrustHandshake<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            cache: RwLock::new(HashMap::new()),
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
            negative_cache_ttl_seconds: DEFAULT_NEGATIVE_CACHE_TTL_SECONDS,
            nonce_skew_seconds: DEFAULT_NONCE_SKEW_SECONDS,
        }
    }

    pub fn with_ttls(mut self, cache_ttl_seconds: u64, negative_cache_ttl_seconds: u64) -> Self {
        self.cache_ttl_seconds = cache_ttl_seconds;
        self.negative_cache_ttl_seconds = negative_cache_ttl_seconds;
        self
    }

    /// Look up a fresh cached result for `peer_did`, if any.
    pub fn cached_result(&self, peer_did: &str) -> Option<HandshakeResult> {
        let now_ms = self.clock.now_ms();
        self.cache
            .read()
            .get(peer_did)
            .filter(|entry| entry.is_fresh(now_ms))
            .map(|entry| entry.result.clone())
    }

    /// Verify a challenge response against the issued challenge and the
    /// identity store, then cache the outcome (positive or negative).
    #[allow(clippy::too_many_arguments)]
    pub fn verify_response(
        &self,
        identities: &IdentityStore<impl Clock>,
        challenge: &Challenge,
        response: &ChallengeResponse,
        required_trust_score: u32,
        required_capabilities: &[String],
    ) -> HandshakeResult {
        let started_ms = self.clock.now_ms();
        let outcome = self.verify_response_inner(identities, challenge, response, required_trust_score, required_capabilities);
        let completed_at_ms = self.clock.now_ms();
        let latency_ms = completed_at_ms.saturating_sub(started_ms);

        let result = match outcome {
            Ok(()) => HandshakeResult {
                verified: true,
                peer_did: response.agent_did.clone(),
                trust_score: response.trust_score,
                capabilities: response.capabilities.clone(),
                rejection_reason: None,
                latency_ms,
                completed_at_ms,
            },
            Err(error) => HandshakeResult {
                verified: false,
                peer_did: response.agent_did.clone(),
                trust_score: response.trust_score,
                capabilities: response.capabilities.clone(),
                rejection_reason: Some(error.to_string()),
                latency_ms,
                completed_at_ms,
            },
        };

        let ttl_seconds = if result.verified { self.cache_ttl_seconds } else { self.negative_cache_ttl_seconds };
        self.cache.write().insert(
            response.agent_did.clone(),
            CacheEntry {
                result: result.clone(),
                cached_at_ms: completed_at_ms,
                ttl_ms: ttl_seconds * 1000,
            },
        );

        result
    }

    fn verify_response_inner(
        &self,
        identities: &IdentityStore<impl Clock>,
        challenge: &Challenge,
        response: &ChallengeResponse,
        required_trust_score: u32,
        required_capabilities: &[String],
    ) -> Result<(), HandshakeError> {
        if response.agent_did.is_empty() || !crate::identity::is_valid_did(&response.agent_did) {
            return Err(HandshakeError::MalformedDid(response.agent_did.clone()));
        }
        if response.challenge_id != challenge.challenge_id {
            return Err(HandshakeError::UnknownChallenge(response.challenge_id.clone()));
        }

        let now_ms = self.clock.now_ms();
        let skew_seconds = (now_ms as i64 - challenge.timestamp_ms as i64).abs() / 1000;
        if skew_seconds > self.nonce_skew_seconds {
            return Err(HandshakeError::NonceSkew(skew_seconds));
        }
        if challenge.is_expired(now_ms) {
            return Err(HandshakeError::Timeout(challenge.expires_in_seconds * 1000));
        }

        let public_key = crypto::b64url_decode(&response.public_key).map_err(HandshakeError::Identity)?;
        let message = signing_message(&challenge.challenge_id, &response.response_nonce, &challenge.nonce);
        let signature = crypto::b64url_decode(&response.signature).map_err(HandshakeError::Identity)?;
        if !crypto::verify(&public_key, message.as_bytes(), &signature) {
            return Err(HandshakeError::InvalidSignature);
        }

        let identity = identities
            .get(&response.agent_did)
            .ok_or_else(|| HandshakeError::Identity(IdentityError::NotFound(response.agent_did.clone())))?;
        let registered_key = base64_std_decode(&identity.public_key).map_err(HandshakeError::Identity)?;
        if registered_key != public_key {
            return Err(HandshakeError::KeyMismatch(response.agent_did.clone()));
        }

        if identities.is_revoked(&response.agent_did) {
            return Err(HandshakeError::PeerRevoked(response.agent_did.clone()));
        }

        if response.trust_score < required_trust_score {
            return Err(HandshakeError::InsufficientTrust {
                actual: response.trust_score,
                required: required_trust_score,
            });
        }

        for capability in required_capabilities {
            if !response.capabilities.iter().any(|cap| cap == capability) {
                return Err(HandshakeError::MissingCapability(capability.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    #[test]
    fn matching_response_verifies() {
        let clock = FixedClock::new(1_000_000);
        let identities = IdentityStore::new(&clock);
        let (bob, bob_keys) = identities.create("bob", "bob@example.com", vec!["read".into()], None).unwrap();

        let handshake = TrustHandshake::new(&clock);
        let challenge = Challenge::new(&clock, 30);
        let response = ChallengeResponse::build(&challenge, &bob.did, bob.capabilities.clone(), 700, &bob_keys);

        let result = handshake.verify_response(&identities, &challenge, &response, 500, &["read".to_string()]);
        assert!(result.verified, "{:?}", result.rejection_reason);
        assert_eq!(handshake.cached_result(&bob.did).unwrap().verified, true);
    }

    #[test]
    fn revoked_peer_is_rejected() {
        let clock = FixedClock::new(0);
        let identities = IdentityStore::new(&clock);
        let (bob, bob_keys) = identities.create("bob", "bob@example.com", vec![], None).unwrap();
        identities.revoke(&bob.did, "compromised", None).unwrap();

        let handshake = TrustHandshake::new(&clock);
        let challenge = Challenge::new(&clock, 30);
        let response = ChallengeResponse::build(&challenge, &bob.did, vec![], 900, &bob_keys);
        let result = handshake.verify_response(&identities, &challenge, &response, 0, &[]);
        assert!(!result.verified);
        assert!(result.rejection_reason.unwrap().contains("revoked"));
    }

    #[test]
    fn insufficient_trust_and_missing_capability_are_rejected() {
        let clock = FixedClock::new(0);
        let identities = IdentityStore::new(&clock);
        let (bob, bob_keys) = identities.create("bob", "bob@example.com", vec!["read".into()], None).unwrap();

        let handshake = TrustHandshake::new(&clock);
        let challenge = Challenge::new(&clock, 30);
        let response = ChallengeResponse::build(&challenge, &bob.did, bob.capabilities.clone(), 100, &bob_keys);
        let result = handshake.verify_response(&identities, &challenge, &response, 500, &[]);
        assert!(!result.verified);

        let response2 = ChallengeResponse::build(&challenge, &bob.did, bob.capabilities.clone(), 900, &bob_keys);
        let result2 = handshake.verify_response(&identities, &challenge, &response2, 0, &["write".to_string()]);
        assert!(!result2.verified);
    }

    #[test]
    fn unregistered_or_impersonated_key_is_rejected() {
        let clock = FixedClock::new(0);
        let identities = IdentityStore::new(&clock);
        let (bob, _bob_keys) = identities.create("bob", "bob@example.com", vec![], None).unwrap();

        let handshake = TrustHandshake::new(&clock);
        let challenge = Challenge::new(&clock, 30);

        // An impersonator signs with its own freshly generated keypair but
        // claims bob's registered DID.
        let impersonator_keys = KeyPair::generate();
        let response = ChallengeResponse::build(&challenge, &bob.did, vec![], 900, &impersonator_keys);
        let result = handshake.verify_response(&identities, &challenge, &response, 0, &[]);
        assert!(!result.verified);
        assert!(result.rejection_reason.unwrap().contains("does not match"));

        // A DID that was never registered is rejected outright.
        let unknown_keys = KeyPair::generate();
        let unknown_response = ChallengeResponse::build(&challenge, "did:mesh:00000000000000000000000000000000", vec![], 900, &unknown_keys);
        let unknown_result = handshake.verify_response(&identities, &challenge, &unknown_response, 0, &[]);
        assert!(!unknown_result.verified);
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let clock = FixedClock::new(0);
        let identities = IdentityStore::new(&clock);
        let (bob, bob_keys) = identities.create("bob", "bob@example.com", vec![], None).unwrap();

        let handshake = TrustHandshake::new(&clock);
        let challenge = Challenge::new(&clock, 30);
        let mut response = ChallengeResponse::build(&challenge, &bob.did, vec![], 900, &bob_keys);
        // Flip a byte of the signature itself so it no longer matches the message.
        let mut sig_bytes = crypto::b64url_decode(&response.signature).unwrap();
        sig_bytes[0] ^= 0xff;
        response.signature = crypto::b64url_encode(&sig_bytes);

        let result = handshake.verify_response(&identities, &challenge, &response, 0, &[]);
        assert!(!result.verified);
        assert!(result.rejection_reason.unwrap().contains("signature"));
    }
}
