// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Identity store and revocation list (C2).
//!
//! An [`AgentIdentity`] is created once by a sponsor-backed registration and
//! mutated only through explicit status transitions — it is never deleted;
//! revocation is the terminal state.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::crypto::{self, KeyPair};
use crate::error::IdentityError;

pub const DID_PREFIX: &str = "did:mesh:";

/// Derive a `did:mesh:<32-hex>` identifier from `(name, org, salt, timestamp)`.
///
/// Uniqueness is statistical: with a cryptographically random `salt` the
/// effective collision resistance of the 128-bit (32 hex char) prefix is the
/// same as the full digest's.
pub fn derive_did(name: &str, org: Option<&str>, salt: &[u8], timestamp_ms: u64) -> String {
    let mut buf = Vec::with_capacity(name.len() + org.map_or(0, str::len) + salt.len() + 20);
    buf.extend_from_slice(name.as_bytes());
    buf.push(0);
    buf.extend_from_slice(org.unwrap_or("").as_bytes());
    buf.push(0);
    buf.extend_from_slice(salt);
    buf.push(0);
    buf.extend_from_slice(timestamp_ms.to_string().as_bytes());

    let digest_hex = crypto::sha256_hex(&buf);
    format!("{DID_PREFIX}{}", &digest_hex[..32])
}

/// Validate the `did:mesh:[0-9a-f]{32}` shape.
pub fn is_valid_did(did: &str) -> bool {
    match did.strip_prefix(DID_PREFIX) {
        Some(rest) => rest.len() == 32 && rest.bytes().all(|b| b.is_ascii_hexdigit()),
        None => false,
    }
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// Lifecycle status of an [`AgentIdentity`]. Revocation is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStatus {
    Active,
    Suspended,
    Revoked,
}

/// A registered agent identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub did: String,
    pub name: String,
    /// Raw Ed25519 public key, base64-encoded (standard, not base64url —
    /// this is the storage representation; JWK export uses base64url).
    pub public_key: String,
    /// Held only by the owning process. Never serialized by [`AgentIdentity::public_view`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    pub sponsor_email: String,
    pub capabilities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_did: Option<String>,
    pub delegation_depth: u32,
    pub status: IdentityStatus,
    pub created_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
}

impl AgentIdentity {
    /// `true` iff `status == Active` and (no expiry, or expiry is in the future).
    pub fn is_active(&self, now_ms: u64) -> bool {
        self.status == IdentityStatus::Active
            && self.expires_at_ms.map_or(true, |expiry| expiry > now_ms)
    }

    /// A copy with `private_key` cleared, safe to hand to untrusted callers.
    pub fn public_view(&self) -> Self {
        let mut view = self.clone();
        view.private_key = None;
        view
    }
}

/// A single revocation record, keyed by DID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationEntry {
    pub did: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_by: Option<String>,
    pub revoked_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
}

impl RevocationEntry {
    /// A revocation is active unless it carries an expiry that has passed.
    pub fn is_active(&self, now_ms: u64) -> bool {
        self.expires_at_ms.map_or(true, |expiry| expiry > now_ms)
    }
}

/// Owns both the identity map and the revocation list. Both are guarded by
/// a single reader-writer lock — contention is expected to be low relative
/// to the crypto and policy work gating each request.
pub struct IdentityStore<C: Clock> {
    clock: C,
    identities: RwLock<HashMap<String, AgentIdentity>>,
    revocations: RwLock<HashMap<String, RevocationEntry>>,
}

impl<C: Clock> IdentityStore<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            identities: RwLock::new(HashMap::new()),
            revocations: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new identity with a freshly generated keypair.
    ///
    /// Returns the identity (including the private key — the caller is the
    /// owning process) alongside the [`KeyPair`] for immediate use.
    pub fn create(
        &self,
        name: &str,
        sponsor_email: &str,
        capabilities: Vec<String>,
        org: Option<&str>,
    ) -> Result<(AgentIdentity, KeyPair), IdentityError> {
        if name.is_empty() {
            return Err(IdentityError::EmptyName);
        }
        if !is_valid_email(sponsor_email) {
            return Err(IdentityError::InvalidSponsorEmail(sponsor_email.to_string()));
        }

        let keypair = KeyPair::generate();
        let now_ms = self.clock.now_ms();
        let mut salt = keypair.public_key_bytes().to_vec();
        salt.extend_from_slice(name.as_bytes());
        let did = derive_did(name, org, &salt, now_ms);

        let identity = AgentIdentity {
            did: did.clone(),
            name: name.to_string(),
            public_key: base64_std(&keypair.public_key_bytes()),
            private_key: Some(base64_std(&keypair.secret_key_bytes())),
            sponsor_email: sponsor_email.to_string(),
            capabilities,
            parent_did: None,
            delegation_depth: 0,
            status: IdentityStatus::Active,
            created_at_ms: now_ms,
            expires_at_ms: None,
        };

        self.identities.write().insert(did, identity.clone());
        Ok((identity, keypair))
    }

    /// Register an identity delegated from a parent, carrying a precomputed
    /// public key (used by the scope chain when materializing a child agent
    /// identity from a handshake or out-of-band key exchange).
    pub fn create_delegated(
        &self,
        name: &str,
        sponsor_email: &str,
        capabilities: Vec<String>,
        parent_did: &str,
        delegation_depth: u32,
        public_key: &[u8],
    ) -> Result<AgentIdentity, IdentityError> {
        if name.is_empty() {
            return Err(IdentityError::EmptyName);
        }
        if !is_valid_email(sponsor_email) {
            return Err(IdentityError::InvalidSponsorEmail(sponsor_email.to_string()));
        }
        if public_key.is_empty() {
            return Err(IdentityError::EmptyPublicKey);
        }
        if !is_valid_did(parent_did) {
            return Err(IdentityError::InvalidParentDid(parent_did.to_string()));
        }

        let now_ms = self.clock.now_ms();
        let did = derive_did(name, None, public_key, now_ms);

        let identity = AgentIdentity {
            did: did.clone(),
            name: name.to_string(),
            public_key: base64_std(public_key),
            private_key: None,
            sponsor_email: sponsor_email.to_string(),
            capabilities,
            parent_did: Some(parent_did.to_string()),
            delegation_depth,
            status: IdentityStatus::Active,
            created_at_ms: now_ms,
            expires_at_ms: None,
        };

        self.identities.write().insert(did, identity.clone());
        Ok(identity)
    }

    pub fn get(&self, did: &str) -> Option<AgentIdentity> {
        self.identities.read().get(did).cloned()
    }

    /// Mark an identity's status as `Suspended`.
    pub fn suspend(&self, did: &str) -> Result<(), IdentityError> {
        let mut identities = self.identities.write();
        let identity = identities.get_mut(did).ok_or_else(|| IdentityError::NotFound(did.to_string()))?;
        identity.status = IdentityStatus::Suspended;
        Ok(())
    }

    /// Revoke an identity. Idempotent: revoking an already-revoked DID
    /// refreshes the reason but does not error.
    pub fn revoke(&self, did: &str, reason: &str, revoked_by: Option<&str>) -> Result<(), IdentityError> {
        self.revoke_with_expiry(did, reason, revoked_by, None)
    }

    /// Revoke an identity for a bounded time window. A temporary revocation
    /// becomes inactive once `expires_at_ms` passes; `is_revoked` re-checks
    /// this at query time rather than relying on a background sweep.
    pub fn revoke_with_expiry(
        &self,
        did: &str,
        reason: &str,
        revoked_by: Option<&str>,
        expires_at_ms: Option<u64>,
    ) -> Result<(), IdentityError> {
        let now_ms = self.clock.now_ms();
        {
            let mut identities = self.identities.write();
            if let Some(identity) = identities.get_mut(did) {
                identity.status = IdentityStatus::Revoked;
            }
        }
        self.revocations.write().insert(
            did.to_string(),
            RevocationEntry {
                did: did.to_string(),
                reason: reason.to_string(),
                revoked_by: revoked_by.map(str::to_string),
                revoked_at_ms: now_ms,
                expires_at_ms,
            },
        );
        Ok(())
    }

    /// `true` iff `did` has an active revocation entry right now.
    pub fn is_revoked(&self, did: &str) -> bool {
        let now_ms = self.clock.now_ms();
        self.revocations
            .read()
            .get(did)
            .is_some_and(|entry| entry.is_active(now_ms))
    }

    /// List identities, optionally filtered by status and/or a minimum trust
    /// score. Scoring lives in the reward engine, not here, so `min_score`
    /// is paired with a `score_of` lookup the caller supplies (typically
    /// backed by [`crate::reward::RewardEngine::recalculate_score`]).
    pub fn list(
        &self,
        status: Option<IdentityStatus>,
        min_score: Option<(f64, &dyn Fn(&str) -> f64)>,
    ) -> Vec<AgentIdentity> {
        self.identities
            .read()
            .values()
            .filter(|identity| status.map_or(true, |s| identity.status == s))
            .filter(|identity| match min_score {
                Some((threshold, score_of)) => score_of(&identity.did) >= threshold,
                None => true,
            })
            .cloned()
            .collect()
    }
}

fn base64_std(bytes: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    STANDARD.encode(bytes)
}

/// Decode an [`AgentIdentity::public_key`]-shaped field (base64 standard,
/// not base64url).
pub(crate) fn base64_std_decode(value: &str) -> Result<Vec<u8>, IdentityError> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    STANDARD.decode(value).map_err(|_| IdentityError::InvalidBase64(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    fn store() -> IdentityStore<FixedClock> {
        IdentityStore::new(FixedClock::new(1_700_000_000_000))
    }

    #[test]
    fn did_shape_is_valid() {
        let did = derive_did("alice", None, b"salt", 123);
        assert!(is_valid_did(&did));
        assert_eq!(did.len(), DID_PREFIX.len() + 32);
        assert!(!is_valid_did("did:mesh:too-short"));
        assert!(!is_valid_did("did:other:0123456789abcdef0123456789abcdef"));
    }

    #[test]
    fn create_rejects_empty_name_and_bad_email() {
        let store = store();
        assert!(matches!(
            store.create("", "a@b.com", vec![], None),
            Err(IdentityError::EmptyName)
        ));
        assert!(matches!(
            store.create("alice", "not-an-email", vec![], None),
            Err(IdentityError::InvalidSponsorEmail(_))
        ));
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = store();
        let (identity, _keys) = store
            .create("alice", "sponsor@example.com", vec!["read".into()], None)
            .unwrap();
        let fetched = store.get(&identity.did).unwrap();
        assert_eq!(fetched.did, identity.did);
        assert!(fetched.is_active(1_700_000_000_000));
    }

    #[test]
    fn revocation_is_idempotent_and_queryable() {
        let store = store();
        let (identity, _) = store.create("bob", "sponsor@example.com", vec![], None).unwrap();
        assert!(!store.is_revoked(&identity.did));
        store.revoke(&identity.did, "compromised key", Some("admin")).unwrap();
        assert!(store.is_revoked(&identity.did));
        store.revoke(&identity.did, "compromised key (again)", Some("admin")).unwrap();
        assert!(store.is_revoked(&identity.did));
        assert_eq!(store.get(&identity.did).unwrap().status, IdentityStatus::Revoked);
    }

    #[test]
    fn temporary_revocation_expires() {
        let clock = FixedClock::new(1_000);
        let store = IdentityStore::new(clock);
        let (identity, _) = store.create("carol", "sponsor@example.com", vec![], None).unwrap();
        store
            .revoke_with_expiry(&identity.did, "cooldown", None, Some(2_000))
            .unwrap();
        assert!(store.is_revoked(&identity.did));
    }

    #[test]
    fn list_filters_by_min_score() {
        let store = store();
        let (high, _) = store.create("high-scorer", "a@example.com", vec![], None).unwrap();
        let (low, _) = store.create("low-scorer", "b@example.com", vec![], None).unwrap();
        let scores: HashMap<String, f64> = HashMap::from([(high.did.clone(), 800.0), (low.did.clone(), 200.0)]);
        let score_of = |did: &str| scores.get(did).copied().unwrap_or(0.0);

        let qualifying = store.list(None, Some((500.0, &score_of)));
        assert_eq!(qualifying.len(), 1);
        assert_eq!(qualifying[0].did, high.did);
    }

    #[test]
    fn public_view_strips_private_key() {
        let store = store();
        let (identity, _) = store.create("dana", "sponsor@example.com", vec![], None).unwrap();
        assert!(identity.private_key.is_some());
        assert!(identity.public_view().private_key.is_none());
    }
}
