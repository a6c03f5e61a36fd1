// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Short-lived bearer credential issuance (C3).
//!
//! Tokens are opaque, ≥128-bit-entropy random strings. The manager indexes
//! by both the token and the credential id so `validate` (hot path, keyed
//! by token) and `revoke`/`rotate` (keyed by id) are both O(1). `issue`
//! enforces scopes ⊆ owner capabilities at the boundary; this manager holds
//! no reference to the identity store, so the caller supplies the owning
//! identity's current capabilities at issue time.

use std::collections::HashMap;

use parking_lot::RwLock;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::crypto;
use crate::error::CredentialError;

pub const DEFAULT_TTL_SECONDS: u64 = 900;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    Expired,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub credential_id: String,
    pub agent_did: String,
    pub token: String,
    pub issued_at_ms: u64,
    pub expires_at_ms: u64,
    pub status: CredentialStatus,
    pub scopes: Vec<String>,
}

impl Credential {
    /// Status=Active AND not yet past `expires_at_ms`. This is re-derived at
    /// query time rather than trusted from the stored `status` field, so a
    /// credential whose TTL has simply elapsed is treated as invalid even
    /// before any background sweep marks it `Expired`.
    pub fn is_valid(&self, now_ms: u64) -> bool {
        self.status == CredentialStatus::Active && now_ms < self.expires_at_ms
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 32]; // 256 bits, comfortably over the 128-bit floor
    OsRng.fill_bytes(&mut bytes);
    crypto::b64url_encode(&bytes)
}

struct Inner {
    by_token: HashMap<String, String>, // token -> credential_id
    by_id: HashMap<String, Credential>,
}

/// Issues, validates, rotates, and revokes bearer credentials for agent
/// identities. Holds no reference to the identity store — scope
/// containment against owner capabilities is the caller's responsibility
/// at issue time.
pub struct CredentialManager<C: Clock> {
    clock: C,
    inner: RwLock<Inner>,
}

impl<C: Clock> CredentialManager<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            inner: RwLock::new(Inner {
                by_token: HashMap::new(),
                by_id: HashMap::new(),
            }),
        }
    }

    pub fn issue(
        &self,
        agent_did: &str,
        ttl_seconds: u64,
        scopes: Vec<String>,
        owner_capabilities: &[String],
    ) -> Result<Credential, CredentialError> {
        if ttl_seconds == 0 {
            return Err(CredentialError::InvalidTtl);
        }
        if !scopes.iter().all(|scope| owner_capabilities.iter().any(|cap| cap == scope)) {
            return Err(CredentialError::ScopesExceedCapabilities(scopes, owner_capabilities.to_vec()));
        }
        let now_ms = self.clock.now_ms();
        let credential = Credential {
            credential_id: format!("cred-{}", crypto::hex_encode(&crypto::sha256(random_token().as_bytes()))[..16].to_string()),
            agent_did: agent_did.to_string(),
            token: random_token(),
            issued_at_ms: now_ms,
            expires_at_ms: now_ms + ttl_seconds * 1000,
            status: CredentialStatus::Active,
            scopes,
        };

        let mut inner = self.inner.write();
        inner.by_token.insert(credential.token.clone(), credential.credential_id.clone());
        inner.by_id.insert(credential.credential_id.clone(), credential.clone());
        Ok(credential)
    }

    /// Returns `None` for unknown, expired, or revoked tokens — the caller
    /// cannot distinguish these cases, by design (spec §4.3).
    pub fn validate(&self, token: &str) -> Option<Credential> {
        let now_ms = self.clock.now_ms();
        let inner = self.inner.read();
        let credential_id = inner.by_token.get(token)?;
        let credential = inner.by_id.get(credential_id)?;
        credential.is_valid(now_ms).then(|| credential.clone())
    }

    pub fn revoke(&self, credential_id: &str) -> Result<(), CredentialError> {
        let mut inner = self.inner.write();
        let credential = inner
            .by_id
            .get_mut(credential_id)
            .ok_or(CredentialError::UnknownToken)?;
        credential.status = CredentialStatus::Revoked;
        Ok(())
    }

    /// Issue a new credential first, then revoke the old one — in that
    /// order — so a concurrent reader never observes a window with zero
    /// live credentials for the agent. Re-issues the same scope set the old
    /// credential already carried, so the subset check against it is
    /// trivially satisfied without re-consulting the identity store.
    pub fn rotate(&self, credential_id: &str) -> Result<Credential, CredentialError> {
        let (agent_did, ttl_ms, scopes) = {
            let inner = self.inner.read();
            let old = inner.by_id.get(credential_id).ok_or(CredentialError::UnknownToken)?;
            let ttl_ms = old.expires_at_ms.saturating_sub(old.issued_at_ms).max(1000);
            (old.agent_did.clone(), ttl_ms, old.scopes.clone())
        };
        let owner_capabilities = scopes.clone();
        let fresh = self.issue(&agent_did, ttl_ms / 1000, scopes, &owner_capabilities)?;
        self.revoke(credential_id)?;
        Ok(fresh)
    }

    /// Revoke every currently active credential issued to `agent_did`.
    /// Returns the number of credentials revoked.
    pub fn revoke_all_for_agent(&self, agent_did: &str) -> usize {
        let mut inner = self.inner.write();
        let ids: Vec<String> = inner
            .by_id
            .values()
            .filter(|credential| credential.agent_did == agent_did && credential.status == CredentialStatus::Active)
            .map(|credential| credential.credential_id.clone())
            .collect();
        for id in &ids {
            if let Some(credential) = inner.by_id.get_mut(id) {
                credential.status = CredentialStatus::Revoked;
            }
        }
        ids.len()
    }

    /// `true` if the credential expires within `threshold_seconds`, enabling
    /// proactive rotation before a hard cutover.
    pub fn is_expiring_soon(&self, credential_id: &str, threshold_seconds: u64) -> bool {
        let now_ms = self.clock.now_ms();
        let inner = self.inner.read();
        inner
            .by_id
            .get(credential_id)
            .is_some_and(|credential| {
                credential.status == CredentialStatus::Active
                    && credential.expires_at_ms <= now_ms + threshold_seconds * 1000
            })
    }
}
