// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Tamper-evident audit log (C8).
//!
//! Every append both extends a SHA-256 hash chain (`previous_hash` links
//! consecutive entries) and a Merkle tree over all entry hashes, so callers
//! can either walk the chain to verify no entry was altered or retrieder a
//! compact inclusion proof for a single entry without shipping the whole
//! log.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::crypto;
use crate::error::AuditError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    IdentityCreated,
    IdentityRevoked,
    CredentialIssued,
    CredentialRevoked,
    DelegationGranted,
    HandshakeCompleted,
    PolicyDecision,
    ScoreUpdated,
    TrustRevoked,
}

/// A single append-only audit entry.
///
/// `entry_hash` is computed over every other field via [`canonicalize`] and
/// is therefore excluded from its own input; `previous_hash` is included, so
/// altering any earlier entry invalidates every hash after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: u64,
    pub timestamp_ms: u64,
    pub actor_did: String,
    pub action: AuditAction,
    pub target: Option<String>,
    pub detail: Json,
    pub previous_hash: String,
    pub entry_hash: String,
}

/// Canonical, deterministic byte serialization of an entry's content
/// (everything but `entry_hash` itself), used both to compute and to verify
/// an entry's hash. Object keys are sorted so any two equivalent entries
/// canonicalize identically regardless of construction order.
fn canonicalize(entry: &AuditEntry) -> Result<Vec<u8>, AuditError> {
    let value = serde_json::json!({
        "sequence": entry.sequence,
        "timestamp_ms": entry.timestamp_ms,
        "actor_did": entry.actor_did,
        "action": entry.action,
        "target": entry.target,
        "detail": entry.detail,
        "previous_hash": entry.previous_hash,
    });
    serde_json::to_vec(&sort_keys(value)).map_err(|error| AuditError::Canonicalization(error.to_string()))
}

/// Recursively sort object keys so serde_json's stable-insertion-order map
/// cannot make two semantically-equal entries hash differently.
fn sort_keys(value: Json) -> Json {
    match value {
        Json::Object(map) => {
            let mut sorted: Vec<(String, Json)> = map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            Json::Object(sorted.into_iter().collect())
        }
        Json::Array(items) => Json::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

fn entry_hash(entry: &AuditEntry) -> Result<String, AuditError> {
    let canonical = canonicalize(entry)?;
    Ok(crypto::sha256_hex(&canonical))
}

fn merkle_parent(left: &str, right: &str) -> String {
    let mut bytes = Vec::with_capacity(left.len() + right.len());
    bytes.extend_from_slice(left.as_bytes());
    bytes.extend_from_slice(right.as_bytes());
    crypto::sha256_hex(&bytes)
}

fn compute_merkle_root(leaves: &[String]) -> String {
    if leaves.is_empty() {
        return String::new();
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|chunk| match chunk {
                [left, right] => merkle_parent(left, right),
                [solo] => merkle_parent(solo, solo),
                _ => unreachable!(),
            })
            .collect();
    }
    level.into_iter().next().unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofPosition {
    Left,
    Right,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofNode {
    pub sibling: String,
    pub position: ProofPosition,
}

/// Proves that a single entry is included in the log at the moment the
/// proof was generated, without shipping every other entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditProof {
    pub index: usize,
    pub leaf_count: usize,
    pub leaf_hash: String,
    pub root: String,
    pub path: Vec<ProofNode>,
}

impl AuditProof {
    fn build(leaves: &[String], index: usize) -> Option<Self> {
        if leaves.is_empty() || index >= leaves.len() {
            return None;
        }
        let mut path = Vec::new();
        let mut current = index;
        let mut level = leaves.to_vec();

        while level.len() > 1 {
            let sibling_index = if current % 2 == 0 { current + 1 } else { current - 1 };
            let sibling = if sibling_index < level.len() { level[sibling_index].clone() } else { level[current].clone() };
            let position = if current % 2 == 0 { ProofPosition::Right } else { ProofPosition::Left };
            path.push(ProofNode { sibling, position });

            let mut next_level = Vec::with_capacity(level.len().div_ceil(2));
            for chunk in level.chunks(2) {
                next_level.push(match chunk {
                    [left, right] => merkle_parent(left, right),
                    [solo] => merkle_parent(solo, solo),
                    _ => unreachable!(),
                });
            }
            current /= 2;
            level = next_level;
        }

        Some(AuditProof { index, leaf_count: leaves.len(), leaf_hash: leaves[index].clone(), root: level[0].clone(), path })
    }

    pub fn verify(&self) -> bool {
        if self.path.is_empty() && self.leaf_count != 1 {
            return false;
        }
        let mut hash = self.leaf_hash.clone();
        for node in &self.path {
            hash = match node.position {
                ProofPosition::Left => merkle_parent(&node.sibling, &hash),
                ProofPosition::Right => merkle_parent(&hash, &node.sibling),
            };
        }
        hash == self.root
    }
}

/// Pluggable persistence hook invoked after every successful append. The
/// in-memory chain is always authoritative for verification; a sink is free
/// to fail independently (e.g. a slow downstream SIEM export) without
/// corrupting the chain.
pub trait AuditSink: Send + Sync {
    fn write(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// A sink that drops every entry; useful as a default when no external
/// export is configured.
#[derive(Debug, Default)]
pub struct NullSink;

impl AuditSink for NullSink {
    fn write(&self, _entry: &AuditEntry) -> Result<(), AuditError> {
        Ok(())
    }
}

struct Inner {
    entries: Vec<AuditEntry>,
    leaves: Vec<String>,
}

/// The Merkle-chained audit log. Cheap to clone (shares the underlying
/// lock); safe to hand to multiple services.
#[derive(Clone)]
pub struct AuditLog {
    inner: Arc<RwLock<Inner>>,
    sink: Arc<dyn AuditSink>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(Arc::new(NullSink))
    }
}

impl AuditLog {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { inner: Arc::new(RwLock::new(Inner { entries: Vec::new(), leaves: Vec::new() })), sink }
    }

    pub fn append(
        &self,
        timestamp_ms: u64,
        actor_did: impl Into<String>,
        action: AuditAction,
        target: Option<String>,
        detail: Json,
    ) -> Result<AuditEntry, AuditError> {
        let mut inner = self.inner.write();
        let sequence = inner.entries.len() as u64;
        let previous_hash = inner.entries.last().map(|entry| entry.entry_hash.clone()).unwrap_or_default();

        let mut entry = AuditEntry {
            sequence,
            timestamp_ms,
            actor_did: actor_did.into(),
            action,
            target,
            detail,
            previous_hash,
            entry_hash: String::new(),
        };
        entry.entry_hash = entry_hash(&entry)?;

        inner.leaves.push(entry.entry_hash.clone());
        inner.entries.push(entry.clone());
        drop(inner);

        self.sink.write(&entry)?;
        Ok(entry)
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries for `actor_did`, oldest first.
    pub fn by_actor(&self, actor_did: &str) -> Vec<AuditEntry> {
        self.inner.read().entries.iter().filter(|entry| entry.actor_did == actor_did).cloned().collect()
    }

    pub fn tail(&self, limit: usize) -> Vec<AuditEntry> {
        let inner = self.inner.read();
        let start = inner.entries.len().saturating_sub(limit);
        inner.entries[start..].to_vec()
    }

    pub fn chain_tip(&self) -> String {
        self.inner.read().entries.last().map(|entry| entry.entry_hash.clone()).unwrap_or_default()
    }

    /// Root of the Merkle tree over every entry's hash, or the empty string
    /// when the log has no entries.
    pub fn merkle_root(&self) -> String {
        compute_merkle_root(&self.inner.read().leaves)
    }

    pub fn proof_for(&self, sequence: u64) -> Option<AuditProof> {
        let inner = self.inner.read();
        AuditProof::build(&inner.leaves, sequence as usize)
    }

    /// Recomputes every entry's hash and chain link; returns an error at the
    /// first break found.
    pub fn verify_chain(&self) -> Result<(), AuditError> {
        let inner = self.inner.read();
        let mut expected_previous = String::new();
        for entry in &inner.entries {
            if entry.previous_hash != expected_previous {
                return Err(AuditError::ChainBroken(entry.sequence as usize, "previous_hash does not match predecessor".to_string()));
            }
            let recomputed = entry_hash(entry)?;
            if recomputed != entry.entry_hash {
                return Err(AuditError::ChainBroken(entry.sequence as usize, "entry_hash does not match recomputed hash".to_string()));
            }
            expected_previous = entry.entry_hash.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> AuditLog {
        AuditLog::default()
    }

    #[test]
    fn append_and_chain_verifies() {
        let log = log();
        log.append(1, "did:mesh:a", AuditAction::IdentityCreated, None, serde_json::json!({})).unwrap();
        log.append(2, "did:mesh:a", AuditAction::CredentialIssued, Some("cred-1".to_string()), serde_json::json!({"ttl": 900})).unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.verify_chain().is_ok());
    }

    #[test]
    fn tampering_breaks_verification() {
        let log = log();
        log.append(1, "did:mesh:a", AuditAction::IdentityCreated, None, serde_json::json!({})).unwrap();
        log.append(2, "did:mesh:a", AuditAction::CredentialIssued, None, serde_json::json!({})).unwrap();

        {
            let mut inner = log.inner.write();
            inner.entries[0].actor_did = "did:mesh:tampered".to_string();
        }

        assert!(log.verify_chain().is_err());
    }

    #[test]
    fn merkle_proof_verifies_inclusion() {
        let log = log();
        for index in 0..5u64 {
            log.append(index, "did:mesh:a", AuditAction::ScoreUpdated, None, serde_json::json!({"n": index})).unwrap();
        }
        for sequence in 0..5u64 {
            let proof = log.proof_for(sequence).unwrap();
            assert_eq!(proof.root, log.merkle_root());
            assert!(proof.verify());
        }
    }

    #[test]
    fn tampered_proof_fails_verification() {
        let log = log();
        for index in 0..3u64 {
            log.append(index, "did:mesh:a", AuditAction::ScoreUpdated, None, serde_json::json!({})).unwrap();
        }
        let mut proof = log.proof_for(1).unwrap();
        proof.leaf_hash = "0".repeat(64);
        assert!(!proof.verify());
    }

    #[test]
    fn by_actor_filters_correctly() {
        let log = log();
        log.append(1, "did:mesh:a", AuditAction::IdentityCreated, None, serde_json::json!({})).unwrap();
        log.append(2, "did:mesh:b", AuditAction::IdentityCreated, None, serde_json::json!({})).unwrap();
        assert_eq!(log.by_actor("did:mesh:a").len(), 1);
        assert_eq!(log.by_actor("did:mesh:b").len(), 1);
    }
}
