// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Multi-hop capability-narrowing delegation chains (C4).
//!
//! Each [`DelegationLink`] hash-chains to its predecessor and is signed by
//! the parent over its canonical bytes. [`ScopeChain::verify`] walks the
//! whole chain recomputing hashes, checking narrowing, and verifying
//! signatures against the identity store's public keys.

use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::error::{DelegationDepthError, DelegationError, IdentityError};
use crate::identity::AgentIdentity;

pub const DEFAULT_MAX_DEPTH: u32 = 5;

/// A single capability-narrowing hop from `parent_did` to `child_did`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationLink {
    pub link_id: String,
    pub depth: u32,
    pub parent_did: String,
    pub child_did: String,
    pub parent_capabilities: Vec<String>,
    pub delegated_capabilities: Vec<String>,
    /// Ed25519 signature (base64url) by the parent over the canonical bytes.
    pub parent_signature: String,
    pub link_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_link_hash: Option<String>,
    pub created_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
}

impl DelegationLink {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|expiry| expiry <= now_ms)
    }
}

/// Canonicalize the fields that feed `link_hash`:
/// `"{depth}|{parent_did}|{child_did}|{sorted,comma-joined delegated_capabilities}|{previous_link_hash or \"\"}"`.
pub fn canonical_link_bytes(
    depth: u32,
    parent_did: &str,
    child_did: &str,
    delegated_capabilities: &[String],
    previous_link_hash: Option<&str>,
) -> Vec<u8> {
    let mut sorted_caps = delegated_capabilities.to_vec();
    sorted_caps.sort();
    let caps_joined = sorted_caps.join(",");
    format!(
        "{depth}|{parent_did}|{child_did}|{caps_joined}|{}",
        previous_link_hash.unwrap_or("")
    )
    .into_bytes()
}

fn compute_link_hash(
    depth: u32,
    parent_did: &str,
    child_did: &str,
    delegated_capabilities: &[String],
    previous_link_hash: Option<&str>,
) -> String {
    crypto::sha256_hex(&canonical_link_bytes(
        depth,
        parent_did,
        child_did,
        delegated_capabilities,
        previous_link_hash,
    ))
}

/// Build a signed link. Caller supplies the parent's [`crate::crypto::KeyPair`]
/// to produce `parent_signature` over the canonical bytes.
pub fn build_link(
    link_id: String,
    depth: u32,
    parent_did: &str,
    child_did: &str,
    parent_capabilities: Vec<String>,
    delegated_capabilities: Vec<String>,
    previous_link_hash: Option<String>,
    signer: &crypto::KeyPair,
    created_at_ms: u64,
    expires_at_ms: Option<u64>,
) -> Result<DelegationLink, DelegationError> {
    if !is_subset(&delegated_capabilities, &parent_capabilities) {
        return Err(DelegationError::CapabilityWidening(
            delegated_capabilities,
            parent_capabilities,
        ));
    }

    let canonical_bytes = canonical_link_bytes(
        depth,
        parent_did,
        child_did,
        &delegated_capabilities,
        previous_link_hash.as_deref(),
    );
    let link_hash = crypto::sha256_hex(&canonical_bytes);
    let signature = signer.sign(&canonical_bytes);

    Ok(DelegationLink {
        link_id,
        depth,
        parent_did: parent_did.to_string(),
        child_did: child_did.to_string(),
        parent_capabilities,
        delegated_capabilities,
        parent_signature: crypto::b64url_encode(&signature),
        link_hash,
        previous_link_hash,
        created_at_ms,
        expires_at_ms,
    })
}

fn is_subset(smaller: &[String], larger: &[String]) -> bool {
    smaller.iter().all(|cap| larger.contains(cap))
}

/// Ordered chain of links plus the root metadata it narrows from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeChain {
    pub chain_id: String,
    pub root_sponsor_email: String,
    pub root_capabilities: Vec<String>,
    pub leaf_did: String,
    pub leaf_capabilities: Vec<String>,
    pub max_depth: u32,
    pub links: Vec<DelegationLink>,
}

impl ScopeChain {
    pub fn new_root(
        chain_id: String,
        root_sponsor_email: String,
        root_did: &str,
        root_capabilities: Vec<String>,
        max_depth: u32,
    ) -> Self {
        Self {
            chain_id,
            root_sponsor_email,
            root_capabilities: root_capabilities.clone(),
            leaf_did: root_did.to_string(),
            leaf_capabilities: root_capabilities,
            max_depth,
            links: Vec::new(),
        }
    }

    /// Append a link, enforcing depth, narrowing, and previous-hash linkage.
    /// Does not verify the signature — that happens during [`Self::verify`]
    /// once the identity store is available to resolve the parent's key.
    pub fn add_link(&mut self, link: DelegationLink) -> Result<(), DelegationError> {
        let expected_depth = self.links.len() as u32;
        if self.links.len() as u32 == self.max_depth {
            return Err(DelegationDepthError {
                depth: expected_depth,
                max_depth: self.max_depth,
            }
            .into());
        }
        if link.depth != expected_depth {
            return Err(DelegationError::DepthMismatch {
                expected: expected_depth,
                found: link.depth,
            });
        }

        let expected_parent = self.links.last().map_or(self.leaf_did.as_str(), |prev| prev.child_did.as_str());
        if link.parent_did != expected_parent {
            return Err(DelegationError::ParentMismatch {
                expected: expected_parent.to_string(),
                found: link.parent_did.clone(),
            });
        }

        let expected_previous_hash = self.links.last().map(|prev| prev.link_hash.as_str());
        if link.previous_link_hash.as_deref() != expected_previous_hash {
            return Err(DelegationError::PreviousHashMismatch);
        }

        let parent_capabilities = self
            .links
            .last()
            .map_or(self.root_capabilities.as_slice(), |prev| prev.delegated_capabilities.as_slice());
        if !is_subset(&link.delegated_capabilities, parent_capabilities) {
            return Err(DelegationError::CapabilityWidening(
                link.delegated_capabilities.clone(),
                parent_capabilities.to_vec(),
            ));
        }

        self.leaf_did = link.child_did.clone();
        self.leaf_capabilities = link.delegated_capabilities.clone();
        self.links.push(link);
        Ok(())
    }

    /// Walk the chain recomputing every `link_hash`, checking narrowing,
    /// previous-hash linkage, and the parent's signature. Does not mutate
    /// any stored state even if links are found to be expired.
    pub fn verify<F>(&self, now_ms: u64, lookup_identity: F) -> (bool, Option<String>)
    where
        F: Fn(&str) -> Option<AgentIdentity>,
    {
        if self.links.len() as u32 > self.max_depth {
            return (false, Some("chain exceeds max_depth".to_string()));
        }

        let mut expected_parent = None::<String>;
        let mut previous_hash = None::<String>;
        let mut narrowing_bound = self.root_capabilities.clone();

        for (index, link) in self.links.iter().enumerate() {
            if link.depth != index as u32 {
                return (false, Some(format!("link {index} has wrong depth {}", link.depth)));
            }
            if let Some(expected) = &expected_parent {
                if &link.parent_did != expected {
                    return (false, Some(format!("link {index} parent_did does not chain from link {}", index - 1)));
                }
            }
            if link.previous_link_hash != previous_hash {
                return (false, Some(format!("link {index} previous_link_hash mismatch")));
            }
            if !is_subset(&link.delegated_capabilities, &narrowing_bound) {
                return (false, Some(format!("link {index} widens capabilities beyond its parent")));
            }

            let recomputed = compute_link_hash(
                link.depth,
                &link.parent_did,
                &link.child_did,
                &link.delegated_capabilities,
                link.previous_link_hash.as_deref(),
            );
            if recomputed != link.link_hash {
                return (false, Some(format!("link {index} hash does not match its contents")));
            }

            let Some(parent_identity) = lookup_identity(&link.parent_did) else {
                return (false, Some(format!("link {index} parent identity \"{}\" not found", link.parent_did)));
            };
            let public_key = match crate::crypto::b64url_decode(&parent_identity.public_key)
                .or_else(|_: IdentityError| base64_std_decode(&parent_identity.public_key))
            {
                Ok(key) => key,
                Err(_) => return (false, Some(format!("link {index} parent public key is malformed"))),
            };
            let Ok(signature) = crypto::b64url_decode(&link.parent_signature) else {
                return (false, Some(format!("link {index} signature is malformed")));
            };
            let signed_bytes = canonical_link_bytes(
                link.depth,
                &link.parent_did,
                &link.child_did,
                &link.delegated_capabilities,
                link.previous_link_hash.as_deref(),
            );
            if !crypto::verify(&public_key, &signed_bytes, &signature) {
                return (false, Some(format!("link {index} signature verification failed")));
            }
            if link.is_expired(now_ms) {
                return (false, Some(format!("link {index} has expired")));
            }

            expected_parent = Some(link.child_did.clone());
            previous_hash = Some(link.link_hash.clone());
            narrowing_bound = link.delegated_capabilities.clone();
        }

        (true, None)
    }

    pub fn get_effective_capabilities(&self) -> &[String] {
        &self.leaf_capabilities
    }

    /// The sequence of links through which `capability` survived to the
    /// leaf, starting from the root. Empty if the root never had it, or if
    /// some hop dropped it.
    pub fn trace_capability(&self, capability: &str) -> Vec<&DelegationLink> {
        if !self.root_capabilities.iter().any(|cap| cap == capability) {
            return Vec::new();
        }
        let mut trace = Vec::new();
        for link in &self.links {
            if link.delegated_capabilities.iter().any(|cap| cap == capability) {
                trace.push(link);
            } else {
                return Vec::new();
            }
        }
        trace
    }
}

fn base64_std_decode(value: &str) -> Result<Vec<u8>, IdentityError> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    STANDARD.decode(value).map_err(|_| IdentityError::InvalidBase64(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FixedClock};
    use crate::identity::IdentityStore;

    #[test]
    fn handshake_then_delegation_scenario() {
        let clock = FixedClock::new(1_700_000_000_000);
        let identities = IdentityStore::new(&clock);
        let (alice, alice_keys) = identities
            .create("alice", "alice@example.com", vec!["read".into(), "write".into(), "execute".into()], None)
            .unwrap();
        let (bob, _bob_keys) = identities
            .create("bob", "bob@example.com", vec!["read".into(), "write".into(), "execute".into()], None)
            .unwrap();
        let (carol, _carol_keys) = identities
            .create("carol", "carol@example.com", vec![], None)
            .unwrap();

        let mut chain = ScopeChain::new_root(
            "chain-1".to_string(),
            "alice@example.com".to_string(),
            &alice.did,
            alice.capabilities.clone(),
            DEFAULT_MAX_DEPTH,
        );

        let link = build_link(
            "link-0".to_string(),
            0,
            &alice.did,
            &bob.did,
            alice.capabilities.clone(),
            vec!["read".to_string()],
            None,
            &alice_keys,
            clock.now_ms(),
            None,
        )
        .unwrap();
        chain.add_link(link).unwrap();

        let link2 = build_link(
            "link-1".to_string(),
            1,
            &bob.did,
            &carol.did,
            vec!["read".to_string()],
            vec!["read".to_string()],
            Some(chain.links[0].link_hash.clone()),
            &_bob_keys,
            clock.now_ms(),
            None,
        )
        .unwrap();
        chain.add_link(link2).unwrap();

        let (ok, reason) = chain.verify(clock.now_ms(), |did| identities.get(did));
        assert!(ok, "verification failed: {reason:?}");
        assert_eq!(chain.get_effective_capabilities(), &["read".to_string()]);
        assert_eq!(chain.trace_capability("read").len(), 2);
    }

    #[test]
    fn narrowing_violation_is_rejected() {
        let clock = FixedClock::new(0);
        let identities = IdentityStore::new(&clock);
        let (alice, alice_keys) = identities.create("alice", "a@example.com", vec!["read".into()], None).unwrap();
        let (bob, _) = identities.create("bob", "b@example.com", vec![], None).unwrap();

        let mut chain = ScopeChain::new_root("chain".into(), "a@example.com".into(), &alice.did, vec!["read".into()], DEFAULT_MAX_DEPTH);
        let link = build_link(
            "link-0".into(),
            0,
            &alice.did,
            &bob.did,
            alice.capabilities.clone(),
            vec!["read".into()],
            None,
            &alice_keys,
            0,
            None,
        )
        .unwrap();
        chain.add_link(link).unwrap();

        let widened = DelegationLink {
            link_id: "link-1".into(),
            depth: 1,
            parent_did: bob.did.clone(),
            child_did: "did:mesh:deadbeefdeadbeefdeadbeefdeadbeef".into(),
            parent_capabilities: vec!["read".into()],
            delegated_capabilities: vec!["read".into(), "write".into()],
            parent_signature: String::new(),
            link_hash: String::new(),
            previous_link_hash: Some(chain.links[0].link_hash.clone()),
            created_at_ms: 0,
            expires_at_ms: None,
        };
        let result = chain.add_link(widened);
        assert!(matches!(result, Err(DelegationError::CapabilityWidening(_, _))));
    }

    #[test]
    fn depth_exactly_at_max_is_fine_one_more_fails() {
        let clock = FixedClock::new(0);
        let identities = IdentityStore::new(&clock);
        let (root, root_keys) = identities.create("root", "r@example.com", vec!["read".into()], None).unwrap();

        let mut chain = ScopeChain::new_root("chain".into(), "r@example.com".into(), &root.did, vec!["read".into()], 1);
        let (child, _) = identities.create("child", "c@example.com", vec![], None).unwrap();
        let link = build_link("l0".into(), 0, &root.did, &child.did, vec!["read".into()], vec!["read".into()], None, &root_keys, 0, None).unwrap();
        chain.add_link(link).unwrap();

        let (grandchild, _) = identities.create("grandchild", "g@example.com", vec![], None).unwrap();
        let overflow = DelegationLink {
            link_id: "l1".into(),
            depth: 1,
            parent_did: child.did.clone(),
            child_did: grandchild.did,
            parent_capabilities: vec!["read".into()],
            delegated_capabilities: vec!["read".into()],
            parent_signature: String::new(),
            link_hash: String::new(),
            previous_link_hash: Some(chain.links[0].link_hash.clone()),
            created_at_ms: 0,
            expires_at_ms: None,
        };
        assert!(matches!(chain.add_link(overflow), Err(DelegationError::DepthExceeded(_))));
    }
}
