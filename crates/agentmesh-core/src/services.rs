// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Thin composition facades (C11) over the lower-level engines.
//!
//! These wrap [`AuditLog`], [`RewardEngine`], and [`IdentityStore`] with the
//! call shapes downstream integrations expect — convenience constructors
//! for common event kinds, dashboard-style summaries — without holding any
//! state of their own beyond the engine they wrap.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use crate::audit::{AuditAction, AuditEntry, AuditLog};
use crate::clock::Clock;
use crate::credential::CredentialManager;
use crate::identity::{AgentIdentity, IdentityStore};
use crate::reward::{RewardConfig, RewardEngine, TrustScore};

/// Convenience methods over [`AuditLog`] for the event kinds every caller
/// logs: agent actions, policy decisions, handshakes, and trust changes.
pub struct AuditService<C: Clock> {
    clock: C,
    log: AuditLog,
}

impl<C: Clock> AuditService<C> {
    pub fn new(clock: C, log: AuditLog) -> Self {
        Self { clock, log }
    }

    pub fn log_action(
        &self,
        agent_did: &str,
        action: &str,
        resource: Option<&str>,
        detail: serde_json::Value,
    ) -> Result<AuditEntry, crate::error::AuditError> {
        self.log.append(self.clock.now_ms(), agent_did, AuditAction::from_action_name(action), resource.map(str::to_string), detail)
    }

    pub fn log_policy_decision(
        &self,
        agent_did: &str,
        action: &str,
        allowed: bool,
        policy_name: &str,
    ) -> Result<AuditEntry, crate::error::AuditError> {
        let detail = json!({ "action": action, "allowed": allowed, "policy_name": policy_name });
        self.log.append(self.clock.now_ms(), agent_did, AuditAction::PolicyDecision, Some(action.to_string()), detail)
    }

    pub fn log_handshake(&self, initiator_did: &str, peer_did: &str, success: bool) -> Result<AuditEntry, crate::error::AuditError> {
        let detail = json!({ "success": success });
        self.log.append(self.clock.now_ms(), initiator_did, AuditAction::HandshakeCompleted, Some(peer_did.to_string()), detail)
    }

    pub fn log_trust_change(
        &self,
        agent_did: &str,
        old_score: f64,
        new_score: f64,
        reason: &str,
    ) -> Result<AuditEntry, crate::error::AuditError> {
        let detail = json!({ "old_score": old_score, "new_score": new_score, "reason": reason });
        self.log.append(self.clock.now_ms(), agent_did, AuditAction::ScoreUpdated, None, detail)
    }

    pub fn query_by_agent(&self, agent_did: &str) -> Vec<AuditEntry> {
        self.log.by_actor(agent_did)
    }

    pub fn query_by_type(&self, action: AuditAction) -> Vec<AuditEntry> {
        self.log.tail(self.log.len()).into_iter().filter(|entry| entry.action == action).collect()
    }

    pub fn verify_chain(&self) -> bool {
        self.log.verify_chain().is_ok()
    }

    pub fn entry_count(&self) -> usize {
        self.log.len()
    }

    pub fn chain(&self) -> &AuditLog {
        &self.log
    }

    pub fn summary(&self) -> HashMap<String, serde_json::Value> {
        let mut summary = HashMap::new();
        summary.insert("total_entries".to_string(), json!(self.log.len()));
        summary.insert("chain_valid".to_string(), json!(self.verify_chain()));
        summary.insert("root_hash".to_string(), json!(self.log.merkle_root()));
        summary
    }
}

impl AuditAction {
    /// Maps a free-form action verb to the closest structured [`AuditAction`]
    /// variant, defaulting to [`AuditAction::PolicyDecision`] for anything
    /// that doesn't match one of the well-known verbs — every call into the
    /// audit log still needs a concrete variant, never a freeform string.
    fn from_action_name(action: &str) -> AuditAction {
        match action {
            "identity_created" => AuditAction::IdentityCreated,
            "identity_revoked" => AuditAction::IdentityRevoked,
            "credential_issued" => AuditAction::CredentialIssued,
            "credential_revoked" => AuditAction::CredentialRevoked,
            "delegation_granted" => AuditAction::DelegationGranted,
            "handshake_completed" => AuditAction::HandshakeCompleted,
            "score_updated" => AuditAction::ScoreUpdated,
            "trust_revoked" => AuditAction::TrustRevoked,
            _ => AuditAction::PolicyDecision,
        }
    }
}

/// Convenience methods over [`RewardEngine`] for the signal kinds every
/// caller records, plus fleet-wide dashboard queries.
pub struct RewardService<C: Clock + Clone> {
    engine: RewardEngine<C>,
}

impl<C: Clock + Clone> RewardService<C> {
    pub fn new(clock: C, config: RewardConfig) -> Result<Self, crate::error::TrustError> {
        Ok(Self { engine: RewardEngine::new(clock, config)? })
    }

    pub fn engine(&self) -> &RewardEngine<C> {
        &self.engine
    }

    pub fn get_score(&self, agent_did: &str) -> TrustScore {
        self.engine.recalculate_score(agent_did)
    }

    pub fn get_score_value(&self, agent_did: &str) -> f64 {
        self.get_score(agent_did).total_score
    }

    pub fn record_task_success(&self, agent_did: &str, task_id: &str) {
        self.engine.record_signal(agent_did, crate::reward::Dimension::OutputQuality, 1.0, task_id);
    }

    pub fn record_task_failure(&self, agent_did: &str, reason: &str) {
        self.engine.record_signal(agent_did, crate::reward::Dimension::OutputQuality, 0.0, reason);
    }

    pub fn record_policy_violation(&self, agent_did: &str, policy_name: &str) {
        self.engine.record_policy_compliance(agent_did, false, policy_name);
    }

    pub fn record_handshake(&self, agent_did: &str, peer_did: &str, success: bool) {
        self.engine.record_signal(agent_did, crate::reward::Dimension::CollaborationHealth, if success { 1.0 } else { 0.0 }, peer_did);
    }

    pub fn record_security_event(&self, agent_did: &str, within_boundary: bool, event_type: &str) {
        self.engine.record_signal(agent_did, crate::reward::Dimension::SecurityPosture, if within_boundary { 1.0 } else { 0.0 }, event_type);
    }

    pub fn is_trusted(&self, agent_did: &str, threshold: f64) -> bool {
        self.get_score_value(agent_did) >= threshold
    }

    pub fn agents_below_threshold(&self, threshold: f64) -> Vec<String> {
        self.engine.known_agents().into_iter().filter(|did| self.get_score_value(did) < threshold).collect()
    }

    pub fn recalculate_all(&self) -> HashMap<String, f64> {
        self.engine.known_agents().into_iter().map(|did| (did.clone(), self.get_score_value(&did))).collect()
    }

    pub fn summary(&self) -> HashMap<String, serde_json::Value> {
        let scores: Vec<f64> = self.recalculate_all().into_values().collect();
        let mut summary = HashMap::new();
        summary.insert("total_agents".to_string(), json!(scores.len()));
        if scores.is_empty() {
            summary.insert("avg_score".to_string(), json!(0.0));
            summary.insert("min_score".to_string(), json!(0.0));
            summary.insert("max_score".to_string(), json!(0.0));
        } else {
            let sum: f64 = scores.iter().sum();
            summary.insert("avg_score".to_string(), json!(sum / scores.len() as f64));
            summary.insert("min_score".to_string(), json!(scores.iter().cloned().fold(f64::INFINITY, f64::min)));
            summary.insert("max_score".to_string(), json!(scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max)));
        }
        summary
    }
}

impl<C: Clock + Clone + 'static> RewardService<C> {
    /// Cascade the revocation latch into the rest of the mesh: once an
    /// agent's score crosses the revocation threshold, its identity is
    /// revoked and every credential it currently holds is revoked too
    /// (spec.md §4.6(iii)). Call once per `RewardService` during setup,
    /// after `identities` and `credentials` are constructed.
    pub fn wire_revocation(&self, identities: Arc<IdentityStore<C>>, credentials: Arc<CredentialManager<C>>) {
        self.engine.on_revocation(move |agent_did, reason| {
            let _ = identities.revoke(agent_did, reason, None);
            credentials.revoke_all_for_agent(agent_did);
        });
    }
}

/// Thin registry facade over [`IdentityStore`] for agent lifecycle queries
/// that don't belong on the store itself (fleet-wide filters, lookups keyed
/// by sponsor).
pub struct AgentRegistry<C: Clock> {
    clock: C,
    store: Arc<IdentityStore<C>>,
}

impl<C: Clock + Clone> AgentRegistry<C> {
    pub fn new(clock: C, store: Arc<IdentityStore<C>>) -> Self {
        Self { clock, store }
    }

    pub fn get(&self, did: &str) -> Option<AgentIdentity> {
        self.store.get(did)
    }

    pub fn active_agents(&self) -> Vec<AgentIdentity> {
        let now_ms = self.clock.now_ms();
        self.store.list(None, None).into_iter().filter(|identity| identity.is_active(now_ms)).collect()
    }

    pub fn by_sponsor(&self, sponsor_email: &str) -> Vec<AgentIdentity> {
        self.store.list(None, None).into_iter().filter(|identity| identity.sponsor_email == sponsor_email).collect()
    }

    /// Active agents whose current trust score is at least `min_score`,
    /// per spec.md §4.2's `list(status?, min_score?)`.
    pub fn active_agents_with_min_score(&self, reward: &RewardService<C>, min_score: f64) -> Vec<AgentIdentity> {
        let now_ms = self.clock.now_ms();
        let score_of = |did: &str| reward.get_score_value(did);
        self.store
            .list(None, Some((min_score, &score_of)))
            .into_iter()
            .filter(|identity| identity.is_active(now_ms))
            .collect()
    }
}
