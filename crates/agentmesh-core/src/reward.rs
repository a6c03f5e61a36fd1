// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Multi-dimensional EMA reward/scoring engine (C6).
//!
//! Each agent carries a bounded ring buffer of recent signals and a
//! per-dimension exponential moving average with recency weighting
//! `w_i = exp(-Δt/τ)`. The total score is a weighted sum of the seven
//! dimensions, clamped to `[0, 1000]`; crossing below a threshold sets a
//! revocation latch and fires registered callbacks exactly once until the
//! score recovers past a hysteresis band.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::TrustError;

/// Half-life, in seconds, used to convert elapsed time into the EMA decay
/// weight `exp(-Δt/τ)`. Spec's Open Question #1: fixed as a documented
/// constant rather than inferred from data, overridable via [`RewardConfig`].
pub const DEFAULT_HALF_LIFE_SECS: f64 = 300.0;
pub const DEFAULT_RING_BUFFER_SIZE: usize = 1000;
pub const DEFAULT_REVOCATION_THRESHOLD: f64 = 300.0;
pub const DEFAULT_HYSTERESIS_THRESHOLD: f64 = 400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    PolicyCompliance,
    Integrity,
    ResourceEfficiency,
    OutputQuality,
    Transparency,
    SecurityPosture,
    CollaborationHealth,
}

impl Dimension {
    pub const ALL: [Dimension; 7] = [
        Dimension::PolicyCompliance,
        Dimension::Integrity,
        Dimension::ResourceEfficiency,
        Dimension::OutputQuality,
        Dimension::Transparency,
        Dimension::SecurityPosture,
        Dimension::CollaborationHealth,
    ];

    /// Default weight for this dimension. Weights sum to 1.0 within 1e-9.
    pub fn default_weight(self) -> f64 {
        match self {
            Dimension::PolicyCompliance => 0.22,
            Dimension::Integrity => 0.20,
            Dimension::ResourceEfficiency => 0.12,
            Dimension::OutputQuality => 0.16,
            Dimension::Transparency => 0.10,
            Dimension::SecurityPosture => 0.14,
            Dimension::CollaborationHealth => 0.06,
        }
    }
}

/// A single observed outcome contributing to one reward dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardSignal {
    pub agent_did: String,
    pub dimension: Dimension,
    pub value: f64,
    pub source: String,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DimensionScore {
    pub score: f64,
    pub signal_count: u64,
    pub positive_signals: u64,
    pub negative_signals: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    VerifiedPartner,
    Trusted,
    Standard,
    Probationary,
    Untrusted,
}

impl Tier {
    pub fn from_score(total_score: f64) -> Self {
        if total_score >= 900.0 {
            Tier::VerifiedPartner
        } else if total_score >= 700.0 {
            Tier::Trusted
        } else if total_score >= 500.0 {
            Tier::Standard
        } else if total_score >= 300.0 {
            Tier::Probationary
        } else {
            Tier::Untrusted
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustScore {
    pub agent_did: String,
    pub total_score: f64,
    pub dimensions: HashMap<Dimension, DimensionScore>,
    pub tier: Tier,
    pub last_updated_ms: u64,
}

/// Trend computed from the slope of recent signal values; purely
/// informational, not fed back into the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreExplanation {
    pub agent_did: String,
    pub total_score: f64,
    pub dimensions: HashMap<Dimension, DimensionScore>,
    pub trend: Trend,
}

#[derive(Debug, Clone)]
pub struct RewardConfig {
    pub half_life_secs: f64,
    pub ring_buffer_size: usize,
    pub revocation_threshold: f64,
    pub hysteresis_threshold: f64,
    pub weights: HashMap<Dimension, f64>,
}

impl Default for RewardConfig {
    fn default() -> Self {
        let weights = Dimension::ALL.iter().map(|dim| (*dim, dim.default_weight())).collect();
        Self {
            half_life_secs: DEFAULT_HALF_LIFE_SECS,
            ring_buffer_size: DEFAULT_RING_BUFFER_SIZE,
            revocation_threshold: DEFAULT_REVOCATION_THRESHOLD,
            hysteresis_threshold: DEFAULT_HYSTERESIS_THRESHOLD,
            weights,
        }
    }
}

impl RewardConfig {
    pub fn weight_sum(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn validate(&self) -> Result<(), TrustError> {
        let sum = self.weight_sum();
        if (sum - 1.0).abs() >= 1e-9 {
            return Err(TrustError::InvalidWeightSum(sum));
        }
        Ok(())
    }
}

struct AgentState {
    signals: VecDeque<RewardSignal>,
    revoked_latch: bool,
}

impl AgentState {
    fn new() -> Self {
        Self {
            signals: VecDeque::new(),
            revoked_latch: false,
        }
    }
}

type RevocationCallback = Box<dyn Fn(&str, &str) + Send + Sync>;

/// Owns per-agent signal history and computes EMA-weighted trust scores.
/// Revocation callbacks are stored under the same writer lock as the
/// subscriber lists elsewhere in this crate — copy-on-read via a cloned
/// `Vec` so emission never blocks registration.
pub struct RewardEngine<C: Clock> {
    clock: C,
    config: RewardConfig,
    agents: RwLock<HashMap<String, AgentState>>,
    callbacks: RwLock<Vec<RevocationCallback>>,
}

impl<C: Clock> RewardEngine<C> {
    pub fn new(clock: C, config: RewardConfig) -> Result<Self, TrustError> {
        config.validate()?;
        Ok(Self {
            clock,
            config,
            agents: RwLock::new(HashMap::new()),
            callbacks: RwLock::new(Vec::new()),
        })
    }

    pub fn on_revocation<F>(&self, callback: F)
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.callbacks.write().push(Box::new(callback));
    }

    pub fn record_signal(&self, agent_did: &str, dimension: Dimension, value: f64, source: &str) {
        let value = value.clamp(0.0, 1.0);
        let signal = RewardSignal {
            agent_did: agent_did.to_string(),
            dimension,
            value,
            source: source.to_string(),
            timestamp_ms: self.clock.now_ms(),
        };

        let mut agents = self.agents.write();
        let state = agents.entry(agent_did.to_string()).or_insert_with(AgentState::new);
        if state.signals.len() >= self.config.ring_buffer_size {
            state.signals.pop_front();
        }
        state.signals.push_back(signal);
    }

    /// Convenience wrapper matching the original system's
    /// `record_policy_compliance` helper.
    pub fn record_policy_compliance(&self, agent_did: &str, compliant: bool, policy_name: &str) {
        self.record_signal(
            agent_did,
            Dimension::PolicyCompliance,
            if compliant { 1.0 } else { 0.0 },
            policy_name,
        );
    }

    /// Convenience wrapper matching the original system's
    /// `record_resource_usage` helper: efficiency is the unused fraction of
    /// both the token and compute budgets, averaged.
    pub fn record_resource_usage(
        &self,
        agent_did: &str,
        tokens_used: f64,
        tokens_budget: f64,
        compute_ms: f64,
        compute_budget_ms: f64,
    ) {
        let token_efficiency = if tokens_budget > 0.0 {
            (1.0 - tokens_used / tokens_budget).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let compute_efficiency = if compute_budget_ms > 0.0 {
            (1.0 - compute_ms / compute_budget_ms).clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.record_signal(
            agent_did,
            Dimension::ResourceEfficiency,
            (token_efficiency + compute_efficiency) / 2.0,
            "resource_usage",
        );
    }

    /// Recompute the agent's [`TrustScore`] from its signal history and run
    /// the auto-revocation latch. Returns `None` for agents with no signal
    /// history (callers treat this as the implicit default score of 500).
    pub fn recalculate_score(&self, agent_did: &str) -> TrustScore {
        let now_ms = self.clock.now_ms();
        let mut dimensions = HashMap::new();

        {
            let agents = self.agents.read();
            let empty = VecDeque::new();
            let signals = agents.get(agent_did).map_or(&empty, |state| &state.signals);

            for dimension in Dimension::ALL {
                let mut weighted_sum = 0.0;
                let mut weight_total = 0.0;
                let mut signal_count = 0u64;
                let mut positive_signals = 0u64;
                let mut negative_signals = 0u64;

                for signal in signals.iter().filter(|s| s.dimension == dimension) {
                    let delta_secs = now_ms.saturating_sub(signal.timestamp_ms) as f64 / 1000.0;
                    let weight = (-delta_secs / self.config.half_life_secs).exp();
                    weighted_sum += signal.value * weight;
                    weight_total += weight;
                    signal_count += 1;
                    if signal.value >= 0.5 {
                        positive_signals += 1;
                    } else {
                        negative_signals += 1;
                    }
                }

                // No signals yet for this dimension: default to the
                // dimension's share of the neutral total (500/1000).
                let normalized = if weight_total > 0.0 { weighted_sum / weight_total } else { 0.5 };
                dimensions.insert(
                    dimension,
                    DimensionScore {
                        score: normalized * 1000.0,
                        signal_count,
                        positive_signals,
                        negative_signals,
                    },
                );
            }
        }

        let total_score: f64 = Dimension::ALL
            .iter()
            .map(|dimension| {
                let weight = self.config.weights.get(dimension).copied().unwrap_or(0.0);
                dimensions[dimension].score * weight
            })
            .sum::<f64>()
            .clamp(0.0, 1000.0);

        let score = TrustScore {
            agent_did: agent_did.to_string(),
            total_score,
            dimensions,
            tier: Tier::from_score(total_score),
            last_updated_ms: now_ms,
        };

        self.run_revocation_latch(agent_did, total_score);
        score
    }

    fn run_revocation_latch(&self, agent_did: &str, total_score: f64) {
        let mut agents = self.agents.write();
        let state = agents.entry(agent_did.to_string()).or_insert_with(AgentState::new);

        if total_score < self.config.revocation_threshold && !state.revoked_latch {
            state.revoked_latch = true;
            drop(agents);
            let callbacks = self.callbacks.read();
            for callback in callbacks.iter() {
                callback(agent_did, "trust score fell below revocation threshold");
            }
        } else if total_score > self.config.hysteresis_threshold && state.revoked_latch {
            state.revoked_latch = false;
        }
    }

    /// DIDs of every agent with at least one recorded signal.
    pub fn known_agents(&self) -> Vec<String> {
        self.agents.read().keys().cloned().collect()
    }

    pub fn is_revoked_latch_set(&self, agent_did: &str) -> bool {
        self.agents.read().get(agent_did).is_some_and(|state| state.revoked_latch)
    }

    /// Human-readable breakdown mirroring the original system's
    /// `get_score_explanation`.
    pub fn explain(&self, agent_did: &str) -> ScoreExplanation {
        let score = self.recalculate_score(agent_did);
        let trend = self.compute_trend(agent_did);
        ScoreExplanation {
            agent_did: score.agent_did,
            total_score: score.total_score,
            dimensions: score.dimensions,
            trend,
        }
    }

    fn compute_trend(&self, agent_did: &str) -> Trend {
        let agents = self.agents.read();
        let Some(state) = agents.get(agent_did) else {
            return Trend::Stable;
        };
        if state.signals.len() < 2 {
            return Trend::Stable;
        }
        let midpoint = state.signals.len() / 2;
        let older_avg: f64 = state.signals.iter().take(midpoint).map(|s| s.value).sum::<f64>() / midpoint as f64;
        let newer: Vec<&RewardSignal> = state.signals.iter().skip(midpoint).collect();
        let newer_avg: f64 = newer.iter().map(|s| s.value).sum::<f64>() / newer.len() as f64;

        let delta = newer_avg - older_avg;
        if delta > 0.05 {
            Trend::Improving
        } else if delta < -0.05 {
            Trend::Declining
        } else {
            Trend::Stable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn default_weights_sum_to_one() {
        let config = RewardConfig::default();
        assert!((config.weight_sum() - 1.0).abs() < 1e-9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn score_always_within_bounds() {
        let clock = FixedClock::new(0);
        let engine = RewardEngine::new(&clock, RewardConfig::default()).unwrap();
        for _ in 0..50 {
            engine.record_signal("did:mesh:a", Dimension::Integrity, 1.0, "test");
            clock.advance_ms(1_000);
        }
        let score = engine.recalculate_score("did:mesh:a");
        assert!(score.total_score >= 0.0 && score.total_score <= 1000.0);
    }

    #[test]
    fn exclusively_positive_signals_are_monotonically_non_decreasing() {
        let clock = FixedClock::new(0);
        let engine = RewardEngine::new(&clock, RewardConfig::default()).unwrap();
        let mut previous = 0.0;
        for _ in 0..20 {
            for dimension in Dimension::ALL {
                engine.record_signal("did:mesh:a", dimension, 1.0, "test");
            }
            let score = engine.recalculate_score("did:mesh:a").total_score;
            assert!(score >= previous - 1e-9, "score regressed: {previous} -> {score}");
            previous = score;
            clock.advance_ms(1_000);
        }
    }

    #[test]
    fn exclusively_negative_signals_never_go_below_zero() {
        let clock = FixedClock::new(0);
        let engine = RewardEngine::new(&clock, RewardConfig::default()).unwrap();
        for _ in 0..200 {
            for dimension in Dimension::ALL {
                engine.record_signal("did:mesh:a", dimension, 0.0, "test");
            }
            let score = engine.recalculate_score("did:mesh:a").total_score;
            assert!(score >= 0.0);
            clock.advance_ms(1_000);
        }
    }

    #[test]
    fn auto_revocation_fires_exactly_once() {
        let clock = FixedClock::new(0);
        let engine = RewardEngine::new(&clock, RewardConfig::default()).unwrap();
        let fire_count = Arc::new(AtomicUsize::new(0));
        let counter = fire_count.clone();
        engine.on_revocation(move |_did, _reason| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..100 {
            for dimension in Dimension::ALL {
                engine.record_signal("did:mesh:a", dimension, 0.0, "test");
            }
            engine.recalculate_score("did:mesh:a");
            clock.advance_ms(1_000);
        }

        assert_eq!(fire_count.load(Ordering::SeqCst), 1);
        assert!(engine.is_revoked_latch_set("did:mesh:a"));
    }

    #[test]
    fn tier_thresholds_match_spec() {
        assert_eq!(Tier::from_score(950.0), Tier::VerifiedPartner);
        assert_eq!(Tier::from_score(900.0), Tier::VerifiedPartner);
        assert_eq!(Tier::from_score(800.0), Tier::Trusted);
        assert_eq!(Tier::from_score(700.0), Tier::Trusted);
        assert_eq!(Tier::from_score(600.0), Tier::Standard);
        assert_eq!(Tier::from_score(500.0), Tier::Standard);
        assert_eq!(Tier::from_score(400.0), Tier::Probationary);
        assert_eq!(Tier::from_score(300.0), Tier::Probationary);
        assert_eq!(Tier::from_score(299.0), Tier::Untrusted);
    }
}
