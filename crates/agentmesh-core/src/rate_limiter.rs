// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Token-bucket rate limiting (C10): a global bucket shared by every
//! caller and a per-agent bucket keyed by DID, both consumed atomically by
//! [`RateLimiter::allow`] so a caller never drains one bucket without the
//! other.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;

pub const DEFAULT_GLOBAL_RATE: f64 = 100.0;
pub const DEFAULT_GLOBAL_CAPACITY: f64 = 200.0;
pub const DEFAULT_PER_AGENT_RATE: f64 = 10.0;
pub const DEFAULT_PER_AGENT_CAPACITY: f64 = 20.0;
pub const DEFAULT_BACKPRESSURE_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub global_rate: f64,
    pub global_capacity: f64,
    pub per_agent_rate: f64,
    pub per_agent_capacity: f64,
    pub backpressure_threshold: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_rate: DEFAULT_GLOBAL_RATE,
            global_capacity: DEFAULT_GLOBAL_CAPACITY,
            per_agent_rate: DEFAULT_PER_AGENT_RATE,
            per_agent_capacity: DEFAULT_PER_AGENT_CAPACITY,
            backpressure_threshold: DEFAULT_BACKPRESSURE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining_tokens: f64,
    pub retry_after_seconds: Option<f64>,
    pub backpressure: bool,
}

/// A single token bucket. Refill is computed lazily from elapsed wall-clock
/// time on each access rather than by a background timer.
struct TokenBucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    last_refill_ms: u64,
}

impl TokenBucket {
    fn new(rate: f64, capacity: f64, now_ms: u64) -> Self {
        Self { rate, capacity, tokens: capacity, last_refill_ms: now_ms }
    }

    fn refill(&mut self, now_ms: u64) {
        let elapsed_secs = now_ms.saturating_sub(self.last_refill_ms) as f64 / 1000.0;
        if elapsed_secs > 0.0 {
            self.tokens = (self.tokens + elapsed_secs * self.rate).min(self.capacity);
            self.last_refill_ms = now_ms;
        }
    }

    fn tokens_available(&mut self, now_ms: u64) -> f64 {
        self.refill(now_ms);
        self.tokens
    }

    fn try_consume(&mut self, cost: f64, now_ms: u64) -> bool {
        self.refill(now_ms);
        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }

    fn time_until_available(&mut self, cost: f64, now_ms: u64) -> f64 {
        self.refill(now_ms);
        if self.tokens >= cost {
            0.0
        } else {
            (cost - self.tokens) / self.rate
        }
    }

    fn reset(&mut self, now_ms: u64) {
        self.tokens = self.capacity;
        self.last_refill_ms = now_ms;
    }
}

struct State {
    global: TokenBucket,
    per_agent: HashMap<String, TokenBucket>,
}

/// Token-bucket limiter with a shared global bucket and one bucket per
/// agent DID, created lazily on first use.
pub struct RateLimiter<C: Clock> {
    clock: C,
    config: RateLimitConfig,
    state: RwLock<State>,
}

impl<C: Clock> RateLimiter<C> {
    pub fn new(clock: C, config: RateLimitConfig) -> Self {
        let now_ms = clock.now_ms();
        let global = TokenBucket::new(config.global_rate, config.global_capacity, now_ms);
        Self { clock, config, state: RwLock::new(State { global, per_agent: HashMap::new() }) }
    }

    fn ensure_agent_bucket<'a>(&self, state: &'a mut State, agent_did: &str, now_ms: u64) -> &'a mut TokenBucket {
        state
            .per_agent
            .entry(agent_did.to_string())
            .or_insert_with(|| TokenBucket::new(self.config.per_agent_rate, self.config.per_agent_capacity, now_ms))
    }

    /// Consumes one token from both the global and the per-agent bucket.
    /// Atomic with respect to failure: if either bucket lacks a token,
    /// neither bucket is debited.
    pub fn allow(&self, agent_did: &str) -> bool {
        let now_ms = self.clock.now_ms();
        let mut state = self.state.write();

        let global_available = state.global.tokens_available(now_ms) >= 1.0;
        let agent_available = self.ensure_agent_bucket(&mut state, agent_did, now_ms).tokens_available(now_ms) >= 1.0;
        if !global_available || !agent_available {
            return false;
        }

        state.global.try_consume(1.0, now_ms);
        self.ensure_agent_bucket(&mut state, agent_did, now_ms).try_consume(1.0, now_ms);
        true
    }

    /// Non-consuming status check plus a backpressure signal once either
    /// bucket's usage crosses `backpressure_threshold`.
    pub fn check(&self, agent_did: &str) -> RateLimitResult {
        let now_ms = self.clock.now_ms();
        let mut state = self.state.write();

        let global_remaining = state.global.tokens_available(now_ms);
        let global_capacity = state.global.capacity;
        let agent_bucket = self.ensure_agent_bucket(&mut state, agent_did, now_ms);
        let agent_remaining = agent_bucket.tokens_available(now_ms);
        let agent_capacity = agent_bucket.capacity;

        let allowed = global_remaining >= 1.0 && agent_remaining >= 1.0;
        let retry_after_seconds = if allowed {
            None
        } else {
            let global_wait = state.global.time_until_available(1.0, now_ms);
            let agent_wait = self.ensure_agent_bucket(&mut state, agent_did, now_ms).time_until_available(1.0, now_ms);
            Some(global_wait.max(agent_wait))
        };

        let global_usage = 1.0 - (global_remaining / global_capacity);
        let agent_usage = 1.0 - (agent_remaining / agent_capacity);
        let backpressure = global_usage >= self.config.backpressure_threshold || agent_usage >= self.config.backpressure_threshold;

        RateLimitResult { allowed, remaining_tokens: agent_remaining.min(global_remaining), retry_after_seconds, backpressure }
    }

    /// Snapshot of bucket levels, keyed the way downstream dashboards
    /// expect: always `global_tokens`/`global_capacity`, plus
    /// `agent_did`/`agent_tokens`/`agent_capacity` when `agent_did` is given.
    pub fn get_status(&self, agent_did: Option<&str>) -> HashMap<String, serde_json::Value> {
        let now_ms = self.clock.now_ms();
        let mut state = self.state.write();
        let mut status = HashMap::new();
        status.insert("global_tokens".to_string(), serde_json::json!(state.global.tokens_available(now_ms)));
        status.insert("global_capacity".to_string(), serde_json::json!(state.global.capacity));

        if let Some(agent_did) = agent_did {
            let bucket = self.ensure_agent_bucket(&mut state, agent_did, now_ms);
            status.insert("agent_did".to_string(), serde_json::json!(agent_did));
            status.insert("agent_tokens".to_string(), serde_json::json!(bucket.tokens_available(now_ms)));
            status.insert("agent_capacity".to_string(), serde_json::json!(bucket.capacity));
        }
        status
    }

    /// Resets one agent's bucket, or every bucket (global and per-agent)
    /// when `agent_did` is `None`.
    pub fn reset(&self, agent_did: Option<&str>) {
        let now_ms = self.clock.now_ms();
        let mut state = self.state.write();
        match agent_did {
            Some(agent_did) => {
                self.ensure_agent_bucket(&mut state, agent_did, now_ms).reset(now_ms);
            }
            None => {
                state.global.reset(now_ms);
                for bucket in state.per_agent.values_mut() {
                    bucket.reset(now_ms);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    #[test]
    fn initial_capacity_is_full() {
        let clock = FixedClock::new(0);
        let limiter = RateLimiter::new(&clock, RateLimitConfig { per_agent_capacity: 20.0, ..Default::default() });
        let status = limiter.get_status(None);
        assert_eq!(status["global_capacity"], serde_json::json!(200.0));
    }

    #[test]
    fn per_agent_isolation() {
        let clock = FixedClock::new(0);
        let config = RateLimitConfig { global_rate: 1000.0, global_capacity: 2000.0, per_agent_rate: 5.0, per_agent_capacity: 5.0, ..Default::default() };
        let limiter = RateLimiter::new(&clock, config);
        for _ in 0..5 {
            assert!(limiter.allow("did:mesh:agent1"));
        }
        assert!(!limiter.allow("did:mesh:agent1"));
        assert!(limiter.allow("did:mesh:agent2"));
    }

    #[test]
    fn global_limit_applies_to_all_agents() {
        let clock = FixedClock::new(0);
        let config = RateLimitConfig { global_rate: 1.0, global_capacity: 3.0, per_agent_rate: 100.0, per_agent_capacity: 100.0, ..Default::default() };
        let limiter = RateLimiter::new(&clock, config);
        assert!(limiter.allow("did:mesh:a"));
        assert!(limiter.allow("did:mesh:b"));
        assert!(limiter.allow("did:mesh:c"));
        assert!(!limiter.allow("did:mesh:d"));
    }

    #[test]
    fn refill_restores_tokens_over_time() {
        let clock = FixedClock::new(0);
        let config = RateLimitConfig { global_rate: 1000.0, global_capacity: 2000.0, per_agent_rate: 100.0, per_agent_capacity: 10.0, ..Default::default() };
        let limiter = RateLimiter::new(&clock, config);
        for _ in 0..10 {
            limiter.allow("did:mesh:a");
        }
        assert!(!limiter.allow("did:mesh:a"));
        clock.advance_ms(100);
        assert!(limiter.allow("did:mesh:a"));
    }

    #[test]
    fn reset_restores_single_agent() {
        let clock = FixedClock::new(0);
        let config = RateLimitConfig { per_agent_rate: 5.0, per_agent_capacity: 5.0, ..Default::default() };
        let limiter = RateLimiter::new(&clock, config);
        for _ in 0..5 {
            limiter.allow("did:mesh:agent1");
        }
        assert!(!limiter.allow("did:mesh:agent1"));
        limiter.reset(Some("did:mesh:agent1"));
        assert!(limiter.allow("did:mesh:agent1"));
    }

    #[test]
    fn backpressure_signals_near_capacity() {
        let clock = FixedClock::new(0);
        let config = RateLimitConfig {
            global_rate: 1000.0,
            global_capacity: 2000.0,
            per_agent_rate: 10.0,
            per_agent_capacity: 10.0,
            backpressure_threshold: 0.5,
        };
        let limiter = RateLimiter::new(&clock, config);
        for _ in 0..6 {
            limiter.allow("did:mesh:agent1");
        }
        let result = limiter.check("did:mesh:agent1");
        assert!(result.backpressure);
    }
}
