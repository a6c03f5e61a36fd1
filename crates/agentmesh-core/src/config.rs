// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Engine-level configuration and the shared execution context.
//!
//! [`MeshConfig`] is the single entry point for tuning every governance
//! sub-system at construction time. All fields are optional and have
//! sensible defaults so `MeshConfig::default()` is always valid.
//!
//! [`MeshContext`] bundles the clock and storage handle that every engine
//! needs, per the design note that engines take explicit context objects
//! rather than reaching for global mutable state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::storage::KVStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Default credential lifetime in seconds. See [`crate::credential::DEFAULT_TTL_SECONDS`].
    pub credential_ttl_seconds: u64,
    /// Maximum scope-chain delegation depth. See [`crate::scope_chain::DEFAULT_MAX_DEPTH`].
    pub max_delegation_depth: u32,
    /// Cache TTL for a successful handshake result, in seconds.
    pub handshake_positive_ttl_seconds: u64,
    /// Cache TTL for a failed handshake result, in seconds.
    pub handshake_negative_ttl_seconds: u64,
    /// Allowed clock skew window for handshake nonces, in seconds.
    pub handshake_nonce_skew_seconds: i64,
    /// EMA half-life for reward signal decay, in seconds.
    pub reward_half_life_seconds: f64,
    /// Trust score at or below which an agent is auto-revoked.
    pub revocation_threshold: f64,
    /// Trust score above which the revocation latch resets.
    pub revocation_hysteresis: f64,
    pub global_rate_limit: f64,
    pub global_rate_capacity: f64,
    pub per_agent_rate_limit: f64,
    pub per_agent_rate_capacity: f64,
    pub backpressure_threshold: f64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            credential_ttl_seconds: crate::credential::DEFAULT_TTL_SECONDS,
            max_delegation_depth: crate::scope_chain::DEFAULT_MAX_DEPTH,
            handshake_positive_ttl_seconds: 900,
            handshake_negative_ttl_seconds: 60,
            handshake_nonce_skew_seconds: 60,
            reward_half_life_seconds: crate::reward::DEFAULT_HALF_LIFE_SECS,
            revocation_threshold: crate::reward::DEFAULT_REVOCATION_THRESHOLD,
            revocation_hysteresis: crate::reward::DEFAULT_HYSTERESIS_THRESHOLD,
            global_rate_limit: crate::rate_limiter::DEFAULT_GLOBAL_RATE,
            global_rate_capacity: crate::rate_limiter::DEFAULT_GLOBAL_CAPACITY,
            per_agent_rate_limit: crate::rate_limiter::DEFAULT_PER_AGENT_RATE,
            per_agent_rate_capacity: crate::rate_limiter::DEFAULT_PER_AGENT_CAPACITY,
            backpressure_threshold: crate::rate_limiter::DEFAULT_BACKPRESSURE_THRESHOLD,
        }
    }
}

/// Execution context shared by every facade in [`crate::services`].
///
/// `C` is the clock implementation (real or fixed); `S` is the persistence
/// backend. Cloning a context is cheap — `kvstore` and `clock` are
/// reference-counted.
#[derive(Clone)]
pub struct MeshContext<C: Clock = SystemClock, S: KVStore = crate::storage::InMemoryKVStore> {
    pub clock: Arc<C>,
    pub kvstore: Arc<S>,
    pub config: MeshConfig,
}

impl<C: Clock, S: KVStore> MeshContext<C, S> {
    pub fn new(clock: C, kvstore: S, config: MeshConfig) -> Self {
        Self { clock: Arc::new(clock), kvstore: Arc::new(kvstore), config }
    }
}

impl MeshContext<SystemClock, crate::storage::InMemoryKVStore> {
    pub fn default_in_memory() -> Self {
        Self::new(SystemClock, crate::storage::InMemoryKVStore::new(), MeshConfig::default())
    }
}
