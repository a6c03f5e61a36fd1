// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! # agentmesh-core
//!
//! Governance control plane for autonomous AI agents: identity, credential
//! issuance, capability-narrowing delegation, trust handshakes, reward-based
//! scoring, declarative policy, and a tamper-evident audit log.
//!
//! ## Architecture
//!
//! ```text
//! MeshContext<C: Clock, S: KVStore>
//!   ├── IdentityStore<C>     — register / suspend / revoke agent identities
//!   ├── CredentialManager<C> — issue / validate / rotate bearer credentials
//!   ├── ScopeChain           — hash-linked, capability-narrowing delegation
//!   ├── TrustHandshake<C>    — mutual challenge/response trust verification
//!   ├── RewardEngine<C>      — multi-dimension EMA trust scoring
//!   ├── PolicyEngine         — rule matching with a defaults fallback
//!   ├── AuditLog             — Merkle-chained, tamper-evident audit trail
//!   ├── InMemoryEventBus      — glob-pattern publish/subscribe
//!   └── RateLimiter<C>       — global + per-agent token buckets
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use agentmesh_core::{
//!     clock::SystemClock,
//!     identity::IdentityStore,
//!     credential::CredentialManager,
//! };
//!
//! let identities = IdentityStore::new(SystemClock);
//! let (agent, _keys) = identities
//!     .create("research-agent", "owner@example.com", vec!["read".into()], None)
//!     .unwrap();
//!
//! let credentials = CredentialManager::new(SystemClock);
//! let credential = credentials
//!     .issue(&agent.did, 900, agent.capabilities.clone(), &agent.capabilities)
//!     .unwrap();
//! assert!(credentials.validate(&credential.token).is_some());
//! ```

pub mod audit;
pub mod clock;
pub mod config;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod event_bus;
pub mod handshake;
pub mod identity;
pub mod policy;
pub mod rate_limiter;
pub mod reward;
pub mod scope_chain;
pub mod services;
pub mod storage;

#[cfg(feature = "config-loader")]
pub mod config_loader;

pub use clock::{Clock, SystemClock};
pub use config::{MeshConfig, MeshContext};
pub use credential::{Credential, CredentialManager};
pub use identity::{AgentIdentity, IdentityStore};
pub use rate_limiter::RateLimiter;
pub use reward::RewardEngine;
pub use scope_chain::ScopeChain;
pub use storage::{InMemoryKVStore, KVStore};

#[cfg(feature = "config-loader")]
pub use config_loader::{load_config, load_config_from_env, ConfigError};
