// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Configuration loader for [`crate::config::MeshConfig`].
//!
//! Supports two load strategies:
//!
//! 1. **TOML file** — [`load_config`] reads and deserialises a TOML file.
//! 2. **Environment variables** — [`load_config_from_env`] reads
//!    `AGENTMESH_`-prefixed environment variables.
//!
//! Both loaders are only available behind the `config-loader` feature.
//!
//! # File format
//!
//! ```toml
//! credential_ttl_seconds          = 900
//! max_delegation_depth            = 5
//! handshake_positive_ttl_seconds  = 900
//! handshake_negative_ttl_seconds  = 60
//! reward_half_life_seconds        = 300.0
//! revocation_threshold            = 300.0
//! global_rate_limit               = 100.0
//! per_agent_rate_limit            = 10.0
//! ```
//!
//! # Environment variables
//!
//! | Variable                                  | Type  | Default |
//! |--------------------------------------------|-------|---------|
//! | `AGENTMESH_CREDENTIAL_TTL_SECONDS`          | u64   | 900     |
//! | `AGENTMESH_MAX_DELEGATION_DEPTH`            | u32   | 5       |
//! | `AGENTMESH_HANDSHAKE_POSITIVE_TTL_SECONDS`  | u64   | 900     |
//! | `AGENTMESH_HANDSHAKE_NEGATIVE_TTL_SECONDS`  | u64   | 60      |
//! | `AGENTMESH_REWARD_HALF_LIFE_SECONDS`        | f64   | 300.0   |
//! | `AGENTMESH_REVOCATION_THRESHOLD`            | f64   | 300.0   |
//! | `AGENTMESH_GLOBAL_RATE_LIMIT`               | f64   | 100.0   |
//! | `AGENTMESH_PER_AGENT_RATE_LIMIT`            | f64   | 10.0    |

#![cfg(feature = "config-loader")]

use std::fmt;
use std::fs;
use std::num::{ParseFloatError, ParseIntError};

use crate::config::MeshConfig;

#[derive(Debug)]
pub enum ConfigError {
    FileRead { path: String, source: std::io::Error },
    TomlParse { source: toml::de::Error },
    ParseField { field: String, value: String, reason: String },
    InvalidRange { field: String, value: String, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileRead { path, source } => write!(f, "failed to read config file \"{path}\": {source}"),
            ConfigError::TomlParse { source } => write!(f, "failed to parse TOML config: {source}"),
            ConfigError::ParseField { field, value, reason } => write!(f, "field \"{field}\": cannot parse \"{value}\" — {reason}"),
            ConfigError::InvalidRange { field, value, reason } => write!(f, "field \"{field}\": value \"{value}\" out of range — {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::FileRead { source, .. } => Some(source),
            ConfigError::TomlParse { source } => Some(source),
            _ => None,
        }
    }
}

pub fn load_config(path: &str) -> Result<MeshConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::FileRead { path: path.to_owned(), source })?;
    toml::from_str::<MeshConfig>(&content).map_err(|source| ConfigError::TomlParse { source })
}

pub fn load_config_from_env() -> Result<MeshConfig, ConfigError> {
    let defaults = MeshConfig::default();

    let credential_ttl_seconds = read_env_u64("AGENTMESH_CREDENTIAL_TTL_SECONDS", defaults.credential_ttl_seconds)?;
    if credential_ttl_seconds == 0 {
        return Err(ConfigError::InvalidRange {
            field: "AGENTMESH_CREDENTIAL_TTL_SECONDS".into(),
            value: credential_ttl_seconds.to_string(),
            reason: "must be greater than zero".into(),
        });
    }

    let max_delegation_depth = read_env_u32("AGENTMESH_MAX_DELEGATION_DEPTH", defaults.max_delegation_depth)?;
    let handshake_positive_ttl_seconds = read_env_u64("AGENTMESH_HANDSHAKE_POSITIVE_TTL_SECONDS", defaults.handshake_positive_ttl_seconds)?;
    let handshake_negative_ttl_seconds = read_env_u64("AGENTMESH_HANDSHAKE_NEGATIVE_TTL_SECONDS", defaults.handshake_negative_ttl_seconds)?;
    let handshake_nonce_skew_seconds = read_env_i64("AGENTMESH_HANDSHAKE_NONCE_SKEW_SECONDS", defaults.handshake_nonce_skew_seconds)?;

    let reward_half_life_seconds = read_env_f64("AGENTMESH_REWARD_HALF_LIFE_SECONDS", defaults.reward_half_life_seconds)?;
    if reward_half_life_seconds <= 0.0 {
        return Err(ConfigError::InvalidRange {
            field: "AGENTMESH_REWARD_HALF_LIFE_SECONDS".into(),
            value: reward_half_life_seconds.to_string(),
            reason: "must be > 0.0".into(),
        });
    }

    let revocation_threshold = read_env_f64("AGENTMESH_REVOCATION_THRESHOLD", defaults.revocation_threshold)?;
    let revocation_hysteresis = read_env_f64("AGENTMESH_REVOCATION_HYSTERESIS", defaults.revocation_hysteresis)?;
    if revocation_hysteresis <= revocation_threshold {
        return Err(ConfigError::InvalidRange {
            field: "AGENTMESH_REVOCATION_HYSTERESIS".into(),
            value: revocation_hysteresis.to_string(),
            reason: "must be greater than AGENTMESH_REVOCATION_THRESHOLD".into(),
        });
    }

    let global_rate_limit = read_env_f64("AGENTMESH_GLOBAL_RATE_LIMIT", defaults.global_rate_limit)?;
    let global_rate_capacity = read_env_f64("AGENTMESH_GLOBAL_RATE_CAPACITY", defaults.global_rate_capacity)?;
    let per_agent_rate_limit = read_env_f64("AGENTMESH_PER_AGENT_RATE_LIMIT", defaults.per_agent_rate_limit)?;
    let per_agent_rate_capacity = read_env_f64("AGENTMESH_PER_AGENT_RATE_CAPACITY", defaults.per_agent_rate_capacity)?;
    let backpressure_threshold = read_env_f64("AGENTMESH_BACKPRESSURE_THRESHOLD", defaults.backpressure_threshold)?;
    if !(0.0..=1.0).contains(&backpressure_threshold) {
        return Err(ConfigError::InvalidRange {
            field: "AGENTMESH_BACKPRESSURE_THRESHOLD".into(),
            value: backpressure_threshold.to_string(),
            reason: "must be in range 0.0-1.0".into(),
        });
    }

    Ok(MeshConfig {
        credential_ttl_seconds,
        max_delegation_depth,
        handshake_positive_ttl_seconds,
        handshake_negative_ttl_seconds,
        handshake_nonce_skew_seconds,
        reward_half_life_seconds,
        revocation_threshold,
        revocation_hysteresis,
        global_rate_limit,
        global_rate_capacity,
        per_agent_rate_limit,
        per_agent_rate_capacity,
        backpressure_threshold,
    })
}

fn read_env_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().map_err(|source: ParseIntError| ConfigError::ParseField { field: key.to_owned(), value: val, reason: source.to_string() }),
        Err(_) => Ok(default),
    }
}

fn read_env_u32(key: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u32>().map_err(|source: ParseIntError| ConfigError::ParseField { field: key.to_owned(), value: val, reason: source.to_string() }),
        Err(_) => Ok(default),
    }
}

fn read_env_i64(key: &str, default: i64) -> Result<i64, ConfigError> {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<i64>().map_err(|source: ParseIntError| ConfigError::ParseField { field: key.to_owned(), value: val, reason: source.to_string() }),
        Err(_) => Ok(default),
    }
}

fn read_env_f64(key: &str, default: f64) -> Result<f64, ConfigError> {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<f64>().map_err(|source: ParseFloatError| ConfigError::ParseField { field: key.to_owned(), value: val, reason: source.to_string() }),
        Err(_) => Ok(default),
    }
}
