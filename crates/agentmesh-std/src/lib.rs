// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! # agentmesh-std
//!
//! `std`-only storage backends for `agentmesh-core`.
//!
//! This crate provides [`FileKVStore`], a JSON file-backed implementation of
//! the [`KVStore`] trait suitable for CLI tools, local agents, and
//! server-side deployments that do not need a full database.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agentmesh_std::storage::FileKVStore;
//! use agentmesh_core::KVStore;
//!
//! let store = FileKVStore::open("/var/lib/agentmesh/state.json")
//!     .expect("failed to open storage file");
//!
//! store.set("agent:001:status", b"active".to_vec());
//! assert_eq!(store.get("agent:001:status"), Some(b"active".to_vec()));
//! ```

pub mod storage;

pub use storage::FileKVStore;
