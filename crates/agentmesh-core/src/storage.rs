// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! The `KVStore` persistence seam (spec'd at its contract surface only;
//! concrete backends beyond the in-memory reference implementation here are
//! out of scope — see `agentmesh-std` for the file-backed one).
//!
//! Only single-key atomicity is assumed of implementations. No transactions
//! are required across keys.

use std::collections::BTreeMap;

use parking_lot::RwLock;

/// Narrow persistence interface every engine is built against. Every method
/// that can fail does so with a plain `String` reason — `KVStore` is a
/// boundary the core treats as already-validated infrastructure, not a
/// source of typed domain errors.
pub trait KVStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&self, key: &str, value: Vec<u8>);
    fn delete(&self, key: &str) -> bool;
    fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// List keys matching a glob-style pattern (`*` = any run of chars,
    /// `?` = single char).
    fn keys(&self, pattern: &str) -> Vec<String>;

    // -- hash operations (per-field sub-maps) -------------------------------
    fn hset(&self, key: &str, field: &str, value: Vec<u8>);
    fn hget(&self, key: &str, field: &str) -> Option<Vec<u8>>;
    fn hgetall(&self, key: &str) -> Vec<(String, Vec<u8>)>;

    // -- sorted-set operations (used by the reward engine's recency index) -
    fn zadd(&self, key: &str, member: &str, score: f64);
    fn zrange(&self, key: &str, start: isize, stop: isize) -> Vec<String>;
    fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> Vec<String>;
}

/// Glob-style match supporting `*` and `?`, sufficient for the patterns
/// this crate and its callers construct (`agent:*`, `audit:????`).
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    fn helper(pattern: &[u8], candidate: &[u8]) -> bool {
        match (pattern.first(), candidate.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                helper(&pattern[1..], candidate)
                    || (!candidate.is_empty() && helper(pattern, &candidate[1..]))
            }
            (Some(b'?'), Some(_)) => helper(&pattern[1..], &candidate[1..]),
            (Some(p), Some(c)) if p == c => helper(&pattern[1..], &candidate[1..]),
            _ => false,
        }
    }
    helper(pattern.as_bytes(), candidate.as_bytes())
}

#[derive(Default)]
struct Inner {
    plain: BTreeMap<String, Vec<u8>>,
    hashes: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    sorted: BTreeMap<String, BTreeMap<String, f64>>,
}

/// A reference in-memory [`KVStore`] implementation, suitable for tests and
/// single-process deployments that don't need durability.
#[derive(Default)]
pub struct InMemoryKVStore {
    inner: RwLock<Inner>,
}

impl InMemoryKVStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KVStore for InMemoryKVStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.read().plain.get(key).cloned()
    }

    fn set(&self, key: &str, value: Vec<u8>) {
        self.inner.write().plain.insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) -> bool {
        self.inner.write().plain.remove(key).is_some()
    }

    fn keys(&self, pattern: &str) -> Vec<String> {
        self.inner
            .read()
            .plain
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect()
    }

    fn hset(&self, key: &str, field: &str, value: Vec<u8>) {
        self.inner
            .write()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }

    fn hget(&self, key: &str, field: &str) -> Option<Vec<u8>> {
        self.inner.read().hashes.get(key)?.get(field).cloned()
    }

    fn hgetall(&self, key: &str) -> Vec<(String, Vec<u8>)> {
        self.inner
            .read()
            .hashes
            .get(key)
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    fn zadd(&self, key: &str, member: &str, score: f64) {
        self.inner
            .write()
            .sorted
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
    }

    fn zrange(&self, key: &str, start: isize, stop: isize) -> Vec<String> {
        let inner = self.inner.read();
        let Some(set) = inner.sorted.get(key) else {
            return Vec::new();
        };
        let mut members: Vec<(&String, &f64)> = set.iter().collect();
        members.sort_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));
        slice_by_index(&members, start, stop)
            .iter()
            .map(|(member, _)| (*member).clone())
            .collect()
    }

    fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> Vec<String> {
        let inner = self.inner.read();
        let Some(set) = inner.sorted.get(key) else {
            return Vec::new();
        };
        let mut members: Vec<(&String, &f64)> = set
            .iter()
            .filter(|(_, score)| **score >= min && **score <= max)
            .collect();
        members.sort_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));
        members.into_iter().map(|(member, _)| member.clone()).collect()
    }
}

fn slice_by_index<T: Clone>(items: &[T], start: isize, stop: isize) -> Vec<T> {
    let len = items.len() as isize;
    let normalize = |idx: isize| -> usize {
        let idx = if idx < 0 { (len + idx).max(0) } else { idx.min(len) };
        idx as usize
    };
    let start = normalize(start);
    let stop = (normalize(stop) + 1).min(items.len());
    if start >= stop {
        Vec::new()
    } else {
        items[start..stop].to_vec()
    }
}
