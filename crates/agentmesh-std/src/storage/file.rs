// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! File-based JSON storage backend.
//!
//! [`FileKVStore`] persists all state to a single JSON file on disk. Every
//! mutation flushes the file atomically (write-rename) so that a crash
//! mid-write does not corrupt existing data.
//!
//! ## Caveats
//!
//! * [`FileKVStore`] holds the full state in memory and flushes on every
//!   mutation. It is not intended for high-frequency write workloads.
//! * `KVStore` methods are infallible by contract; a flush failure is logged
//!   and the in-memory state is kept, so callers never observe a write
//!   silently disappearing from the process's own view.
//! * Concurrent access from multiple processes is not supported.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use agentmesh_core::storage::{glob_match, KVStore};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    plain: BTreeMap<String, Vec<u8>>,
    hashes: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    sorted: BTreeMap<String, BTreeMap<String, f64>>,
}

/// A file-backed [`KVStore`] implementation that persists state as JSON.
///
/// # Examples
///
/// ```rust,no_run
/// use agentmesh_std::storage::FileKVStore;
/// use agentmesh_core::KVStore;
///
/// let store = FileKVStore::open("/tmp/agentmesh.json").expect("could not open storage");
/// store.set("agent:001:status", b"active".to_vec());
/// assert_eq!(store.get("agent:001:status"), Some(b"active".to_vec()));
/// ```
pub struct FileKVStore {
    path: PathBuf,
    data: RwLock<Snapshot>,
}

impl FileKVStore {
    /// Open an existing JSON storage file, or create a new empty one if the
    /// path does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).map_err(|error| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, format!("storage JSON parse error: {error}"))
            })?
        } else {
            Snapshot::default()
        };

        Ok(Self { path, data: RwLock::new(data) })
    }

    /// Flush the current in-memory state to disk using an atomic
    /// write-rename: written to `<path>.tmp` first, then renamed over the
    /// target, so a crash during the write never leaves a partial file.
    fn flush(&self) {
        let json = match serde_json::to_string_pretty(&*self.data.read()) {
            Ok(json) => json,
            Err(error) => {
                tracing::error!(?error, "failed to serialize storage snapshot");
                return;
            }
        };

        let tmp_path = self.path.with_extension("tmp");
        if let Err(error) = std::fs::write(&tmp_path, json) {
            tracing::error!(?error, path = %tmp_path.display(), "failed to write storage snapshot");
            return;
        }
        if let Err(error) = std::fs::rename(&tmp_path, &self.path) {
            tracing::error!(?error, path = %self.path.display(), "failed to commit storage snapshot");
        }
    }
}

impl KVStore for FileKVStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.data.read().plain.get(key).cloned()
    }

    fn set(&self, key: &str, value: Vec<u8>) {
        self.data.write().plain.insert(key.to_string(), value);
        self.flush();
    }

    fn delete(&self, key: &str) -> bool {
        let removed = self.data.write().plain.remove(key).is_some();
        if removed {
            self.flush();
        }
        removed
    }

    fn keys(&self, pattern: &str) -> Vec<String> {
        self.data.read().plain.keys().filter(|key| glob_match(pattern, key)).cloned().collect()
    }

    fn hset(&self, key: &str, field: &str, value: Vec<u8>) {
        self.data.write().hashes.entry(key.to_string()).or_default().insert(field.to_string(), value);
        self.flush();
    }

    fn hget(&self, key: &str, field: &str) -> Option<Vec<u8>> {
        self.data.read().hashes.get(key)?.get(field).cloned()
    }

    fn hgetall(&self, key: &str) -> Vec<(String, Vec<u8>)> {
        self.data
            .read()
            .hashes
            .get(key)
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    fn zadd(&self, key: &str, member: &str, score: f64) {
        self.data.write().sorted.entry(key.to_string()).or_default().insert(member.to_string(), score);
        self.flush();
    }

    fn zrange(&self, key: &str, start: isize, stop: isize) -> Vec<String> {
        let data = self.data.read();
        let Some(set) = data.sorted.get(key) else {
            return Vec::new();
        };
        let mut members: Vec<(&String, &f64)> = set.iter().collect();
        members.sort_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));
        slice_by_index(&members, start, stop).iter().map(|(member, _)| (*member).clone()).collect()
    }

    fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> Vec<String> {
        let data = self.data.read();
        let Some(set) = data.sorted.get(key) else {
            return Vec::new();
        };
        let mut members: Vec<(&String, &f64)> = set.iter().filter(|(_, score)| **score >= min && **score <= max).collect();
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

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("agentmesh-std-test-{name}-{}.json", std::process::id()))
    }

    #[test]
    fn set_get_roundtrips_and_persists() {
        let path = temp_path("roundtrip");
        {
            let store = FileKVStore::open(&path).unwrap();
            store.set("a", b"1".to_vec());
        }
        let reopened = FileKVStore::open(&path).unwrap();
        assert_eq!(reopened.get("a"), Some(b"1".to_vec()));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn delete_removes_key() {
        let path = temp_path("delete");
        let store = FileKVStore::open(&path).unwrap();
        store.set("a", b"1".to_vec());
        assert!(store.delete("a"));
        assert_eq!(store.get("a"), None);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn hash_ops_roundtrip() {
        let path = temp_path("hash");
        let store = FileKVStore::open(&path).unwrap();
        store.hset("agent:1", "status", b"active".to_vec());
        assert_eq!(store.hget("agent:1", "status"), Some(b"active".to_vec()));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn sorted_set_range_by_score() {
        let path = temp_path("zset");
        let store = FileKVStore::open(&path).unwrap();
        store.zadd("leaderboard", "alice", 900.0);
        store.zadd("leaderboard", "bob", 500.0);
        let in_range = store.zrangebyscore("leaderboard", 400.0, 600.0);
        assert_eq!(in_range, vec!["bob".to_string()]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn keys_glob_filters() {
        let path = temp_path("keys");
        let store = FileKVStore::open(&path).unwrap();
        store.set("agent:001", b"x".to_vec());
        store.set("peer:001", b"y".to_vec());
        assert_eq!(store.keys("agent:*"), vec!["agent:001".to_string()]);
        std::fs::remove_file(&path).ok();
    }
}
