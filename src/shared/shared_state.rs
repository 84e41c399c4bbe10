use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who wrote an entry and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMetadata {
    pub writer: Option<String>,
    pub written_at: DateTime<Utc>,
    #[serde(default)]
    pub extra: Value,
}

impl StateMetadata {
    pub fn new() -> Self {
        Self {
            writer: None,
            written_at: Utc::now(),
            extra: Value::Null,
        }
    }

    pub fn by(writer: &str) -> Self {
        Self {
            writer: Some(writer.to_string()),
            ..Self::new()
        }
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = extra;
        self
    }
}

impl Default for StateMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub key: String,
    pub value: Value,
    pub metadata: StateMetadata,
    /// Store-wide write sequence number; higher means written later.
    pub version: u64,
}

#[derive(Debug, Default)]
struct StateInner {
    entries: DashMap<String, StateEntry>,
    clock: AtomicU64,
}

/// Cross-agent key/value blackboard.
///
/// Updates are atomic per key and last-writer-wins; writes to distinct keys
/// land on independent shards. Cloning yields another handle to the same
/// store, see [`SharedState::fork`] for an independent copy.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<StateInner>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.entries.get(key).map(|e| e.value.clone())
    }

    pub fn get_entry(&self, key: &str) -> Option<StateEntry> {
        self.inner.entries.get(key).map(|e| e.value().clone())
    }

    pub fn set(&self, key: &str, value: Value, metadata: Option<StateMetadata>) {
        let version = self.inner.clock.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = StateEntry {
            key: key.to_string(),
            value,
            metadata: metadata.unwrap_or_default(),
            version,
        };
        self.inner.entries.insert(key.to_string(), entry);
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.entries.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.entries.remove(key).map(|(_, e)| e.value)
    }

    pub fn keys(&self) -> BTreeSet<String> {
        self.inner.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.inner
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn clear(&self) {
        self.inner.entries.clear();
    }

    /// Current write sequence number.
    pub fn version(&self) -> u64 {
        self.inner.clock.load(Ordering::SeqCst)
    }

    /// Independent copy sharing no storage with `self`.
    pub fn fork(&self) -> SharedState {
        let forked = SharedState::new();
        for entry in self.inner.entries.iter() {
            forked
                .inner
                .entries
                .insert(entry.key().clone(), entry.value().clone());
        }
        forked.inner.clock.store(self.version(), Ordering::SeqCst);
        forked
    }

    /// Entries written after `version`, oldest first.
    pub fn writes_since(&self, version: u64) -> Vec<StateEntry> {
        let mut writes: Vec<StateEntry> = self
            .inner
            .entries
            .iter()
            .filter(|e| e.version > version)
            .map(|e| e.value().clone())
            .collect();
        writes.sort_by_key(|e| e.version);
        writes
    }

    /// Re-applies entries (e.g. a branch's writes) as fresh writes, keeping metadata.
    pub fn merge(&self, entries: Vec<StateEntry>) {
        for entry in entries {
            self.set(&entry.key, entry.value, Some(entry.metadata));
        }
    }
}
