//! The versioned concurrent key-value map shared by every node.
//!
//! One `Store` is created per process and lives for the process lifetime.
//! It is deliberately the simplest component in the system: a single coarse
//! lock guarding a `HashMap`, rather than per-entry CAS.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::core::{Key, Value, Version};

/// `Set`'s conflict-resolution rule, fixed for the process lifetime by
/// `USE_VERSIONING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersioningPolicy {
    /// A stored `(value, version)` is replaced only if the incoming version
    /// is strictly greater.
    Monotonic,
    /// Whichever `Set` call *arrives* last wins, regardless of the version
    /// it carries. Exists to demonstrate the reordering hazard that
    /// versioning is meant to prevent.
    LastWriteWinsByArrival,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    value: Value,
    version: Version,
}

/// Versioned concurrent map keyed by `Key`, shared by the leader and by
/// `FollowerApply` on followers.
pub struct Store {
    policy: VersioningPolicy,
    entries: RwLock<HashMap<Key, Entry>>,
}

impl Store {
    pub fn new(policy: VersioningPolicy) -> Self {
        Self {
            policy,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> VersioningPolicy {
        self.policy
    }

    /// Applies the monotone (or, under the naive policy, arrival-order) rule
    /// for `key`. Never fails.
    ///
    /// Returns `true` if the incoming `(value, version)` replaced the stored
    /// entry (or created it), `false` if the stale update was ignored.
    /// Callers are free to ignore the return value.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>, version: Version) -> bool {
        let key = key.into();
        let value = value.into();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        match entries.get_mut(&key) {
            None => {
                entries.insert(key, Entry { value, version });
                true
            }
            Some(existing) => {
                let replace = match self.policy {
                    VersioningPolicy::Monotonic => version > existing.version,
                    VersioningPolicy::LastWriteWinsByArrival => true,
                };
                if replace {
                    existing.value = value;
                    existing.version = version;
                }
                replace
            }
        }
    }

    /// Returns the current value for `key`, or `None` if absent.
    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).map(|e| e.value.clone())
    }

    /// Returns the current version for `key`, or `None` if absent.
    pub fn get_version(&self, key: &str) -> Option<Version> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).map(|e| e.version)
    }

    /// Point-in-time snapshot of every `(key, value)` pair.
    pub fn dump(&self) -> HashMap<Key, Value> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    /// Point-in-time snapshot of every `(key, version)` pair.
    pub fn dump_versions(&self) -> HashMap<Key, Version> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.iter().map(|(k, e)| (k.clone(), e.version)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_version_replaces_under_monotonic_policy() {
        let store = Store::new(VersioningPolicy::Monotonic);
        assert!(store.set("k", "A", 1));
        assert!(store.set("k", "B", 2));
        assert_eq!(store.get("k").as_deref(), Some("B"));
        assert_eq!(store.get_version("k"), Some(2));
    }

    #[test]
    fn stale_version_is_ignored_under_monotonic_policy() {
        let store = Store::new(VersioningPolicy::Monotonic);
        assert!(store.set("k", "B", 5));
        assert!(!store.set("k", "A", 3));
        assert_eq!(store.get("k").as_deref(), Some("B"));
        assert_eq!(store.get_version("k"), Some(5));
    }

    #[test]
    fn equal_version_keeps_existing_value() {
        let store = Store::new(VersioningPolicy::Monotonic);
        store.set("k", "first", 7);
        let replaced = store.set("k", "second", 7);
        assert!(!replaced);
        assert_eq!(store.get("k").as_deref(), Some("first"));
    }

    #[test]
    fn replaying_same_command_is_idempotent() {
        let store = Store::new(VersioningPolicy::Monotonic);
        for _ in 0..5 {
            store.set("k", "value", 9);
        }
        assert_eq!(store.get("k").as_deref(), Some("value"));
        assert_eq!(store.get_version("k"), Some(9));
    }

    #[test]
    fn naive_policy_lets_the_last_arrival_win_regardless_of_version() {
        let store = Store::new(VersioningPolicy::LastWriteWinsByArrival);
        store.set("k", "newer", 10);
        store.set("k", "older", 2);
        assert_eq!(store.get("k").as_deref(), Some("older"));
    }

    #[test]
    fn get_on_absent_key_returns_none() {
        let store = Store::new(VersioningPolicy::Monotonic);
        assert_eq!(store.get("missing"), None);
        assert_eq!(store.get_version("missing"), None);
    }

    #[test]
    fn dump_reflects_all_keys() {
        let store = Store::new(VersioningPolicy::Monotonic);
        store.set("a", "1", 1);
        store.set("b", "2", 1);
        let dump = store.dump();
        assert_eq!(dump.len(), 2);
        assert_eq!(dump.get("a").map(String::as_str), Some("1"));
        let versions = store.dump_versions();
        assert_eq!(versions.get("b"), Some(&1));
    }

    #[test]
    fn concurrent_sets_on_same_key_converge_to_highest_version() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(Store::new(VersioningPolicy::Monotonic));
        let mut handles = Vec::new();
        for version in 1..=50u64 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                store.set("k", format!("v{version}"), version);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get_version("k"), Some(50));
        assert_eq!(store.get("k").as_deref(), Some("v50"));
    }
}
