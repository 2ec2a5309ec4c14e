//! Peer-scoped, persisted history of `remote name -> local name` choices.
//!
//! The mapping for a peer is injective: no two source names ever share a
//! target name. Updates are read-modify-write under a per-peer lock; different
//! peers never contend with each other.

pub mod codec;
pub mod sqlite;

use crate::utils::errors::{NegotiationError, Result};
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

pub use sqlite::SqliteKeyValueStore;

pub const KEY_PREFIX: &str = "resource_name_mapping/";

/// Flat string key/value persistence collaborator.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Non-persistent store, for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: DashMap<String, String>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub struct NameMappingStore {
    store: Arc<dyn KeyValueStore>,
    peer_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl NameMappingStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            peer_locks: DashMap::new(),
        }
    }

    /// Last known `source -> target` names for a peer.
    pub fn get_mapping(&self, peer_id: &str) -> Result<BTreeMap<String, String>> {
        match self.store.get(&storage_key(peer_id))? {
            Some(encoded) => codec::deserialize(&encoded),
            None => Ok(BTreeMap::new()),
        }
    }

    /// Merge `new_pairs` into the peer's mapping.
    ///
    /// Existing pairs whose target collides with a new target are evicted
    /// first. `new_pairs` must itself be injective.
    pub fn update_mapping(&self, peer_id: &str, new_pairs: &BTreeMap<String, String>) -> Result<()> {
        let new_targets: BTreeSet<&str> = new_pairs.values().map(String::as_str).collect();
        if new_targets.len() != new_pairs.len() {
            return Err(NegotiationError::Validation(
                "two resources cannot map to the same local name".to_string(),
            ));
        }

        let lock = self.peer_lock(peer_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut mapping = match self.get_mapping(peer_id) {
            Ok(mapping) => mapping,
            Err(e) => {
                warn!("Discarding unreadable name mapping for peer {}: {}", peer_id, e);
                BTreeMap::new()
            }
        };

        mapping.retain(|source, target| {
            let evict = new_targets.contains(target.as_str())
                && new_pairs.get(source).map(String::as_str) != Some(target.as_str());
            if evict {
                debug!("Evicting mapping {} -> {} for peer {}", source, target, peer_id);
            }
            !evict
        });
        mapping.extend(new_pairs.iter().map(|(k, v)| (k.clone(), v.clone())));

        self.store.set(&storage_key(peer_id), &codec::serialize(&mapping))
    }

    fn peer_lock(&self, peer_id: &str) -> Arc<Mutex<()>> {
        self.peer_locks
            .entry(peer_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn storage_key(peer_id: &str) -> String {
    format!("{}{}", KEY_PREFIX, peer_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn pairs(items: &[(&str, &str)]) -> BTreeMap<String, String> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn store() -> NameMappingStore {
        NameMappingStore::new(Arc::new(MemoryKeyValueStore::new()))
    }

    fn assert_injective(mapping: &BTreeMap<String, String>) {
        let targets: HashSet<&String> = mapping.values().collect();
        assert_eq!(targets.len(), mapping.len(), "mapping not injective: {mapping:?}");
    }

    #[test]
    fn test_colliding_value_evicts_previous_pair() {
        let store = store();
        store.update_mapping("peer1", &pairs(&[("proj", "proj_local")])).unwrap();
        store.update_mapping("peer1", &pairs(&[("other", "proj_local")])).unwrap();

        assert_eq!(store.get_mapping("peer1").unwrap(), pairs(&[("other", "proj_local")]));
    }

    #[test]
    fn test_injectivity_over_update_sequence() {
        let store = store();
        let names = ["a", "b", "c", "d"];

        // Deterministic walk over many source/target combinations
        for round in 0..64usize {
            let source = names[round % names.len()];
            let target = names[(round * 7 + 3) % names.len()];
            let extra_source = names[(round / 4) % names.len()];
            let extra_target = format!("{}_x", names[(round * 3) % names.len()]);

            let mut update = pairs(&[(source, target)]);
            if extra_source != source {
                update.insert(extra_source.to_string(), extra_target);
            }

            store.update_mapping("peer", &update).unwrap();
            let mapping = store.get_mapping("peer").unwrap();
            assert_injective(&mapping);
            for (k, v) in &update {
                assert_eq!(mapping.get(k), Some(v));
            }
        }
    }

    #[test]
    fn test_peers_are_independent() {
        let store = store();
        store.update_mapping("peer1", &pairs(&[("proj", "local")])).unwrap();
        store.update_mapping("peer2", &pairs(&[("other", "local")])).unwrap();

        assert_eq!(store.get_mapping("peer1").unwrap(), pairs(&[("proj", "local")]));
        assert_eq!(store.get_mapping("peer2").unwrap(), pairs(&[("other", "local")]));
        assert!(store.get_mapping("peer3").unwrap().is_empty());
    }

    #[test]
    fn test_non_injective_update_rejected() {
        let store = store();
        let err = store
            .update_mapping("peer1", &pairs(&[("a", "same"), ("b", "same")]))
            .unwrap_err();
        assert!(matches!(err, NegotiationError::Validation(_)));
        assert!(store.get_mapping("peer1").unwrap().is_empty());
    }

    #[test]
    fn test_names_with_delimiters_persist() {
        let store = store();
        let update = pairs(&[("team:proj", "C:\\work\\proj")]);
        store.update_mapping("peer:1", &update).unwrap();
        assert_eq!(store.get_mapping("peer:1").unwrap(), update);
    }

    #[test]
    fn test_unreadable_history_is_replaced() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set(&storage_key("peer1"), "dangling\\").unwrap();
        let store = NameMappingStore::new(kv);

        assert!(store.get_mapping("peer1").is_err());
        store.update_mapping("peer1", &pairs(&[("proj", "p")])).unwrap();
        assert_eq!(store.get_mapping("peer1").unwrap(), pairs(&[("proj", "p")]));
    }

    #[test]
    fn test_concurrent_updates_keep_injectivity() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for j in 0..25 {
                        let source = format!("src{}", (i + j) % 5);
                        let target = format!("dst{}", j % 3);
                        let update = pairs(&[(source.as_str(), target.as_str())]);
                        store.update_mapping("shared", &update).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_injective(&store.get_mapping("shared").unwrap());
    }
}
