//! Static entity cache.
//!
//! Instances, node capabilities and dependencies change rarely. The
//! orchestrator bumps a `{kind}:last_update` marker whenever one of them
//! changes, so a refresh reads that single key and only re-lists the
//! namespace when the marker differs from the one cached with the data.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use edgescope_core::config::{KeysConfig, StaticKeyConfig};
use edgescope_core::keys::is_marker_key;
use edgescope_core::{EntityKey, StaticKind};
use edgescope_store::ProxyStore;

use crate::error::FetchError;

/// The last loaded snapshot of one kind. Marker and data are only ever
/// replaced together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheEntry {
    /// Marker value the data was loaded under; `None` if the store had none.
    pub marker: Option<String>,
    /// Raw values keyed by store key.
    pub data: BTreeMap<EntityKey, String>,
}

/// Result of a single [`StaticEntityCache::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Marker unchanged; nothing listed or fetched.
    Unchanged,
    /// Namespace re-listed and the entry replaced.
    Replaced { entities: usize, omitted: usize },
}

#[derive(Debug, Default)]
pub struct StaticEntityCache {
    entries: HashMap<StaticKind, CacheEntry>,
}

impl StaticEntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: StaticKind) -> Option<&CacheEntry> {
        self.entries.get(&kind)
    }

    /// Cached raw values of `kind`, empty if never loaded.
    pub fn data(&self, kind: StaticKind) -> impl Iterator<Item = (&EntityKey, &String)> {
        self.entries.get(&kind).into_iter().flat_map(|e| e.data.iter())
    }

    /// Refresh one kind if its marker moved.
    ///
    /// The first refresh of a kind always loads. A marker or listing failure
    /// leaves the previous entry untouched; a failure on a single key omits
    /// that key from the new entry.
    pub fn refresh<S: ProxyStore + ?Sized>(
        &mut self,
        store: &mut S,
        kind: StaticKind,
        keys: &StaticKeyConfig,
    ) -> Result<RefreshOutcome, FetchError> {
        let marker = store.get(&keys.marker).map_err(|source| FetchError::Marker {
            key: keys.marker.clone(),
            source,
        })?;

        if let Some(entry) = self.entries.get(&kind) {
            if entry.marker == marker {
                debug!(%kind, marker = ?marker, "marker unchanged, skipping refresh");
                return Ok(RefreshOutcome::Unchanged);
            }
        }

        let listed = store
            .keys_matching(&keys.pattern)
            .map_err(|source| FetchError::Listing {
                pattern: keys.pattern.clone(),
                source,
            })?;

        let mut data = BTreeMap::new();
        let mut omitted = 0;
        for key in listed.into_iter().filter(|k| !is_marker_key(k)) {
            match store.get(&key) {
                Ok(Some(value)) => {
                    data.insert(key, value);
                }
                Ok(None) => {
                    debug!(%kind, %key, "key vanished between listing and read");
                    omitted += 1;
                }
                Err(e) => {
                    warn!(%kind, %key, error = %e, "failed to read static entity");
                    omitted += 1;
                }
            }
        }

        let entities = data.len();
        debug!(%kind, marker = ?marker, entities, omitted, "static entities reloaded");
        self.entries.insert(kind, CacheEntry { marker, data });
        Ok(RefreshOutcome::Replaced { entities, omitted })
    }

    /// Refresh every static kind. Failures are logged per kind.
    pub fn refresh_all<S: ProxyStore + ?Sized>(&mut self, store: &mut S, keys: &KeysConfig) {
        for kind in StaticKind::ALL {
            if let Err(e) = self.refresh(store, kind, keys.static_kind(kind)) {
                warn!(%kind, error = %e, "static refresh aborted, keeping previous snapshot");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgescope_store::MemoryStore;

    fn instance_keys() -> StaticKeyConfig {
        KeysConfig::default().instance
    }

    #[test]
    fn first_refresh_loads_without_marker() {
        let mut store = MemoryStore::new();
        store.put("instance:a", "{}");
        let mut cache = StaticEntityCache::new();

        let outcome = cache.refresh(&mut store, StaticKind::Instance, &instance_keys()).unwrap();
        assert_eq!(outcome, RefreshOutcome::Replaced { entities: 1, omitted: 0 });
        assert_eq!(cache.get(StaticKind::Instance).unwrap().marker, None);

        // Still no marker: nothing changed.
        let outcome = cache.refresh(&mut store, StaticKind::Instance, &instance_keys()).unwrap();
        assert_eq!(outcome, RefreshOutcome::Unchanged);
    }

    #[test]
    fn marker_key_is_excluded_from_data() {
        let mut store = MemoryStore::new();
        store.put("instance:last_update", "v1");
        store.put("instance:a", "{}");
        let mut cache = StaticEntityCache::new();
        cache.refresh(&mut store, StaticKind::Instance, &instance_keys()).unwrap();

        let entry = cache.get(StaticKind::Instance).unwrap();
        assert_eq!(entry.marker.as_deref(), Some("v1"));
        assert_eq!(entry.data.keys().collect::<Vec<_>>(), vec!["instance:a"]);
    }

    #[test]
    fn changed_marker_replaces_with_empty_mapping() {
        let mut store = MemoryStore::new();
        store.put("instance:last_update", "v1");
        store.put("instance:a", "{}");
        let mut cache = StaticEntityCache::new();
        cache.refresh(&mut store, StaticKind::Instance, &instance_keys()).unwrap();

        store.remove("instance:a");
        store.put("instance:last_update", "v2");
        let outcome = cache.refresh(&mut store, StaticKind::Instance, &instance_keys()).unwrap();
        assert_eq!(outcome, RefreshOutcome::Replaced { entities: 0, omitted: 0 });
        let entry = cache.get(StaticKind::Instance).unwrap();
        assert!(entry.data.is_empty());
        assert_eq!(entry.marker.as_deref(), Some("v2"));
    }

    #[test]
    fn failing_key_is_omitted() {
        let mut store = MemoryStore::new();
        store.put("instance:last_update", "v1");
        store.put("instance:a", "{}");
        store.put("instance:b", "{}");
        store.fail_key("instance:b");
        let mut cache = StaticEntityCache::new();

        let outcome = cache.refresh(&mut store, StaticKind::Instance, &instance_keys()).unwrap();
        assert_eq!(outcome, RefreshOutcome::Replaced { entities: 1, omitted: 1 });
        assert!(cache.get(StaticKind::Instance).unwrap().data.contains_key("instance:a"));
    }

    #[test]
    fn marker_failure_keeps_previous_snapshot() {
        let mut store = MemoryStore::new();
        store.put("instance:last_update", "v1");
        store.put("instance:a", "{}");
        let mut cache = StaticEntityCache::new();
        cache.refresh(&mut store, StaticKind::Instance, &instance_keys()).unwrap();
        let before = cache.get(StaticKind::Instance).cloned();

        store.put("instance:last_update", "v2");
        store.fail_key("instance:last_update");
        let err = cache.refresh(&mut store, StaticKind::Instance, &instance_keys()).unwrap_err();
        assert!(matches!(err, FetchError::Marker { .. }));
        assert_eq!(cache.get(StaticKind::Instance).cloned(), before);
    }

    #[test]
    fn kinds_are_cached_independently() {
        let mut store = MemoryStore::new();
        store.put("instance:a", "{}");
        store.put("dependency:d", "{}");
        store.put("node:capabilities:n", "{}");
        let mut cache = StaticEntityCache::new();
        cache.refresh_all(&mut store, &KeysConfig::default());

        assert_eq!(cache.data(StaticKind::Instance).count(), 1);
        assert_eq!(cache.data(StaticKind::Dependency).count(), 1);
        assert_eq!(cache.data(StaticKind::NodeCapabilities).count(), 1);
    }
}
