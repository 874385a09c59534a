use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, OnceLock,
};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use moka::sync::Cache;
use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};

/// Settings for one cache tier, in the units the server configuration uses.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub name: String,
    pub cache_size_in_mb: u64,
    pub cache_expiry_in_mins: u64,
    pub log_stats_interval_in_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "vdb".to_string(),
            cache_size_in_mb: 16,
            cache_expiry_in_mins: 60,
            log_stats_interval_in_secs: 0,
        }
    }
}

/// The two-tier trie node cache settings: state trie and storage trie.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupCacheConfig {
    #[serde(default)]
    pub state_db: CacheConfig,
    #[serde(default)]
    pub storage: CacheConfig,
}

#[derive(Debug, Default)]
struct TierStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TierStats {
    fn snapshot(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

struct Tier {
    cache: Cache<String, Bytes>,
    stats: TierStats,
}

impl Tier {
    fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.cache_size_in_mb * 1024 * 1024)
            .weigher(|key: &String, value: &Bytes| (key.len() + value.len()) as u32)
            .time_to_live(Duration::from_secs(config.cache_expiry_in_mins * 60))
            .build();
        Self {
            cache,
            stats: TierStats::default(),
        }
    }

    /// Cache read with miss coalescing: concurrent misses for the same key
    /// run the loader once and share the result.
    fn get_or_load<F>(&self, key: &str, load: F) -> Result<Bytes>
    where
        F: FnOnce() -> Result<Bytes>,
    {
        if let Some(hit) = self.cache.get(key) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        self.cache
            .try_get_with(key.to_string(), load)
            .map_err(|shared: Arc<Error>| (*shared).clone())
    }
}

/// Process-wide two-tier trie node cache. Backends constructed with the same
/// group name share one instance; distinct names get isolated caches.
pub struct GroupCache {
    name: String,
    state: Tier,
    storage: Tier,
}

fn registry() -> &'static DashMap<String, Arc<GroupCache>> {
    static GROUPS: OnceLock<DashMap<String, Arc<GroupCache>>> = OnceLock::new();
    GROUPS.get_or_init(DashMap::new)
}

impl GroupCache {
    /// Returns the cache group for `config`, creating it on first use. The
    /// group is keyed by the state tier's name.
    pub fn group(config: &GroupCacheConfig) -> Arc<GroupCache> {
        let mut created = false;
        let group = registry()
            .entry(config.state_db.name.clone())
            .or_insert_with(|| {
                created = true;
                Arc::new(GroupCache {
                    name: config.state_db.name.clone(),
                    state: Tier::new(&config.state_db),
                    storage: Tier::new(&config.storage),
                })
            })
            .clone();
        if created && config.state_db.log_stats_interval_in_secs > 0 {
            group.spawn_stats_logger(Duration::from_secs(
                config.state_db.log_stats_interval_in_secs,
            ));
        }
        group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state_node<F>(&self, mh_key: &str, load: F) -> Result<Bytes>
    where
        F: FnOnce() -> Result<Bytes>,
    {
        self.state.get_or_load(mh_key, load)
    }

    pub fn storage_node<F>(&self, mh_key: &str, load: F) -> Result<Bytes>
    where
        F: FnOnce() -> Result<Bytes>,
    {
        self.storage.get_or_load(mh_key, load)
    }

    fn spawn_stats_logger(self: &Arc<Self>, interval: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let group = Arc::downgrade(self);
        handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(group) = group.upgrade() else { return };
                let (state_hits, state_misses) = group.state.stats.snapshot();
                let (storage_hits, storage_misses) = group.storage.stats.snapshot();
                info!(
                    group = %group.name,
                    state_hits,
                    state_misses,
                    state_bytes = group.state.cache.weighted_size(),
                    storage_hits,
                    storage_misses,
                    storage_bytes = group.storage.cache.weighted_size(),
                    "trie node cache stats",
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn config(name: &str) -> GroupCacheConfig {
        GroupCacheConfig {
            state_db: CacheConfig {
                name: name.to_string(),
                cache_size_in_mb: 1,
                cache_expiry_in_mins: 10,
                log_stats_interval_in_secs: 0,
            },
            storage: CacheConfig {
                name: format!("{name}-storage"),
                cache_size_in_mb: 1,
                cache_expiry_in_mins: 10,
                log_stats_interval_in_secs: 0,
            },
        }
    }

    #[test]
    fn same_group_name_shares_the_cache() {
        let a = GroupCache::group(&config("shared-group"));
        let b = GroupCache::group(&config("shared-group"));
        assert!(Arc::ptr_eq(&a, &b));

        let c = GroupCache::group(&config("other-group"));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn loader_runs_once_per_key() {
        let group = GroupCache::group(&config("loader-once"));
        let loads = AtomicUsize::new(0);
        let load = || {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from_static(b"node-bytes"))
        };

        let first = group.state_node("mh-key-1", load).unwrap();
        let second = group
            .state_node("mh-key-1", || panic!("must be served from cache"))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn load_errors_are_not_cached() {
        let group = GroupCache::group(&config("error-not-cached"));
        let err = group
            .storage_node("missing", || Err(Error::NotFound))
            .unwrap_err();
        assert!(err.is_not_found());

        let value = group
            .storage_node("missing", || Ok(Bytes::from_static(b"found later")))
            .unwrap();
        assert_eq!(value, Bytes::from_static(b"found later"));
    }
}
