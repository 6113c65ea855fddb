//! # Read Cache
//!
//! In-process TTL cache for expensive read paths (dashboard overview,
//! sales reports).
//!
//! ## Behavior
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      get_or_compute(key, ttl, f)                         │
//! │                                                                         │
//! │  cache disabled ────────────────► run f, return result, store nothing  │
//! │                                                                         │
//! │  fresh entry for key ───────────► return stored value (f not run)      │
//! │                                                                         │
//! │  missing or expired ────────────► run f                                 │
//! │        f succeeds ──────────────► store value with TTL, return it       │
//! │        f fails ─────────────────► surface error, store NOTHING          │
//! │                                   (a cached error would keep serving    │
//! │                                    the failure until its TTL)           │
//! │                                                                         │
//! │  Writers call invalidate()/invalidate_prefix() after mutations so the   │
//! │  next read recomputes against fresh data.                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::{SyncError, SyncResult};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// TTL read cache keyed by string.
///
/// Values are `serde_json::Value`: the cache sits in front of report-style
/// reads whose results cross the boundary as JSON anyway.
#[derive(Debug)]
pub struct CacheLayer {
    entries: DashMap<String, CacheEntry>,
    config: CacheConfig,
}

impl CacheLayer {
    /// Creates a cache from settings.
    pub fn new(config: CacheConfig) -> Self {
        CacheLayer {
            entries: DashMap::new(),
            config,
        }
    }

    /// Returns the cached value for `key`, or computes, stores and returns
    /// it. `ttl` of None uses the configured default.
    ///
    /// Compute failures are wrapped as `CacheCompute` and never stored.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> SyncResult<serde_json::Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<serde_json::Value>>,
    {
        if !self.config.enabled {
            return compute().await;
        }

        if let Some(entry) = self.entries.get(key) {
            if entry.is_fresh() {
                debug!(key = %key, "Cache hit");
                return Ok(entry.value.clone());
            }
        }

        debug!(key = %key, "Cache miss, computing");
        let value = compute().await.map_err(|e| SyncError::CacheCompute {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        let ttl = ttl.unwrap_or(Duration::from_secs(self.config.default_ttl_secs));
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.clone(),
                expires_at: Instant::now() + ttl,
            },
        );

        Ok(value)
    }

    /// Drops one key.
    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drops every key starting with `prefix`. Writers use this to clear a
    /// whole read family (e.g. all report windows) after a mutation.
    pub fn invalidate_prefix(&self, prefix: &str) {
        self.entries.retain(|key, _| !key.starts_with(prefix));
    }

    /// Drops everything.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Removes expired entries. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh());
        before - self.entries.len()
    }

    /// Current entry count (fresh and expired).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> CacheLayer {
        CacheLayer::new(CacheConfig {
            enabled: true,
            default_ttl_secs: 3600,
        })
    }

    #[tokio::test]
    async fn test_hit_skips_recompute() {
        let cache = cache();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_compute("report:2026-08", None, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(serde_json::json!({"total": 42}))
                })
                .await
                .unwrap();
            assert_eq!(value["total"], 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_recomputes() {
        let cache = cache();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            cache
                .get_or_compute("k", Some(Duration::ZERO), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(serde_json::json!(1))
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_are_never_cached() {
        let cache = cache();
        let calls = AtomicUsize::new(0);

        let err = cache
            .get_or_compute("k", None, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<serde_json::Value, _>(SyncError::Database("locked".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::CacheCompute { .. }));
        assert!(cache.is_empty());

        // The next read computes again and can succeed
        let value = cache
            .get_or_compute("k", None, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(serde_json::json!(7))
            })
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_cache_passes_through() {
        let cache = CacheLayer::new(CacheConfig {
            enabled: false,
            default_ttl_secs: 3600,
        });
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            cache
                .get_or_compute("k", None, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(serde_json::json!(1))
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_prefix() {
        let cache = cache();
        for key in ["report:a", "report:b", "overview"] {
            cache
                .get_or_compute(key, None, || async { Ok(serde_json::json!(1)) })
                .await
                .unwrap();
        }

        cache.invalidate_prefix("report:");
        assert_eq!(cache.len(), 1);

        cache.invalidate("overview");
        assert!(cache.is_empty());
    }
}
