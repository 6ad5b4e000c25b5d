//! Cache-aside decorator over a result store.
//!
//! Only successful resolutions are stored; an errored URL is re-attempted
//! on the next request. Store failures degrade to a miss and are never
//! surfaced to the caller.

use crate::metrics_defs::{RESULT_CACHE_ERROR, RESULT_CACHE_HIT, RESULT_CACHE_MISS};
use crate::{Outcome, Resolution, Resolver};
use async_trait::async_trait;
use moka::sync::Cache;
use shared::counter;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("result store unavailable: {0}")]
    Unavailable(String),
}

/// Key/value store holding successful resolutions under their canonical key.
#[async_trait]
pub trait ResultStore: Send + Sync {
    fn name(&self) -> &'static str;
    async fn get(&self, key: &str) -> Result<Option<Resolution>, StoreError>;
    async fn set(&self, key: &str, value: Resolution) -> Result<(), StoreError>;
}

/// In-process store with bounded capacity and a fixed TTL. Expired entries
/// surface as misses on the next lookup; there is no eviction sweep.
pub struct MokaStore {
    cache: Cache<String, Resolution>,
}

impl MokaStore {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        MokaStore { cache }
    }
}

#[async_trait]
impl ResultStore for MokaStore {
    fn name(&self) -> &'static str {
        "moka"
    }

    async fn get(&self, key: &str) -> Result<Option<Resolution>, StoreError> {
        Ok(self.cache.get(key))
    }

    async fn set(&self, key: &str, value: Resolution) -> Result<(), StoreError> {
        self.cache.insert(key.to_string(), value);
        Ok(())
    }
}

/// Resolver decorator that consults the store before delegating.
pub struct CachedResolver {
    inner: Arc<dyn Resolver>,
    store: Arc<dyn ResultStore>,
}

impl CachedResolver {
    pub fn new(inner: Arc<dyn Resolver>, store: Arc<dyn ResultStore>) -> Self {
        CachedResolver { inner, store }
    }
}

#[async_trait]
impl Resolver for CachedResolver {
    async fn resolve(&self, url: &str) -> Outcome {
        match self.store.get(url).await {
            Ok(Some(hit)) => {
                counter!(RESULT_CACHE_HIT).increment(1);
                tracing::debug!(store = self.store.name(), key = url, "result cache hit");
                return Ok(hit);
            }
            Ok(None) => {
                counter!(RESULT_CACHE_MISS).increment(1);
            }
            Err(err) => {
                counter!(RESULT_CACHE_ERROR).increment(1);
                tracing::warn!(store = self.store.name(), error = %err, "result store get failed, treating as miss");
            }
        }

        let outcome = self.inner.resolve(url).await;

        if let Ok(resolution) = &outcome {
            if let Err(err) = self.store.set(url, resolution.clone()).await {
                counter!(RESULT_CACHE_ERROR).increment(1);
                tracing::warn!(store = self.store.name(), error = %err, "result store set failed");
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::ScriptedResolver;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Store fake with a switch to make every operation fail.
    struct FakeStore {
        entries: Mutex<HashMap<String, Resolution>>,
        broken: bool,
    }

    impl FakeStore {
        fn new() -> Self {
            FakeStore {
                entries: Mutex::new(HashMap::new()),
                broken: false,
            }
        }

        fn broken() -> Self {
            FakeStore {
                entries: Mutex::new(HashMap::new()),
                broken: true,
            }
        }
    }

    #[async_trait]
    impl ResultStore for FakeStore {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn get(&self, key: &str) -> Result<Option<Resolution>, StoreError> {
            if self.broken {
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            Ok(self.entries.lock().get(key).cloned())
        }

        async fn set(&self, key: &str, value: Resolution) -> Result<(), StoreError> {
            if self.broken {
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            self.entries.lock().insert(key.to_string(), value);
            Ok(())
        }
    }

    #[tokio::test]
    async fn hit_skips_inner_resolver() {
        let inner = Arc::new(ScriptedResolver::titled("fresh"));
        let store = Arc::new(FakeStore::new());
        store
            .entries
            .lock()
            .insert("https://example.com/".into(), Resolution {
                title: "cached".into(),
                ..Resolution::default()
            });

        let cached = CachedResolver::new(inner.clone(), store);
        let result = cached.resolve("https://example.com/").await.unwrap();
        assert_eq!(result.title, "cached");
        assert_eq!(inner.calls(), 0);
    }

    #[tokio::test]
    async fn miss_resolves_and_stores() {
        let inner = Arc::new(ScriptedResolver::titled("fresh"));
        let store = Arc::new(FakeStore::new());
        let cached = CachedResolver::new(inner.clone(), store.clone());

        let first = cached.resolve("https://example.com/").await.unwrap();
        assert_eq!(first.title, "fresh");
        assert_eq!(inner.calls(), 1);

        // Second call is served from the store.
        let second = cached.resolve("https://example.com/").await.unwrap();
        assert_eq!(second, first);
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let inner = Arc::new(ScriptedResolver::failing("boom"));
        let store = Arc::new(FakeStore::new());
        let cached = CachedResolver::new(inner.clone(), store.clone());

        assert!(cached.resolve("https://example.com/").await.is_err());
        assert!(cached.resolve("https://example.com/").await.is_err());
        // Every call went upstream; nothing was stored.
        assert_eq!(inner.calls(), 2);
        assert!(store.entries.lock().is_empty());
    }

    #[tokio::test]
    async fn store_failure_degrades_to_miss() {
        let inner = Arc::new(ScriptedResolver::titled("fresh"));
        let cached = CachedResolver::new(inner.clone(), Arc::new(FakeStore::broken()));

        let result = cached.resolve("https://example.com/").await.unwrap();
        assert_eq!(result.title, "fresh");
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn moka_store_expires_lazily() {
        let store = MokaStore::new(16, Duration::from_millis(50));
        store
            .set("https://example.com/", Resolution {
                title: "t".into(),
                ..Resolution::default()
            })
            .await
            .unwrap();
        assert!(store.get("https://example.com/").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.get("https://example.com/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entry_resolves_again() {
        let inner = Arc::new(ScriptedResolver::titled("fresh"));
        let store = Arc::new(MokaStore::new(16, Duration::from_millis(50)));
        let cached = CachedResolver::new(inner.clone(), store);

        cached.resolve("https://example.com/").await.unwrap();
        assert_eq!(inner.calls(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        cached.resolve("https://example.com/").await.unwrap();
        assert_eq!(inner.calls(), 2);
    }
}
