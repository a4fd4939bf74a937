use std::{any::Any, future::Future, sync::Arc, time::Duration};

use moka::future::Cache;
use serde::Serialize;
use strum_macros::Display;

use super::config::CacheConfig;

type CachedValue = Arc<dyn Any + Send + Sync>;

/// Freshness bucket a read query belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CacheClass {
    Health,
    Data,
    Metrics,
}

/// TTL cache placed in front of read queries.
///
/// Entries are keyed by query name, result type and bound parameters. Only successful
/// results are stored, and concurrent misses on the same key share one load.
#[derive(Clone)]
pub struct QueryCache {
    health: Option<Cache<String, CachedValue>>,
    data: Option<Cache<String, CachedValue>>,
    metrics: Option<Cache<String, CachedValue>>,
}

impl QueryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            health: build_cache(config.health_ttl, config.max_entries),
            data: build_cache(config.data_ttl, config.max_entries),
            metrics: build_cache(config.metrics_ttl, config.max_entries),
        }
    }

    /// A cache that always runs the loader.
    pub fn disabled() -> Self {
        Self {
            health: None,
            data: None,
            metrics: None,
        }
    }

    fn bucket(&self, class: CacheClass) -> Option<&Cache<String, CachedValue>> {
        match class {
            CacheClass::Health => self.health.as_ref(),
            CacheClass::Data => self.data.as_ref(),
            CacheClass::Metrics => self.metrics.as_ref(),
        }
    }

    pub async fn cached<T, E, P, F, Fut>(
        &self,
        class: CacheClass,
        query: &str,
        params: &P,
        loader: F,
    ) -> Result<T, Arc<E>>
    where
        T: Clone + Send + Sync + 'static,
        E: Send + Sync + 'static,
        P: Serialize + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(cache) = self.bucket(class) else {
            return loader().await.map_err(Arc::new);
        };

        let key = match serde_json::to_string(params) {
            Ok(params) => format!("{query}|{}|{params}", std::any::type_name::<T>()),
            Err(err) => {
                tracing::warn!(query, error = %err, "uncacheable query parameters");
                return loader().await.map_err(Arc::new);
            }
        };

        let value = cache
            .try_get_with(key, async move {
                let value = loader().await?;
                Ok::<CachedValue, E>(Arc::new(value))
            })
            .await?;

        match value.downcast_ref::<T>() {
            Some(value) => Ok(value.clone()),
            None => unreachable!("query cache key includes the value type"),
        }
    }

    pub fn entry_count(&self, class: CacheClass) -> u64 {
        self.bucket(class).map(Cache::entry_count).unwrap_or(0)
    }
}

fn build_cache(ttl: Duration, max_entries: u64) -> Option<Cache<String, CachedValue>> {
    if ttl.is_zero() {
        return None;
    }
    Some(
        Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    fn short_lived(ttl: Duration) -> QueryCache {
        QueryCache::new(&CacheConfig {
            health_ttl: ttl,
            data_ttl: ttl,
            metrics_ttl: ttl,
            max_entries: 100,
        })
    }

    async fn load(cache: &QueryCache, calls: &AtomicUsize, params: serde_json::Value) -> u64 {
        cache
            .cached(CacheClass::Data, "recent_runs", &params, || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) as u64;
                Ok::<_, String>(n)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn hit_does_not_invoke_loader() {
        let cache = short_lived(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        assert_eq!(load(&cache, &calls, json!({ "limit": 50 })).await, 0);
        assert_eq!(load(&cache, &calls, json!({ "limit": 50 })).await, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // different parameters are a different entry
        assert_eq!(load(&cache, &calls, json!({ "limit": 10 })).await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_entry_reloads() {
        let cache = short_lived(Duration::from_millis(100));
        let calls = AtomicUsize::new(0);

        load(&cache, &calls, json!({})).await;
        tokio::time::sleep(Duration::from_millis(250)).await;
        load(&cache, &calls, json!({})).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = short_lived(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let first: Result<u64, Arc<String>> = cache
            .cached(CacheClass::Health, "ping", &(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("connection refused".to_string())
            })
            .await;
        assert_eq!(first.unwrap_err().as_str(), "connection refused");

        let second = cache
            .cached(CacheClass::Health, "ping", &(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<u64, String>(7)
            })
            .await
            .unwrap();
        assert_eq!(second, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_load() {
        let cache = short_lived(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        let run = |cache: QueryCache, calls: Arc<AtomicUsize>| async move {
            cache
                .cached(CacheClass::Metrics, "table_status", &["FE_DMV_ALL"], || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, String>(vec![1u8, 2, 3])
                })
                .await
                .unwrap()
        };

        let (a, b) = tokio::join!(
            run(cache.clone(), calls.clone()),
            run(cache.clone(), calls.clone())
        );
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_cache_always_loads() {
        let cache = QueryCache::disabled();
        let calls = AtomicUsize::new(0);

        load(&cache, &calls, json!({})).await;
        load(&cache, &calls, json!({})).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.entry_count(CacheClass::Data), 0);
    }
}
