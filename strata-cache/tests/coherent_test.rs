//! Integration tests for coherent storage

mod common;

use common::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use strata_cache::*;

type Memory = MemoryStorage<String, String>;

fn two_tier() -> (
    Arc<Memory>,
    Arc<Memory>,
    CoherentStorage<String, String, Memory, Memory>,
) {
    init_logging();
    let cache = Arc::new(MemoryStorage::new());
    let source = Arc::new(MemoryStorage::new());
    let store = CoherentStorage::new(cache.clone(), source.clone());
    (cache, source, store)
}

fn s(v: &str) -> String {
    v.to_string()
}

#[tokio::test]
async fn test_basic_operations() {
    let (_, _, store) = two_tier();
    let ctx = CallContext::background();
    let key = s("key");

    store
        .set(&ctx, &key, s("value"), Duration::from_millis(150))
        .await
        .unwrap();
    assert_eq!(store.get(&ctx, &key, LONG).await.unwrap(), Some(s("value")));

    store.del(&ctx, &key, LONG).await.unwrap();
    assert_eq!(store.get(&ctx, &key, LONG).await.unwrap(), None);
}

#[tokio::test]
async fn test_never_written_key_is_absent() {
    let (cache, source, store) = two_tier();
    let ctx = CallContext::background();

    for i in 0..20 {
        let key = format!("missing:{}", i);
        assert_eq!(store.get(&ctx, &key, T).await.unwrap(), None);
    }

    // Source misses never write to the cache.
    assert!(cache.is_empty());
    assert!(source.is_empty());
}

#[tokio::test]
async fn test_scenario_set_del_and_source_only_key() {
    let (cache, source, store) = two_tier();
    let ctx = CallContext::background();

    store.set(&ctx, &s("k"), s("v"), T).await.unwrap();
    assert_eq!(store.get(&ctx, &s("k"), T).await.unwrap(), Some(s("v")));

    store.del(&ctx, &s("k"), T).await.unwrap();
    assert_eq!(store.get(&ctx, &s("k"), T).await.unwrap(), None);

    source.set(&ctx, &s("k2"), s("v2"), T).await.unwrap();
    assert_eq!(store.get(&ctx, &s("k2"), T).await.unwrap(), Some(s("v2")));
    assert_eq!(cache.get(&ctx, &s("k2"), T).await.unwrap(), Some(s("v2")));
}

#[tokio::test]
async fn test_cache_miss_populates_cache() {
    let (cache, source, store) = two_tier();
    let ctx = CallContext::background();
    let key = s("cache_miss_key");

    source.set(&ctx, &key, s("cache_miss_value"), T).await.unwrap();
    source.reset_stats();

    assert_eq!(
        store.get(&ctx, &key, LONG).await.unwrap(),
        Some(s("cache_miss_value"))
    );
    assert_eq!(source.stats().gets, 1);
    assert_eq!(cache.len(), 1);

    // Served from the cache without touching the source.
    assert_eq!(
        store.get(&ctx, &key, LONG).await.unwrap(),
        Some(s("cache_miss_value"))
    );
    assert_eq!(source.stats().gets, 1);
    assert_eq!(cache.stats().hits, 1);
}

#[tokio::test]
async fn test_set_writes_both_tiers() {
    let (cache, source, store) = two_tier();
    let ctx = CallContext::background();

    store.set(&ctx, &s("a"), s("1"), T).await.unwrap();
    assert_eq!(source.get(&ctx, &s("a"), T).await.unwrap(), Some(s("1")));
    assert_eq!(cache.get(&ctx, &s("a"), T).await.unwrap(), Some(s("1")));

    store.del(&ctx, &s("a"), T).await.unwrap();
    assert!(source.is_empty());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_expired_context_fails_without_touching_tiers() {
    let (cache, source, store) = two_tier();
    let ctx = CallContext::background().with_timeout(Duration::from_nanos(1));
    tokio::time::sleep(Duration::from_millis(2)).await;

    let err = store.get(&ctx, &s("timeout_key"), T).await.unwrap_err();
    assert!(matches!(err, CacheError::DeadlineExceeded));

    let err = store.set(&ctx, &s("timeout_key"), s("v"), T).await.unwrap_err();
    assert!(matches!(err, CacheError::DeadlineExceeded));

    assert_eq!(cache.stats().gets, 0);
    assert_eq!(source.stats().gets, 0);
    assert!(cache.is_empty());
    assert!(source.is_empty());
}

#[tokio::test]
async fn test_cancelled_context() {
    let (_, _, store) = two_tier();
    let (ctx, handle) = CallContext::background().with_cancel();
    handle.cancel();

    let err = store.del(&ctx, &s("k"), T).await.unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_set_within_outer_deadline() {
    let (_, _, store) = two_tier();
    let ctx = CallContext::background().with_timeout(Duration::from_millis(50));

    store
        .set(&ctx, &s("timeout_key"), s("timeout_value"), T)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_lock_operations() {
    let (_, _, store) = two_tier();
    let store = Arc::new(store);
    let key = s("lock_key");

    let guard = store.lock(&key).await;

    let (tx, mut rx) = tokio::sync::oneshot::channel();
    {
        let store = store.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let guard = store.lock(&key).await;
            let _ = tx.send(());
            store.unlock(guard);
        });
    }

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(rx.try_recv().is_err(), "lock acquired while held");

    store.unlock(guard);
    tokio::time::timeout(Duration::from_millis(100), rx)
        .await
        .expect("lock should be acquired after unlock")
        .unwrap();
}

#[tokio::test]
async fn test_own_lock_table_is_independent_of_tiers() {
    let (cache, source, store) = two_tier();
    let key = s("k");

    let _own = store.lock(&key).await;
    assert!(cache.lock_table().try_lock(&key).is_some());
    assert!(source.lock_table().try_lock(&key).is_some());
}

#[tokio::test]
async fn test_lock_wait_is_bounded_by_deadline() {
    let (_, source, store) = two_tier();
    let ctx = CallContext::background();
    source.set(&ctx, &s("cold"), s("v"), T).await.unwrap();

    let held = store.lock(&s("cold")).await;
    let err = store
        .get(&ctx, &s("cold"), Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::DeadlineExceeded));

    drop(held);
    assert_eq!(store.get(&ctx, &s("cold"), T).await.unwrap(), Some(s("v")));
}

#[tokio::test]
async fn test_cache_lock_timeout_after_source_write_is_logged() {
    let logs = CapturedLogs::default();
    let _subscriber = logs.set_default();
    let (cache, source, store) = two_tier();
    let ctx = CallContext::background();

    let held = cache.lock(&s("k")).await;
    let err = store
        .set(&ctx, &s("k"), s("v"), Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::DeadlineExceeded));

    // The source kept the write; the cache never saw it.
    assert_eq!(source.get(&ctx, &s("k"), T).await.unwrap(), Some(s("v")));
    assert!(cache.is_empty());
    assert!(logs.contents().contains("Source updated but cache update failed"));

    drop(held);
}

#[tokio::test]
async fn test_timeout_delegates_to_cache() {
    let cache = Arc::new(MemoryStorage::<String, String>::with_config(
        MemoryConfig::new().with_default_timeout(Duration::from_millis(30)),
    ));
    let source = Arc::new(MemoryStorage::new());
    let store = CoherentStorage::new(cache.clone(), source.clone());
    assert_eq!(store.timeout(), Duration::from_millis(30));

    let store = CoherentStorage::with_config(
        cache,
        source,
        CoherentConfig::new().with_timeout_override(Duration::from_secs(2)),
    );
    assert_eq!(store.timeout(), Duration::from_secs(2));
}

#[tokio::test]
async fn test_populate_on_miss_disabled() {
    init_logging();
    let cache = Arc::new(MemoryStorage::<String, String>::new());
    let source = Arc::new(MemoryStorage::new());
    let store = CoherentStorage::with_config(
        cache.clone(),
        source.clone(),
        CoherentConfig::new().with_populate_on_miss(false),
    );
    let ctx = CallContext::background();

    source.set(&ctx, &s("k"), s("v"), T).await.unwrap();
    assert_eq!(store.get(&ctx, &s("k"), T).await.unwrap(), Some(s("v")));
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_invalidate_write_policy() {
    init_logging();
    let cache = Arc::new(MemoryStorage::<String, String>::new());
    let source = Arc::new(MemoryStorage::new());
    let store = CoherentStorage::with_config(
        cache.clone(),
        source.clone(),
        CoherentConfig::new().with_write_policy(WritePolicy::Invalidate),
    );
    let ctx = CallContext::background();

    cache.set(&ctx, &s("k"), s("stale"), T).await.unwrap();
    store.set(&ctx, &s("k"), s("fresh"), T).await.unwrap();

    assert!(cache.is_empty());
    assert_eq!(source.get(&ctx, &s("k"), T).await.unwrap(), Some(s("fresh")));

    // The next read repopulates the cache.
    assert_eq!(store.get(&ctx, &s("k"), T).await.unwrap(), Some(s("fresh")));
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_json_values() {
    init_logging();
    let cache = Arc::new(MemoryStorage::<u64, serde_json::Value>::new());
    let source = Arc::new(MemoryStorage::new());
    let store = CoherentStorage::new(cache, source);
    let ctx = CallContext::background();

    let user = serde_json::json!({"id": 1, "name": "Alice", "roles": ["admin"]});
    store.set(&ctx, &1, user.clone(), T).await.unwrap();
    assert_eq!(store.get(&ctx, &1, T).await.unwrap(), Some(user));
}

#[tokio::test]
async fn test_batch_operations_through_coherent_store() {
    let (cache, source, store) = two_tier();
    let ctx = CallContext::background();

    let items: Vec<(String, String)> = (0..10)
        .map(|i| (format!("user:{}", i), format!("name-{}", i)))
        .collect();
    store.set_many(&ctx, &items, T).await.unwrap();
    assert_eq!(cache.len(), 10);
    assert_eq!(source.len(), 10);

    let keys = vec![s("user:3"), s("user:42")];
    assert_eq!(
        store.get_many(&ctx, &keys, T).await.unwrap(),
        vec![Some(s("name-3")), None]
    );

    store.del_many(&ctx, &keys, T).await.unwrap();
    assert_eq!(source.len(), 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_operations_on_distinct_keys() {
    let (_, _, store) = two_tier();
    let store = Arc::new(store);

    let mut handles = Vec::new();
    for id in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let ctx = CallContext::background();
            let key = format!("concurrent_key_{}", id);
            for j in 0..100 {
                let value = format!("{}", id * 100 + j);
                store.set(&ctx, &key, value.clone(), T).await.unwrap();
                let got = store.get(&ctx, &key, T).await.unwrap();
                assert_eq!(got, Some(value));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_key_concurrent_writes_leave_one_value() {
    let (_, _, store) = two_tier();
    let store = Arc::new(store);
    let key = s("same_key");

    let mut handles = Vec::new();
    for writer in 0..5 {
        let store = store.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            store
                .set(&CallContext::background(), &key, format!("{}", writer * 100), T)
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let written: HashSet<String> = (0..5).map(|w| format!("{}", w * 100)).collect();
    let value = store
        .get(&CallContext::background(), &key, T)
        .await
        .unwrap()
        .expect("a value should be stored");
    assert!(written.contains(&value), "unexpected value {}", value);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stress_mixed_operations() {
    let (_, _, store) = two_tier();
    let store = Arc::new(store);

    let mut handles = Vec::new();
    for key_id in 0..50 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let ctx = CallContext::background();
            let key = format!("stress_key_{}", key_id);
            for j in 0..300 {
                match j % 3 {
                    0 => store.set(&ctx, &key, format!("{}", j), LONG).await.unwrap(),
                    1 => {
                        store.get(&ctx, &key, LONG).await.unwrap();
                    }
                    _ => store.del(&ctx, &key, LONG).await.unwrap(),
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}
