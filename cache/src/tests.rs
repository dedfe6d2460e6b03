// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Tests shared by all cache backends and tests for the facade.

use crate::testutils::*;
use crate::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Prefix for keys used by the backend tests, as they may run against a shared server.
const PREFIX: &str = "bedrock-cache-test";

/// Builds a key unique to `test`.
fn key(test: &str, name: &str) -> String {
    format!("{}:{}:{}", PREFIX, test, name)
}

async fn test_get_set_delete<S: CacheStore>(store: S) {
    let k = key("get_set_delete", "k");
    store.delete(&k).await.unwrap();

    assert_eq!(CacheError::Miss, store.get(&k).await.unwrap_err());
    store.set(&k, "first", Duration::from_secs(60)).await.unwrap();
    assert_eq!("first", store.get(&k).await.unwrap());
    store.set(&k, "second", Duration::from_secs(60)).await.unwrap();
    assert_eq!("second", store.get(&k).await.unwrap());

    store.delete(&k).await.unwrap();
    assert_eq!(CacheError::Miss, store.get(&k).await.unwrap_err());
    store.delete(&k).await.unwrap();
}

async fn test_ttl<S: CacheStore>(store: S) {
    let expiring = key("ttl", "expiring");
    let permanent = key("ttl", "permanent");
    let missing = key("ttl", "missing");
    store.delete(&missing).await.unwrap();

    store.set(&expiring, "v", Duration::from_secs(60)).await.unwrap();
    store.set(&permanent, "v", Duration::ZERO).await.unwrap();

    let ttl = store.ttl(&expiring).await.unwrap().unwrap();
    assert!(ttl > Duration::from_secs(50) && ttl <= Duration::from_secs(60), "Got {:?}", ttl);
    assert_eq!(None, store.ttl(&permanent).await.unwrap());
    assert_eq!(CacheError::Miss, store.ttl(&missing).await.unwrap_err());

    store.delete(&expiring).await.unwrap();
    store.delete(&permanent).await.unwrap();
}

async fn test_clear<S: CacheStore>(store: S) {
    let k1 = key("clear", "1");
    let k2 = key("clear", "2");
    store.set(&k1, "v", Duration::from_secs(60)).await.unwrap();
    store.set(&k2, "v", Duration::from_secs(60)).await.unwrap();

    store.clear().await.unwrap();
    assert_eq!(CacheError::Miss, store.get(&k1).await.unwrap_err());
    assert_eq!(CacheError::Miss, store.get(&k2).await.unwrap_err());
}

/// Instantiates the backend tests for the store returned by `setup`.
macro_rules! generate_store_tests [
    ( $setup:expr $(, #[$extra:meta])? $(,)? ) => {
        bedrock_core::db::testutils::generate_tests!(
            $( #[$extra], )?
            $setup,
            $crate::tests,
            test_get_set_delete,
            test_ttl,
            test_clear
        );
    }
];

mod memory {
    generate_store_tests!(crate::MemoryStore::default());
}

mod redis {
    use bedrock_core::config::RedisSettings;

    /// Environment variable with the host of a scratch Redis server for tests.
    const REDIS_TEST_HOST: &str = "REDIS_TEST_HOST";

    async fn setup() -> crate::RedisStore {
        let _can_fail = env_logger::builder().is_test(true).try_init();
        let host = std::env::var(REDIS_TEST_HOST).unwrap_or_else(|_| "127.0.0.1".to_owned());
        let settings = RedisSettings { host, db: 15, ..Default::default() };
        crate::RedisStore::connect(&settings).await.unwrap()
    }

    generate_store_tests!(
        setup().await,
        #[ignore = "Requires environment configuration and is expensive"]
    );
}

mod chain {
    use super::*;

    generate_store_tests!({
        let tiers: Vec<Arc<dyn CacheStore + Send + Sync>> =
            vec![Arc::new(MemoryStore::default()), Arc::new(MemoryStore::default())];
        ChainStore::new(tiers, Duration::from_secs(300)).unwrap()
    });
}

#[tokio::test(start_paused = true)]
async fn test_cache_zero_ttl_uses_default() {
    let store = MemoryStore::default();
    let cache = Cache::new(Arc::new(store.clone()), Duration::from_secs(300));

    cache.set("k", "v", Duration::ZERO).await.unwrap();
    assert_eq!(Some(Duration::from_secs(300)), store.ttl("k").await.unwrap());

    cache.set("k", "v", Duration::from_secs(10)).await.unwrap();
    assert_eq!(Some(Duration::from_secs(10)), store.ttl("k").await.unwrap());
}

#[tokio::test]
async fn test_cache_has() {
    let cache = memory_cache(Duration::from_secs(300));
    assert!(!cache.has("k").await);
    cache.set("k", "v", Duration::ZERO).await.unwrap();
    assert!(cache.has("k").await);
    cache.delete("k").await.unwrap();
    assert!(!cache.has("k").await);

    let broken = Cache::new(Arc::new(BrokenStore::default()), Duration::from_secs(300));
    assert!(!broken.has("k").await);
}

#[tokio::test]
async fn test_remember_computes_once() {
    let cache = memory_cache(Duration::from_secs(300));
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        let value = cache
            .remember("k", Duration::from_secs(60), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<String, String>("computed".to_owned())
            })
            .await
            .unwrap();
        assert_eq!("computed", value);
    }
    assert_eq!(1, calls.load(Ordering::SeqCst));
    assert_eq!("computed", cache.get("k").await.unwrap());
}

#[tokio::test]
async fn test_remember_propagates_compute_error() {
    let cache = memory_cache(Duration::from_secs(300));

    let err = cache
        .remember("k", Duration::from_secs(60), || async { Err::<String, _>("boom".to_owned()) })
        .await
        .unwrap_err();
    assert_eq!("boom", err);
    assert_eq!(CacheError::Miss, cache.get("k").await.unwrap_err());

    let value = cache
        .remember("k", Duration::from_secs(60), || async { Ok::<_, String>("later".to_owned()) })
        .await
        .unwrap();
    assert_eq!("later", value);
}

#[tokio::test]
async fn test_remember_survives_broken_backend() {
    let store = Arc::new(BrokenStore::default());
    let cache = Cache::new(store.clone(), Duration::from_secs(300));
    let calls = AtomicUsize::new(0);

    for _ in 0..2 {
        let value = cache
            .remember("k", Duration::ZERO, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<String, String>("fresh".to_owned())
            })
            .await
            .unwrap();
        assert_eq!("fresh", value);
    }
    assert_eq!(2, calls.load(Ordering::SeqCst));
    assert_eq!(vec!["k".to_owned(), "k".to_owned()], *store.set_calls.lock().unwrap());
}

#[tokio::test]
async fn test_cache_clear() {
    let cache = memory_cache(Duration::from_secs(300));
    cache.set("a", "1", Duration::ZERO).await.unwrap();
    cache.set("b", "2", Duration::ZERO).await.unwrap();
    cache.clear().await.unwrap();
    assert!(!cache.has("a").await);
    assert!(!cache.has("b").await);
}

#[tokio::test]
async fn test_connect_memory() {
    let settings = CacheSettings::default();
    let cache = connect(&settings, &RedisSettings::default()).await.unwrap();
    cache.set("k", "v", Duration::ZERO).await.unwrap();
    assert_eq!("v", cache.get("k").await.unwrap());
}

#[tokio::test]
async fn test_connect_zero_ttl() {
    let settings = CacheSettings { ttl: 0, ..Default::default() };
    match connect(&settings, &RedisSettings::default()).await {
        Err(CacheError::ConfigError(e)) => assert!(e.contains("ttl")),
        Err(e) => panic!("{:?}", e),
        Ok(_) => panic!("Zero TTL accepted"),
    }
}
