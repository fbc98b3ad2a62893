//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 双层缓存集成测试

use async_trait::async_trait;
use common::{setup_logging, test_config, unique_namespace, CountingL2, SlowScanL2};
use fleetcache::backend::{namespaced_key, L2Backend, MemoryL2Backend};
use fleetcache::error::{CacheError, Result};
use fleetcache::metrics::GLOBAL_METRICS;
use fleetcache::serialization::{Serializer, SerializerEnum};
use fleetcache::{CacheExt, CacheOps, MemoryBus, TwoLevelClient};
use mockall::mock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[path = "../common/mod.rs"]
mod common;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct MovieDetail {
    id: u64,
    title: String,
}

fn movie(id: u64, title: &str) -> MovieDetail {
    MovieDetail {
        id,
        title: title.to_string(),
    }
}

mock! {
    pub Shared {}

    #[async_trait]
    impl L2Backend for Shared {
        async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>>;
        async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()>;
        async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;
        async fn delete_keys(&self, keys: &[String]) -> Result<()>;
        async fn ping(&self) -> Result<()>;
    }
}

fn client_with(namespace: &str, l2: Arc<dyn L2Backend>) -> TwoLevelClient {
    TwoLevelClient::new(namespace, &test_config(), l2, Arc::new(MemoryBus::new())).unwrap()
}

/// 写入后读取返回同一个值
#[tokio::test]
async fn test_set_then_get_round_trip() {
    setup_logging();
    let client = client_with(&unique_namespace("round_trip"), Arc::new(MemoryL2Backend::new()));

    client.set("movie-1", &movie(1, "Heat")).await.unwrap();
    let cached: Option<MovieDetail> = client.get("movie-1").await.unwrap();
    assert_eq!(cached, Some(movie(1, "Heat")));
}

/// 两层都不存在时返回 None 而不是错误
#[tokio::test]
async fn test_miss_in_both_tiers_returns_none() {
    let client = client_with(&unique_namespace("miss"), Arc::new(MemoryL2Backend::new()));
    let cached: Option<MovieDetail> = client.get("absent").await.unwrap();
    assert!(cached.is_none());
}

/// L1未命中时读取L2一次并回填，之后由L1直接返回
#[tokio::test]
async fn test_l2_hit_backfills_l1() {
    setup_logging();
    let namespace = unique_namespace("movies");
    let payload = SerializerEnum::default()
        .serialize(&movie(42, "Alien"))
        .unwrap();

    let expected_key = namespaced_key(&namespace, "movie-42");
    let mut shared = MockShared::new();
    shared
        .expect_get_bytes()
        .times(1)
        .returning(move |key| {
            assert_eq!(key, expected_key);
            Ok(Some(payload.clone()))
        });

    let client = client_with(&namespace, Arc::new(shared));

    let first: Option<MovieDetail> = client.get("movie-42").await.unwrap();
    assert_eq!(first, Some(movie(42, "Alien")));
    assert!(client.l1().get("movie-42").is_some());

    let second: Option<MovieDetail> = client.get("movie-42").await.unwrap();
    assert_eq!(second, Some(movie(42, "Alien")));

    assert_eq!(GLOBAL_METRICS.request_count(&namespace, "L2", "get", "hit"), 1);
    assert_eq!(GLOBAL_METRICS.request_count(&namespace, "L1", "get", "hit"), 1);
}

/// L1命中时不访问L2
#[tokio::test]
async fn test_l1_hit_skips_l2() {
    let shared = CountingL2::default();
    let client = client_with(&unique_namespace("l1_hit"), Arc::new(shared.clone()));

    client.set("k", &"v".to_string()).await.unwrap();
    assert_eq!(shared.sets(), 1);

    for _ in 0..3 {
        let value: Option<String> = client.get("k").await.unwrap();
        assert_eq!(value.as_deref(), Some("v"));
    }
    assert_eq!(shared.gets(), 0);
}

/// 写入完全替换同名条目，且两层都更新
#[tokio::test]
async fn test_set_overwrites_both_tiers() {
    let shared = MemoryL2Backend::new();
    let namespace = unique_namespace("overwrite");
    let client = client_with(&namespace, Arc::new(shared.clone()));

    client.set("movie-7", &movie(7, "Old")).await.unwrap();
    client.set("movie-7", &movie(7, "New")).await.unwrap();

    let cached: Option<MovieDetail> = client.get("movie-7").await.unwrap();
    assert_eq!(cached, Some(movie(7, "New")));

    let raw = shared
        .get_bytes(&namespaced_key(&namespace, "movie-7"))
        .await
        .unwrap()
        .unwrap();
    let stored: MovieDetail = SerializerEnum::default().deserialize(&raw).unwrap();
    assert_eq!(stored, movie(7, "New"));
}

/// 另一个实例写入的值可以通过共享层读到
#[tokio::test]
async fn test_value_written_by_other_instance_is_visible() {
    let shared = MemoryL2Backend::new();
    let namespace = unique_namespace("fleet");
    let writer = client_with(&namespace, Arc::new(shared.clone()));
    let reader = client_with(&namespace, Arc::new(shared.clone()));

    writer.set("movie-3", &movie(3, "Ran")).await.unwrap();
    assert!(reader.l1().get("movie-3").is_none());

    let cached: Option<MovieDetail> = reader.get("movie-3").await.unwrap();
    assert_eq!(cached, Some(movie(3, "Ran")));
}

/// L1条目过期后回退到L2
#[tokio::test]
async fn test_expired_l1_entry_falls_back_to_l2() {
    let shared = CountingL2::default();
    let client = client_with(&unique_namespace("expiry"), Arc::new(shared.clone()));

    client.set("k", &1u32).await.unwrap();
    client.l1().evict("k");

    let value: Option<u32> = client.get("k").await.unwrap();
    assert_eq!(value, Some(1));
    assert_eq!(shared.gets(), 1);
}

/// clear_all 只删除本命名空间的键
#[tokio::test]
async fn test_clear_all_is_scoped_to_namespace() {
    let shared = MemoryL2Backend::new();
    let movies_ns = unique_namespace("movies");
    let series_ns = unique_namespace("series");
    let movies = client_with(&movies_ns, Arc::new(shared.clone()));
    let series = client_with(&series_ns, Arc::new(shared.clone()));

    movies.set("a", &1u32).await.unwrap();
    movies.set("b", &2u32).await.unwrap();
    series.set("a", &3u32).await.unwrap();
    assert_eq!(shared.len(), 3);

    movies.clear_all().await.unwrap();

    assert_eq!(movies.l1().entry_count(), 0);
    assert_eq!(shared.len(), 1);
    let gone: Option<u32> = movies.get("a").await.unwrap();
    assert!(gone.is_none());
    let kept: Option<u32> = series.get("a").await.unwrap();
    assert_eq!(kept, Some(3));
}

/// clear_all 进行中的读取不会把旧值留在L1
#[tokio::test]
async fn test_read_during_clear_all_does_not_outlive_clear() {
    setup_logging();
    let shared = MemoryL2Backend::new();
    let client = Arc::new(client_with(
        &unique_namespace("clear_race"),
        Arc::new(SlowScanL2::new(shared.clone(), Duration::from_millis(100))),
    ));
    client.set("k", &1u32).await.unwrap();

    let clearing = {
        let client = client.clone();
        tokio::spawn(async move { client.clear_all().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    // 共享层尚未删除，读到旧值是允许的
    let during: Option<u32> = client.get("k").await.unwrap();
    assert_eq!(during, Some(1));

    clearing.await.unwrap().unwrap();
    assert!(client.l1().get("k").is_none());
    assert!(shared.is_empty());
    let after: Option<u32> = client.get("k").await.unwrap();
    assert!(after.is_none());
}

/// clear_all 在空命名空间上是幂等的
#[tokio::test]
async fn test_clear_all_on_empty_namespace() {
    let client = client_with(&unique_namespace("empty"), Arc::new(MemoryL2Backend::new()));
    client.clear_all().await.unwrap();
    client.clear_all().await.unwrap();
}

/// 共享层中的损坏数据以序列化错误返回，不当作未命中
#[tokio::test]
async fn test_corrupted_entry_surfaces_serialization_error() {
    let shared = MemoryL2Backend::new();
    let namespace = unique_namespace("corrupt");
    shared.insert_raw(
        &namespaced_key(&namespace, "movie-9"),
        b"{not json".to_vec(),
        Duration::from_secs(60),
    );
    let client = client_with(&namespace, Arc::new(shared.clone()));

    for _ in 0..2 {
        let err = client.get::<MovieDetail>("movie-9").await.unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)), "{:?}", err);
    }

    client.clear_all().await.unwrap();
    let cached: Option<MovieDetail> = client.get("movie-9").await.unwrap();
    assert!(cached.is_none());
}

/// get_or_load 只在未命中时调用加载函数
#[tokio::test]
async fn test_get_or_load_populates_cache() {
    let shared = CountingL2::default();
    let client = client_with(&unique_namespace("load"), Arc::new(shared.clone()));
    let loads = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    for _ in 0..3 {
        let loads = loads.clone();
        let value = client
            .get_or_load("movie-5", || async move {
                loads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(Some(movie(5, "Ikiru")))
            })
            .await
            .unwrap();
        assert_eq!(value, Some(movie(5, "Ikiru")));
    }

    assert_eq!(loads.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(shared.sets(), 1);
}

/// 加载函数返回 None 时不写入缓存
#[tokio::test]
async fn test_get_or_load_does_not_cache_absent_values() {
    let shared = CountingL2::default();
    let client = client_with(&unique_namespace("load_none"), Arc::new(shared.clone()));

    let value: Option<MovieDetail> = client
        .get_or_load("missing", || async { Ok(None) })
        .await
        .unwrap();
    assert!(value.is_none());
    assert_eq!(shared.sets(), 0);
}

/// 非法命名空间在构造时被拒绝
#[tokio::test]
async fn test_invalid_namespace_rejected() {
    let result = TwoLevelClient::new(
        "bad namespace*",
        &test_config(),
        Arc::new(MemoryL2Backend::new()),
        Arc::new(MemoryBus::new()),
    );
    assert!(matches!(result, Err(CacheError::InvalidKey(_))));
}

/// 开启压缩后仍能正常读写
#[tokio::test]
async fn test_compressed_values_round_trip() {
    let mut config = test_config();
    config.global.compress = true;
    let shared = MemoryL2Backend::new();
    let namespace = unique_namespace("gzip");
    let client = TwoLevelClient::new(
        &namespace,
        &config,
        Arc::new(shared.clone()),
        Arc::new(MemoryBus::new()),
    )
    .unwrap();

    let title = "x".repeat(4096);
    client.set("big", &movie(1, &title)).await.unwrap();
    client.l1().flush_all();

    let raw = shared
        .get_bytes(&namespaced_key(&namespace, "big"))
        .await
        .unwrap()
        .unwrap();
    assert!(raw.len() < title.len());

    let cached: Option<MovieDetail> = client.get("big").await.unwrap();
    assert_eq!(cached, Some(movie(1, &title)));
}
