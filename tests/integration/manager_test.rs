//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 命名空间注册表测试

use common::{settle, setup_logging, test_config, unique_namespace, CountingL2};
use fleetcache::backend::MemoryL2Backend;
use fleetcache::error::CacheError;
use fleetcache::recovery::health::HealthState;
use fleetcache::{CacheExt, CacheManager, CacheOps, InvalidationBus, MemoryBus};
use std::sync::Arc;

#[path = "../common/mod.rs"]
mod common;

fn manager_with(l2: MemoryL2Backend, bus: MemoryBus) -> CacheManager {
    CacheManager::new(test_config(), Arc::new(l2), Arc::new(bus)).unwrap()
}

/// 同一命名空间总是返回同一个客户端
#[tokio::test]
async fn test_same_namespace_returns_same_client() {
    setup_logging();
    let manager = manager_with(MemoryL2Backend::new(), MemoryBus::new());
    let namespace = unique_namespace("catalog");

    let first = manager.client(&namespace).unwrap();
    let second = manager.client(&namespace).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(manager.namespaces(), vec![namespace.clone()]);
    assert!(Arc::ptr_eq(&manager.get(&namespace).unwrap(), &first));
}

/// 并发的首次请求只创建一个客户端
#[tokio::test]
async fn test_concurrent_registration_yields_one_client() {
    let manager = Arc::new(manager_with(MemoryL2Backend::new(), MemoryBus::new()));
    let namespace = unique_namespace("race");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            let namespace = namespace.clone();
            tokio::spawn(async move { manager.client(&namespace).unwrap() })
        })
        .collect();

    let mut clients = Vec::new();
    for handle in handles {
        clients.push(handle.await.unwrap());
    }
    for client in &clients[1..] {
        assert!(Arc::ptr_eq(&clients[0], client));
    }
}

/// 不同命名空间互不影响
#[tokio::test]
async fn test_namespaces_are_isolated() {
    let l2 = MemoryL2Backend::new();
    let bus = MemoryBus::new();
    let manager = manager_with(l2.clone(), bus);
    let movies = manager.client(&unique_namespace("movies")).unwrap();
    let series = manager.client(&unique_namespace("series")).unwrap();

    movies.set("id-1", &"Heat".to_string()).await.unwrap();
    series.set("id-1", &"Dark".to_string()).await.unwrap();

    movies.publish_clear().await.unwrap();
    settle().await;

    let gone: Option<String> = movies.get("id-1").await.unwrap();
    assert!(gone.is_none());
    let kept: Option<String> = series.get("id-1").await.unwrap();
    assert_eq!(kept.as_deref(), Some("Dark"));
    assert_eq!(l2.len(), 1);
}

/// 两个管理器模拟两个进程，广播清空对两边都生效
#[tokio::test]
async fn test_two_processes_converge_on_clear() {
    let l2 = MemoryL2Backend::new();
    let bus = MemoryBus::new();
    let namespace = unique_namespace("fleet");
    let host_a = manager_with(l2.clone(), bus.clone());
    let host_b = manager_with(l2.clone(), bus.clone());

    let a = host_a.client(&namespace).unwrap();
    let b = host_b.client(&namespace).unwrap();

    a.set("k", &1u32).await.unwrap();
    let seen: Option<u32> = b.get("k").await.unwrap();
    assert_eq!(seen, Some(1));

    b.publish_clear().await.unwrap();
    settle().await;

    assert!(a.l1().get("k").is_none());
    assert!(b.l1().get("k").is_none());
    assert!(l2.is_empty());
}

/// 非法命名空间被拒绝且不会注册
#[tokio::test]
async fn test_invalid_namespace_is_rejected() {
    let manager = manager_with(MemoryL2Backend::new(), MemoryBus::new());

    let too_long = "x".repeat(65);
    for bad in ["", "has space", "wild*card", "colon:sep", too_long.as_str()] {
        let result = manager.client(bad);
        assert!(matches!(result, Err(CacheError::InvalidKey(_))), "{:?}", bad);
    }
    assert!(manager.namespaces().is_empty());
    assert!(matches!(
        manager.get("never"),
        Err(CacheError::Configuration(_))
    ));
}

/// 非法配置无法构造管理器
#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut config = test_config();
    config.l1.ttl_secs = config.l2.ttl_secs + 1;
    let result = CacheManager::new(
        config,
        Arc::new(MemoryL2Backend::new()),
        Arc::new(MemoryBus::new()),
    );
    assert!(matches!(result, Err(CacheError::Configuration(_))));
}

/// 所有命名空间共享健康状态
#[tokio::test]
async fn test_health_is_shared_across_namespaces() {
    let manager = CacheManager::new(
        test_config(),
        Arc::new(CountingL2::default()),
        Arc::new(MemoryBus::new()),
    )
    .unwrap();
    let a = manager.client(&unique_namespace("a")).unwrap();
    let b = manager.client(&unique_namespace("b")).unwrap();

    assert_eq!(manager.health_state().await, HealthState::Healthy);
    assert_eq!(a.health_state().await, b.health_state().await);
}

/// shutdown 后注册表为空
#[tokio::test]
async fn test_shutdown_clears_registry() {
    let manager = manager_with(MemoryL2Backend::new(), MemoryBus::new());
    manager.client(&unique_namespace("a")).unwrap();
    manager.client(&unique_namespace("b")).unwrap();
    assert_eq!(manager.namespaces().len(), 2);

    manager.shutdown().await.unwrap();
    assert!(manager.namespaces().is_empty());
}

/// shutdown 后不再注册新客户端，旧客户端的处理函数不再执行清空
#[tokio::test]
async fn test_registry_is_closed_after_shutdown() {
    let l2 = MemoryL2Backend::new();
    let bus = MemoryBus::new();
    let manager = manager_with(l2.clone(), bus.clone());
    let namespace = unique_namespace("closed");
    let client = manager.client(&namespace).unwrap();
    client.set("k", &1u32).await.unwrap();
    assert_eq!(bus.subscriber_count(client.topic()), 1);

    manager.shutdown().await.unwrap();
    assert!(matches!(
        manager.client(&namespace),
        Err(CacheError::Configuration(_))
    ));

    bus.publish(client.topic(), &[]).await.unwrap();
    settle().await;
    assert_eq!(l2.len(), 1);
    assert!(client.l1().get("k").is_some());
}
