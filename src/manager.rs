//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存管理器：命名空间到双层缓存客户端的注册表。

use crate::backend::{L2Backend, RedisL2Backend};
use crate::client::{CacheOps, TwoLevelClient};
use crate::config::{validate_namespace, Config};
use crate::error::{CacheError, Result};
use crate::recovery::health::{HealthChecker, HealthState, HealthTracker};
use crate::sync::invalidation::{InvalidationBus, RedisBus};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// 缓存管理器
///
/// 进程启动时构造一次并显式传递给领域层。每个命名空间对应唯一的
/// `TwoLevelClient`，首次请求时创建，之后只做查找。所有命名空间共享
/// 同一个L2句柄、总线句柄和健康跟踪器。
pub struct CacheManager {
    config: Config,
    l2: Arc<dyn L2Backend>,
    bus: Arc<dyn InvalidationBus>,
    health: HealthTracker,
    clients: DashMap<String, Arc<TwoLevelClient>>,
    health_checker_handle: Option<JoinHandle<()>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("namespaces", &self.namespaces())
            .finish()
    }
}

impl CacheManager {
    /// 使用注入的L2与总线句柄创建管理器
    ///
    /// 在Tokio运行时内调用时会启动后台健康检查。
    #[instrument(skip(config, l2, bus), level = "info")]
    pub fn new(
        config: Config,
        l2: Arc<dyn L2Backend>,
        bus: Arc<dyn InvalidationBus>,
    ) -> Result<Self> {
        config.validate()?;

        let health = HealthTracker::new("l2");
        let health_checker_handle = tokio::runtime::Handle::try_current().ok().map(|rt| {
            let checker = HealthChecker::new(
                l2.clone(),
                health.clone(),
                Duration::from_secs(config.global.health_check_interval),
                Duration::from_millis(config.l2.command_timeout_ms),
            );
            rt.spawn(checker.start())
        });

        Ok(Self {
            config,
            l2,
            bus,
            health,
            clients: DashMap::new(),
            health_checker_handle,
            closed: AtomicBool::new(false),
        })
    }

    /// 按配置连接Redis L2与Redis总线并创建管理器
    #[instrument(skip(config), level = "info")]
    pub async fn connect(config: Config) -> Result<Self> {
        config.validate()?;
        let l2 = Arc::new(RedisL2Backend::new(&config.l2).await?);
        let bus = Arc::new(RedisBus::new(&config).await?);
        info!("CacheManager connected to Redis L2 and invalidation bus");
        Self::new(config, l2, bus)
    }

    /// 获取命名空间对应的客户端，不存在时创建
    ///
    /// 并发的首次请求只会创建一个实例。`shutdown` 之后不再创建新客户端。
    pub fn client(&self, namespace: &str) -> Result<Arc<TwoLevelClient>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Configuration(
                "CacheManager has been shut down".to_string(),
            ));
        }
        if let Some(existing) = self.clients.get(namespace) {
            return Ok(existing.value().clone());
        }
        validate_namespace(namespace)?;

        let entry = self
            .clients
            .entry(namespace.to_string())
            .or_try_insert_with(|| {
                info!("Registering cache namespace {}", namespace);
                TwoLevelClient::new(namespace, &self.config, self.l2.clone(), self.bus.clone())
                    .map(|client| Arc::new(client.with_health_tracker(self.health.clone())))
            })?;
        Ok(entry.value().clone())
    }

    /// 获取已注册的客户端，不创建
    pub fn get(&self, namespace: &str) -> Result<Arc<TwoLevelClient>> {
        self.clients
            .get(namespace)
            .map(|r| r.value().clone())
            .ok_or_else(|| {
                CacheError::Configuration(format!("Namespace {} is not registered", namespace))
            })
    }

    /// 已注册的命名空间（排序）
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// 共享层健康状态
    pub async fn health_state(&self) -> HealthState {
        self.health.state().await
    }

    /// 缓存配置
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 共享的L2句柄
    pub fn l2(&self) -> Arc<dyn L2Backend> {
        self.l2.clone()
    }

    /// 优雅关闭所有客户端并停止后台任务
    #[instrument(skip(self), level = "info")]
    pub async fn shutdown(&self) -> Result<()> {
        info!("开始关闭所有缓存客户端...");
        self.closed.store(true, Ordering::Release);
        if let Some(handle) = &self.health_checker_handle {
            handle.abort();
        }

        let clients: Vec<(String, Arc<TwoLevelClient>)> = self
            .clients
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        self.clients.clear();

        let mut errors = Vec::new();
        for (namespace, client) in clients {
            if let Err(e) = client.shutdown().await {
                warn!("关闭命名空间 {} 时出错: {}", namespace, e);
                errors.push(format!("{}: {}", namespace, e));
            }
        }

        if errors.is_empty() {
            info!("所有缓存客户端已成功关闭");
            Ok(())
        } else {
            Err(CacheError::Configuration(format!(
                "部分客户端关闭失败: {}",
                errors.join(", ")
            )))
        }
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        if let Some(handle) = &self.health_checker_handle {
            handle.abort();
        }
    }
}
