//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了双层缓存客户端的实现，结合L1和L2缓存并通过消息总线广播清空。

use super::CacheOps;
use crate::backend::{l1::L1Backend, namespace_pattern, namespaced_key, L2Backend};
use crate::config::{validate_namespace, Config};
use crate::error::{CacheError, Result};
use crate::metrics::GLOBAL_METRICS;
use crate::recovery::health::{HealthState, HealthTracker};
use crate::serialization::SerializerEnum;
use crate::sync::invalidation::{topic_for, InvalidationBus, InvalidationHandler};
use crate::sync::subscription::{SubscriptionGuard, SubscriptionState};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// 为网络调用加上超时，超时返回 `CacheError::Timeout`
async fn bounded<T, F>(op: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::Timeout(format!(
            "{} timed out after {}ms",
            op,
            limit.as_millis()
        ))),
    }
}

/// 清空一个命名空间的两层缓存，返回删除的L2键数量
async fn flush_namespace(
    l1: &L1Backend,
    l2: &dyn L2Backend,
    namespace: &str,
    limit: Duration,
) -> Result<usize> {
    l1.flush_all();
    let result = async {
        let keys = bounded("L2 scan", limit, l2.scan_keys(&namespace_pattern(namespace))).await?;
        if !keys.is_empty() {
            bounded("L2 delete", limit, l2.delete_keys(&keys)).await?;
        }
        Ok::<usize, CacheError>(keys.len())
    }
    .await;
    // 清理L2期间的读取可能把旧值回填进L1
    l1.flush_all();
    result
}

/// 双层缓存客户端实现
///
/// 每个命名空间一个实例。读：L1 → L2（命中后回填L1）；写：先L2后L1；
/// 清空信号通过消息总线广播，每个实例（包括发布者自己）在收到信号时清空两层。
/// 失效频道在首次 `get`/`set`/`publish_clear` 时惰性订阅，且至多订阅一次。
pub struct TwoLevelClient {
    /// 命名空间
    namespace: String,
    /// 失效频道
    topic: String,
    /// L1缓存后端
    l1: Arc<L1Backend>,
    /// L2缓存后端
    l2: Arc<dyn L2Backend>,
    /// 失效总线
    bus: Arc<dyn InvalidationBus>,
    /// 序列化器
    serializer: SerializerEnum,
    /// 订阅保护
    subscription: SubscriptionGuard,
    /// L2健康状态
    health: HealthTracker,
    /// L2写入TTL
    l2_ttl_secs: u64,
    /// L2命令超时
    l2_timeout: Duration,
    /// 总线命令超时
    bus_timeout: Duration,
    /// 降级后重新探测L2的间隔
    retry_after: Duration,
    /// L1清理任务句柄
    sweeper_handle: Option<JoinHandle<()>>,
    /// 关闭后总线上的处理函数不再执行清空
    active: Arc<AtomicBool>,
}

impl std::fmt::Debug for TwoLevelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoLevelClient")
            .field("namespace", &self.namespace)
            .field("topic", &self.topic)
            .field("subscription", &self.subscription.state())
            .finish()
    }
}

impl TwoLevelClient {
    /// 创建新的双层缓存客户端
    ///
    /// # 参数
    ///
    /// * `namespace` - 命名空间
    /// * `config` - 缓存配置
    /// * `l2` - 共享的L2后端句柄
    /// * `bus` - 共享的失效总线句柄
    ///
    /// # 返回值
    ///
    /// 命名空间非法时返回 `CacheError::InvalidKey`
    #[instrument(skip(config, l2, bus), level = "info", name = "init_two_level_client")]
    pub fn new(
        namespace: &str,
        config: &Config,
        l2: Arc<dyn L2Backend>,
        bus: Arc<dyn InvalidationBus>,
    ) -> Result<Self> {
        validate_namespace(namespace)?;

        let l1 = Arc::new(L1Backend::new(&config.l1));
        let sweeper_handle = l1.spawn_sweeper();
        let topic = topic_for(namespace, &config.bus.topic_suffix);
        info!(namespace, topic = %topic, "TwoLevelClient created");

        Ok(Self {
            namespace: namespace.to_string(),
            topic,
            l1,
            l2,
            bus,
            serializer: SerializerEnum::from_config(&config.global),
            subscription: SubscriptionGuard::new(),
            health: HealthTracker::new(format!("namespace:{}", namespace)),
            l2_ttl_secs: config.l2.ttl_secs,
            l2_timeout: Duration::from_millis(config.l2.command_timeout_ms),
            bus_timeout: Duration::from_millis(config.bus.command_timeout_ms),
            retry_after: Duration::from_secs(config.global.health_check_interval),
            sweeper_handle,
            active: Arc::new(AtomicBool::new(true)),
        })
    }

    /// 使用外部共享的健康跟踪器（同一L2连接的所有命名空间共享）
    pub fn with_health_tracker(mut self, health: HealthTracker) -> Self {
        self.health = health;
        self
    }

    /// 失效频道名称
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// L1缓存后端
    pub fn l1(&self) -> &L1Backend {
        &self.l1
    }

    /// 当前订阅状态
    pub fn subscription_state(&self) -> SubscriptionState {
        self.subscription.state()
    }

    /// 实际发起过的订阅尝试次数
    pub fn subscription_attempts(&self) -> u64 {
        self.subscription.attempts()
    }

    /// 当前L2健康状态
    pub async fn health_state(&self) -> HealthState {
        self.health.state().await
    }

    /// 建立失效订阅（至多一次）
    ///
    /// 并发调用共享同一个进行中的尝试；失败后下一次调用重试。
    #[instrument(skip(self), level = "debug", fields(namespace = %self.namespace))]
    pub async fn subscribe(&self) -> Result<()> {
        self.subscription
            .ensure(|| async {
                let handler = self.invalidation_handler();
                let result = bounded(
                    "bus subscribe",
                    self.bus_timeout,
                    self.bus.subscribe(&self.topic, handler),
                )
                .await;
                match result {
                    Ok(()) => {
                        GLOBAL_METRICS.record_request(&self.namespace, "BUS", "subscribe", "success");
                        info!(namespace = %self.namespace, topic = %self.topic, "Subscribed to clear signal");
                        Ok(())
                    }
                    Err(e) => {
                        GLOBAL_METRICS.record_request(&self.namespace, "BUS", "subscribe", "error");
                        Err(match e {
                            CacheError::Subscription(_) => e,
                            other => CacheError::Subscription(other.to_string()),
                        })
                    }
                }
            })
            .await
    }

    async fn ensure_subscribed(&self) {
        if let Err(e) = self.subscribe().await {
            warn!(
                namespace = %self.namespace,
                error = %e,
                "Invalidation subscription failed, will retry on next access"
            );
        }
    }

    fn invalidation_handler(&self) -> InvalidationHandler {
        let l1 = self.l1.clone();
        let l2 = self.l2.clone();
        let namespace = self.namespace.clone();
        let limit = self.l2_timeout;
        let active = self.active.clone();
        Arc::new(move || -> BoxFuture<'static, ()> {
            let l1 = l1.clone();
            let l2 = l2.clone();
            let namespace = namespace.clone();
            let active = active.clone();
            Box::pin(async move {
                if !active.load(Ordering::Acquire) {
                    debug!(namespace = %namespace, "Client shut down, ignoring clear signal");
                    return;
                }
                match flush_namespace(&l1, l2.as_ref(), &namespace, limit).await {
                    Ok(deleted) => {
                        GLOBAL_METRICS.record_request(&namespace, "BUS", "clear", "success");
                        info!(namespace = %namespace, deleted, "Clear signal applied");
                    }
                    Err(e) => {
                        GLOBAL_METRICS.record_request(&namespace, "BUS", "clear", "error");
                        warn!(
                            namespace = %namespace,
                            error = %e,
                            "Clear signal flushed L1 but L2 cleanup failed"
                        );
                    }
                }
            })
        })
    }

    /// L2是否因降级被跳过
    async fn l2_bypassed(&self, op: &str) -> bool {
        if self.health.should_bypass(self.retry_after).await {
            debug!(namespace = %self.namespace, op, "L2 degraded, skipping");
            GLOBAL_METRICS.record_request(&self.namespace, "L2", op, "skipped");
            true
        } else {
            false
        }
    }

    /// 处理L2故障
    async fn handle_l2_failure(&self, op: &str, error: &CacheError) {
        warn!(
            namespace = %self.namespace,
            op,
            error = %error,
            "L2 failure, falling through"
        );
        GLOBAL_METRICS.record_request(&self.namespace, "L2", op, "error");
        self.health.record_failure().await;
    }

    /// 停止后台任务
    pub fn shutdown_tasks(&self) {
        self.active.store(false, Ordering::Release);
        if let Some(handle) = &self.sweeper_handle {
            handle.abort();
        }
    }
}

impl Drop for TwoLevelClient {
    fn drop(&mut self) {
        self.shutdown_tasks();
    }
}

#[async_trait]
impl CacheOps for TwoLevelClient {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn serializer(&self) -> &SerializerEnum {
        &self.serializer
    }

    #[instrument(skip(self), level = "debug", fields(namespace = %self.namespace))]
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_subscribed().await;

        // 1. 尝试L1
        if let Some(bytes) = self.l1.get(key) {
            GLOBAL_METRICS.record_request(&self.namespace, "L1", "get", "hit");
            debug!("L1 hit for key: {}", key);
            return Ok(Some(bytes));
        }
        GLOBAL_METRICS.record_request(&self.namespace, "L1", "get", "miss");
        let epoch = self.l1.epoch();

        // 2. 尝试L2（降级时跳过）
        if self.l2_bypassed("get").await {
            return Ok(None);
        }
        let start = Instant::now();
        let result = bounded(
            "L2 get",
            self.l2_timeout,
            self.l2.get_bytes(&namespaced_key(&self.namespace, key)),
        )
        .await;
        GLOBAL_METRICS.record_duration(
            &self.namespace,
            "L2",
            "get",
            start.elapsed().as_secs_f64(),
        );

        match result {
            Ok(Some(bytes)) => {
                self.health.record_success().await;
                GLOBAL_METRICS.record_request(&self.namespace, "L2", "get", "hit");
                debug!("L2 hit for key: {}, backfilling L1", key);
                self.l1.set_if_epoch(key, bytes.clone(), epoch);
                Ok(Some(bytes))
            }
            Ok(None) => {
                self.health.record_success().await;
                GLOBAL_METRICS.record_request(&self.namespace, "L2", "get", "miss");
                debug!("L2 miss for key: {}", key);
                Ok(None)
            }
            Err(e) if e.is_connectivity() => {
                self.handle_l2_failure("get", &e).await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, value), level = "debug", fields(namespace = %self.namespace, value_len = value.len()))]
    async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.ensure_subscribed().await;

        if !self.l2_bypassed("set").await {
            let start = Instant::now();
            let result = bounded(
                "L2 set",
                self.l2_timeout,
                self.l2.set_bytes(
                    &namespaced_key(&self.namespace, key),
                    value.clone(),
                    self.l2_ttl_secs,
                ),
            )
            .await;
            GLOBAL_METRICS.record_duration(
                &self.namespace,
                "L2",
                "set",
                start.elapsed().as_secs_f64(),
            );
            match result {
                Ok(()) => {
                    self.health.record_success().await;
                    GLOBAL_METRICS.record_request(&self.namespace, "L2", "set", "success");
                }
                Err(e) if e.is_connectivity() => self.handle_l2_failure("set", &e).await,
                Err(e) => return Err(e),
            }
        }

        self.l1.set(key, value);
        GLOBAL_METRICS.record_request(&self.namespace, "L1", "set", "success");
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(namespace = %self.namespace))]
    async fn clear_all(&self) -> Result<()> {
        match flush_namespace(&self.l1, self.l2.as_ref(), &self.namespace, self.l2_timeout).await
        {
            Ok(deleted) => {
                GLOBAL_METRICS.record_request(&self.namespace, "L2", "clear", "success");
                info!(namespace = %self.namespace, deleted, "Namespace cleared");
                Ok(())
            }
            Err(e) => {
                if e.is_connectivity() {
                    self.health.record_failure().await;
                }
                GLOBAL_METRICS.record_request(&self.namespace, "L2", "clear", "error");
                warn!(
                    namespace = %self.namespace,
                    error = %e,
                    "L1 flushed but L2 clear failed"
                );
                Err(e)
            }
        }
    }

    #[instrument(skip(self), level = "debug", fields(namespace = %self.namespace))]
    async fn publish_clear(&self) -> Result<()> {
        self.ensure_subscribed().await;

        match bounded(
            "bus publish",
            self.bus_timeout,
            self.bus.publish(&self.topic, &[]),
        )
        .await
        {
            Ok(()) => {
                GLOBAL_METRICS.record_request(&self.namespace, "BUS", "publish", "success");
                debug!(topic = %self.topic, "Clear signal published");
                Ok(())
            }
            Err(e) => {
                GLOBAL_METRICS.record_request(&self.namespace, "BUS", "publish", "error");
                warn!(
                    namespace = %self.namespace,
                    error = %e,
                    "Failed to publish clear signal, entries will expire by TTL"
                );
                Err(e)
            }
        }
    }

    async fn shutdown(&self) -> Result<()> {
        info!(namespace = %self.namespace, "Shutting down TwoLevelClient");
        self.shutdown_tasks();
        Ok(())
    }
}
