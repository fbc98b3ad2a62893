//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了跨实例的失效消息总线。
//!
//! 每个命名空间只有一个频道 `<namespace>.<suffix>`，消息体为空：
//! 消息本身即表示“清空该命名空间”，不携带任何键。

use crate::config::Config;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::stream::StreamExt;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

/// 失效信号处理函数
///
/// 每收到一条信号调用一次，返回的 future 完成后才处理下一条。
pub type InvalidationHandler = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// 由命名空间推导频道名称
pub fn topic_for(namespace: &str, suffix: &str) -> String {
    format!("{}.{}", namespace, suffix)
}

/// 失效消息总线特征
#[async_trait]
pub trait InvalidationBus: Send + Sync {
    /// 订阅频道，每条消息都会调用 `handler`
    ///
    /// 返回 `Ok` 表示订阅已在总线上生效。总线本身不做去重，
    /// 同一频道重复订阅会注册多个处理函数。
    async fn subscribe(&self, topic: &str, handler: InvalidationHandler) -> Result<()>;

    /// 广播一条消息，不等待任何确认
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;
}

/// 基于 Redis Pub/Sub 的失效总线
///
/// 发布使用共享的连接管理器；每个订阅独占一条 Pub/Sub 连接，由后台任务监听，
/// 连接断开后以指数退避重连。
pub struct RedisBus {
    client: Client,
    publisher: ConnectionManager,
    command_timeout: Duration,
    max_backoff: Duration,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl RedisBus {
    /// 按配置连接总线，地址未配置时复用L2地址
    #[instrument(skip(config), level = "info", name = "init_invalidation_bus")]
    pub async fn new(config: &Config) -> Result<Self> {
        let url = config.bus_connection_string();
        let (client, publisher) =
            crate::backend::redis_provider::open_manager(&url, config.l2.connection_timeout_ms)
                .await?;
        Ok(Self {
            client,
            publisher,
            command_timeout: Duration::from_millis(config.bus.command_timeout_ms),
            max_backoff: Duration::from_secs(config.bus.reconnect_max_backoff_secs),
            listeners: Mutex::new(Vec::new()),
        })
    }
}

impl Drop for RedisBus {
    fn drop(&mut self) {
        for handle in self.listeners.get_mut().drain(..) {
            handle.abort();
        }
    }
}

async fn open_pubsub(client: &Client, topic: &str) -> redis::RedisResult<redis::aio::PubSub> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(topic).await?;
    Ok(pubsub)
}

async fn listen(
    client: Client,
    topic: String,
    handler: InvalidationHandler,
    mut pubsub: redis::aio::PubSub,
    max_backoff: Duration,
) {
    loop {
        {
            let mut stream = pubsub.on_message();
            while stream.next().await.is_some() {
                debug!(topic = %topic, "received clear signal");
                handler().await;
            }
        }

        warn!(topic = %topic, "pub/sub connection closed, reconnecting");
        let mut backoff = Duration::from_secs(1);
        pubsub = loop {
            match open_pubsub(&client, &topic).await {
                Ok(p) => break p,
                Err(e) => {
                    error!(
                        topic = %topic,
                        error = %e,
                        backoff_secs = backoff.as_secs(),
                        "Cache invalidation listener error, reconnecting..."
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(max_backoff);
                }
            }
        };

        // 断线期间的信号已经丢失，保守地当作收到一次清空
        info!(topic = %topic, "pub/sub reconnected, flushing missed signals");
        handler().await;
    }
}

#[async_trait]
impl InvalidationBus for RedisBus {
    #[instrument(skip(self, handler), level = "debug")]
    async fn subscribe(&self, topic: &str, handler: InvalidationHandler) -> Result<()> {
        let pubsub = match timeout(self.command_timeout, open_pubsub(&self.client, topic)).await
        {
            Ok(Ok(pubsub)) => pubsub,
            Ok(Err(e)) => {
                return Err(CacheError::Subscription(format!(
                    "failed to subscribe to {}: {}",
                    topic, e
                )))
            }
            Err(_) => {
                return Err(CacheError::Subscription(format!(
                    "subscribing to {} timed out after {}ms",
                    topic,
                    self.command_timeout.as_millis()
                )))
            }
        };

        // 启动监听任务之后不再有 await 点：监听已启动就一定返回 Ok
        let mut listeners = self.listeners.lock().await;
        listeners.push(tokio::spawn(listen(
            self.client.clone(),
            topic.to_string(),
            handler,
            pubsub,
            self.max_backoff,
        )));
        info!(topic = %topic, "Subscribed to invalidation channel");
        Ok(())
    }

    #[instrument(skip(self, payload), level = "debug")]
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let mut conn = self.publisher.clone();
        let receivers: i64 = match timeout(self.command_timeout, conn.publish(topic, payload)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(CacheError::Timeout(format!(
                    "publishing to {} timed out after {}ms",
                    topic,
                    self.command_timeout.as_millis()
                )))
            }
        };
        debug!(topic = %topic, receivers, "published clear signal");
        Ok(())
    }
}

const MEMORY_CHANNEL_CAPACITY: usize = 64;

/// 进程内失效总线
///
/// 基于 `tokio::sync::broadcast`，克隆共享同一组频道，可在一个进程内模拟多个实例。
/// 订阅者落后导致丢失的信号按收到一次清空处理。
#[derive(Clone, Default)]
pub struct MemoryBus {
    channels: Arc<DashMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        self.channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(MEMORY_CHANNEL_CAPACITY).0)
            .clone()
    }

    /// 频道上当前注册的处理函数数量
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.channels
            .get(topic)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl InvalidationBus for MemoryBus {
    async fn subscribe(&self, topic: &str, handler: InvalidationHandler) -> Result<()> {
        let mut rx = self.sender(topic).subscribe();
        let topic = topic.to_string();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(_) => handler().await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(topic = %topic, missed, "subscriber lagged, flushing");
                        handler().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        // 没有订阅者时 send 返回错误，这与 Redis PUBLISH 返回 0 等价
        let _ = self.sender(topic).send(payload.to_vec());
        Ok(())
    }
}
