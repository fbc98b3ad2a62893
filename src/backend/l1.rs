//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了L1缓存后端的实现，基于内存的高速缓存。

use crate::config::L1Config;
use moka::sync::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace};

/// L1缓存后端实现
///
/// 基于Moka的进程内缓存。所有操作都是同步的纯内存操作，不会失败；
/// 条目在写入时按统一的TTL过期，并由后台清理任务定期回收。
///
/// 每次 `flush_all` 递增清空纪元。回填使用 `set_if_epoch`，读取开始后
/// 发生过清空的回填会被丢弃。
#[derive(Clone)]
pub struct L1Backend {
    cache: Cache<String, Vec<u8>>,
    epoch: Arc<AtomicU64>,
    ttl: Duration,
    cleanup_interval: Duration,
}

impl std::fmt::Debug for L1Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("L1Backend")
            .field("ttl", &self.ttl)
            .field("cleanup_interval", &self.cleanup_interval)
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl L1Backend {
    /// 创建新的L1缓存后端实例
    ///
    /// # 参数
    ///
    /// * `config` - L1缓存配置
    pub fn new(config: &L1Config) -> Self {
        let ttl = Duration::from_secs(config.ttl_secs);
        Self {
            cache: Cache::builder()
                .max_capacity(config.max_capacity)
                .time_to_live(ttl)
                .build(),
            epoch: Arc::new(AtomicU64::new(0)),
            ttl,
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs),
        }
    }

    /// 条目过期时间
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 获取缓存值（字节形式）
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let result = self.cache.get(key);
        trace!("L1 get: key={}, found={}", key, result.is_some());
        result
    }

    /// 设置缓存值，覆盖同名条目
    pub fn set(&self, key: &str, value: Vec<u8>) {
        trace!("L1 set: key={}, value_len={}", key, value.len());
        self.cache.insert(key.to_string(), value);
    }

    /// 当前清空纪元
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// 仅当期间没有发生清空时写入，返回是否写入
    pub fn set_if_epoch(&self, key: &str, value: Vec<u8>, epoch: u64) -> bool {
        if self.epoch() != epoch {
            trace!("L1 backfill dropped after flush: key={}", key);
            return false;
        }
        self.set(key, value);
        true
    }

    /// 移除单个条目
    ///
    /// 仅用于模拟过期与运维排障；正常失效路径总是整体清空。
    pub fn evict(&self, key: &str) {
        self.cache.invalidate(key);
    }

    /// 清空 L1 缓存
    #[instrument(skip(self), level = "debug")]
    pub fn flush_all(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
        debug!("L1 flush_all: 缓存已清空");
    }

    /// 立即回收已过期的条目
    pub fn sweep(&self) {
        self.cache.run_pending_tasks();
    }

    /// 当前条目数（近似值，`sweep` 之后准确）
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// 启动后台清理任务
    ///
    /// 按配置的间隔回收过期条目，与访问模式无关。间隔为0或当前不在
    /// Tokio运行时内时不启动，返回 `None`。
    pub fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        if self.cleanup_interval.is_zero() {
            return None;
        }
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let cache = self.cache.clone();
        let period = self.cleanup_interval;
        Some(handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            // 第一次 tick 立即返回
            interval.tick().await;
            loop {
                interval.tick().await;
                cache.run_pending_tasks();
                trace!("L1 sweep: entries={}", cache.entry_count());
            }
        }))
    }
}
