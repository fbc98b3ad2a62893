//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis的L2缓存后端。

use super::{l2::L2Backend, redis_provider};
use crate::config::L2Config;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, RedisResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument};

const SCAN_COUNT: usize = 1000;
const DELETE_CHUNK: usize = 1000;

/// Redis L2缓存后端
///
/// 持有单个连接管理器，由所有并发操作克隆使用；每条命令都受命令超时约束。
#[derive(Clone)]
pub struct RedisL2Backend {
    manager: ConnectionManager,
    command_timeout: Duration,
}

impl std::fmt::Debug for RedisL2Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RedisL2Backend({:?})", self.command_timeout)
    }
}

impl RedisL2Backend {
    /// 创建新的Redis L2后端实例
    #[instrument(skip(config), level = "info", name = "init_l2_backend", fields(mode = ?config.mode))]
    pub async fn new(config: &L2Config) -> Result<Self> {
        let (_client, manager) = redis_provider::connect(config).await?;
        Ok(Self {
            manager,
            command_timeout: Duration::from_millis(config.command_timeout_ms),
        })
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match timeout(self.command_timeout, fut).await {
            Ok(result) => result.map_err(CacheError::from),
            Err(_) => Err(CacheError::Timeout(format!(
                "L2 {} timed out after {}ms",
                op,
                self.command_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl L2Backend for RedisL2Backend {
    #[instrument(skip(self), level = "debug")]
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = self.bounded("get", conn.get(key)).await?;
        Ok(value)
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = self
            .bounded("set", conn.set_ex(key, value, ttl_secs))
            .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT);
            let (next_cursor, batch): (u64, Vec<String>) =
                self.bounded("scan", cmd.query_async(&mut conn)).await?;
            keys.extend(batch);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        // SCAN 可能重复返回同一个键
        keys.sort_unstable();
        keys.dedup();
        debug!("L2 scan: pattern={}, matched={}", pattern, keys.len());
        Ok(keys)
    }

    #[instrument(skip(self, keys), level = "debug", fields(key_count = keys.len()))]
    async fn delete_keys(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        for chunk in keys.chunks(DELETE_CHUNK) {
            let mut cmd = redis::cmd("DEL");
            cmd.arg(chunk);
            let _: i64 = self.bounded("del", cmd.query_async(&mut conn)).await?;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let cmd = redis::cmd("PING");
        let _: String = self.bounded("ping", cmd.query_async(&mut conn)).await?;
        Ok(())
    }
}
