//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块提供进程内的L2缓存后端，用于单机运行和测试。

use super::l2::L2Backend;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// 进程内L2缓存后端
///
/// 行为上模拟Redis：按写入时给定的TTL过期，支持 glob 风格的键扫描。
/// 克隆共享同一份存储，可在同一进程内模拟多个实例共享一个L2。
#[derive(Clone, Default)]
pub struct MemoryL2Backend {
    entries: Arc<DashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryL2Backend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 未过期的条目数量
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.value().1 > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 直接写入原始字节，绕过序列化（用于构造损坏条目等场景）
    pub fn insert_raw(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
    }
}

/// 将 glob 模式转换为正则
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr)
        .map_err(|e| CacheError::InvalidKey(format!("Invalid scan pattern {}: {}", pattern, e)))
}

#[async_trait]
impl L2Backend for MemoryL2Backend {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let value = match self.entries.get(key) {
            Some(entry) if entry.value().1 > now => Some(entry.value().0.clone()),
            Some(_) => None,
            None => return Ok(None),
        };
        if value.is_none() {
            self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        }
        Ok(value)
    }

    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        self.insert_raw(key, value, Duration::from_secs(ttl_secs));
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let re = glob_to_regex(pattern)?;
        let now = Instant::now();
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().1 > now && re.is_match(e.key()))
            .map(|e| e.key().clone())
            .collect();
        debug!("Memory L2 scan: pattern={}, matched={}", pattern, keys.len());
        Ok(keys)
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
