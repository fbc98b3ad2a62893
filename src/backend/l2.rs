//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了L2（共享层）缓存后端的接口。

use crate::error::Result;
use async_trait::async_trait;

/// 键分隔符
pub const KEY_SEPARATOR: char = ':';

/// 组合物理键 `<namespace>:<logical-key>`
pub fn namespaced_key(namespace: &str, key: &str) -> String {
    format!("{}{}{}", namespace, KEY_SEPARATOR, key)
}

/// 命名空间下所有键的扫描模式 `<namespace>:*`
pub fn namespace_pattern(namespace: &str) -> String {
    format!("{}{}*", namespace, KEY_SEPARATOR)
}

/// L2缓存后端特征
///
/// 所有实例共享的进程外缓存。实现必须支持并发调用；每个调用都应受超时约束，
/// 超时以 `CacheError::Timeout` 返回。
#[async_trait]
pub trait L2Backend: Send + Sync {
    /// 读取原始字节，不存在返回 `None`
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// 写入原始字节并显式设置过期时间（秒）
    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()>;

    /// 按模式枚举键（仅 `*` 与 `?` 通配）
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// 批量删除键，空列表为空操作
    async fn delete_keys(&self, keys: &[String]) -> Result<()>;

    /// 检查连接是否正常
    async fn ping(&self) -> Result<()>;
}
