//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的配置结构和解析逻辑。

use crate::error::{CacheError, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;

/// 共享层TTL环境变量（秒）
pub const ENV_L2_TTL: &str = "FLEETCACHE_L2_TTL";
/// 共享层地址环境变量
pub const ENV_L2_URL: &str = "FLEETCACHE_L2_URL";
/// 消息总线地址环境变量
pub const ENV_BUS_URL: &str = "FLEETCACHE_BUS_URL";
/// 本地层TTL环境变量（秒）
pub const ENV_L1_TTL: &str = "FLEETCACHE_L1_TTL";

/// 命名空间最大长度
pub const MAX_NAMESPACE_LEN: usize = 64;

const MAX_TTL_SECS: u64 = 86400 * 30;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub l1: L1Config,
    #[serde(default)]
    pub l2: L2Config,
    #[serde(default)]
    pub bus: BusConfig,
}

/// 全局配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GlobalConfig {
    /// 健康检查间隔（秒）
    pub health_check_interval: u64,
    /// 序列化类型
    pub serialization: SerializationType,
    /// 是否压缩序列化结果
    pub compress: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            health_check_interval: 5,
            serialization: SerializationType::Json,
            compress: false,
        }
    }
}

/// 序列化类型枚举
#[derive(Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SerializationType {
    /// JSON序列化
    #[default]
    Json,
}

/// L1缓存配置
///
/// 进程内缓存，TTL可由管理员调整
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct L1Config {
    /// 条目过期时间（秒）
    pub ttl_secs: u64,
    /// 过期清理间隔（秒），0表示禁用后台清理
    pub cleanup_interval_secs: u64,
    /// 最大条目数
    pub max_capacity: u64,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            cleanup_interval_secs: 60,
            max_capacity: 10000,
        }
    }
}

/// Redis模式枚举
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RedisMode {
    /// 单机模式
    #[default]
    Standalone,
    /// 哨兵模式
    Sentinel,
}

/// 哨兵配置
#[derive(Deserialize, Clone, Debug)]
pub struct SentinelConfig {
    /// 主节点名称
    pub master_name: String,
    /// 哨兵节点列表
    pub nodes: Vec<String>,
}

/// L2缓存配置
///
/// 所有实例共享的Redis缓存
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct L2Config {
    /// Redis模式
    pub mode: RedisMode,
    /// 连接字符串
    pub connection_string: SecretString,
    /// Redis 密码（哨兵模式使用）
    pub password: Option<SecretString>,
    /// 写入时显式设置的过期时间（秒）
    pub ttl_secs: u64,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
    /// 是否启用 TLS
    pub enable_tls: bool,
    /// 哨兵配置
    pub sentinel: Option<SentinelConfig>,
}

impl Default for L2Config {
    fn default() -> Self {
        Self {
            mode: RedisMode::Standalone,
            connection_string: SecretString::new("redis://127.0.0.1:6379".into()),
            password: None,
            ttl_secs: 3600,
            connection_timeout_ms: 5000,
            command_timeout_ms: 3000,
            enable_tls: false,
            sentinel: None,
        }
    }
}

/// 失效消息总线配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct BusConfig {
    /// 总线地址，未设置时复用L2的连接字符串
    pub connection_string: Option<SecretString>,
    /// 频道名后缀，完整频道为 `<namespace>.<suffix>`
    pub topic_suffix: String,
    /// 订阅/发布超时时间（毫秒）
    pub command_timeout_ms: u64,
    /// 重连退避上限（秒）
    pub reconnect_max_backoff_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            topic_suffix: "cache.clear".to_string(),
            command_timeout_ms: 3000,
            reconnect_max_backoff_secs: 300,
        }
    }
}

impl Config {
    /// 从TOML文件加载配置，应用环境变量覆盖并校验
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&raw).map_err(|e| {
            CacheError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// 使用进程环境变量覆盖配置
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// 使用给定的变量查找函数覆盖配置
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ttl) = lookup(ENV_L2_TTL) {
            self.l2.ttl_secs = parse_secs(ENV_L2_TTL, &ttl)?;
        }
        if let Some(ttl) = lookup(ENV_L1_TTL) {
            self.l1.ttl_secs = parse_secs(ENV_L1_TTL, &ttl)?;
        }
        if let Some(url) = lookup(ENV_L2_URL) {
            self.l2.connection_string = SecretString::new(url.into());
        }
        if let Some(url) = lookup(ENV_BUS_URL) {
            self.bus.connection_string = Some(SecretString::new(url.into()));
        }
        Ok(())
    }

    /// 总线实际使用的连接字符串
    pub fn bus_connection_string(&self) -> String {
        self.bus
            .connection_string
            .as_ref()
            .unwrap_or(&self.l2.connection_string)
            .expose_secret()
            .to_string()
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.global.health_check_interval == 0 || self.global.health_check_interval > 3600 {
            return Err(CacheError::Configuration(
                "global.health_check_interval must be between 1 and 3600 seconds".to_string(),
            ));
        }

        if self.l1.ttl_secs == 0 {
            return Err(CacheError::Configuration(
                "l1.ttl_secs cannot be zero".to_string(),
            ));
        }
        if self.l2.ttl_secs == 0 {
            return Err(CacheError::Configuration(
                "l2.ttl_secs cannot be zero".to_string(),
            ));
        }
        if self.l2.ttl_secs > MAX_TTL_SECS {
            return Err(CacheError::Configuration(
                "l2.ttl_secs cannot exceed 30 days (2592000 seconds)".to_string(),
            ));
        }
        if self.l1.ttl_secs > self.l2.ttl_secs {
            return Err(CacheError::Configuration(format!(
                "L1 TTL ({}) must be <= L2 TTL ({})",
                self.l1.ttl_secs, self.l2.ttl_secs
            )));
        }
        if self.l1.cleanup_interval_secs > self.l1.ttl_secs {
            return Err(CacheError::Configuration(format!(
                "l1.cleanup_interval_secs ({}) must be <= l1.ttl_secs ({})",
                self.l1.cleanup_interval_secs, self.l1.ttl_secs
            )));
        }
        if self.l1.max_capacity == 0 {
            return Err(CacheError::Configuration(
                "l1.max_capacity cannot be zero".to_string(),
            ));
        }

        for (name, timeout) in [
            ("l2.connection_timeout_ms", self.l2.connection_timeout_ms),
            ("l2.command_timeout_ms", self.l2.command_timeout_ms),
            ("bus.command_timeout_ms", self.bus.command_timeout_ms),
        ] {
            if !(100..=60000).contains(&timeout) {
                return Err(CacheError::Configuration(format!(
                    "{} must be between 100 and 60000 ms",
                    name
                )));
            }
        }

        if self.l2.mode == RedisMode::Sentinel && self.l2.sentinel.is_none() {
            return Err(CacheError::Configuration(
                "Sentinel mode requires l2.sentinel settings".to_string(),
            ));
        }

        if self.bus.topic_suffix.is_empty() {
            return Err(CacheError::Configuration(
                "bus.topic_suffix cannot be empty".to_string(),
            ));
        }
        if self.bus.reconnect_max_backoff_secs == 0 {
            return Err(CacheError::Configuration(
                "bus.reconnect_max_backoff_secs cannot be zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_secs(name: &str, raw: &str) -> Result<u64> {
    raw.trim().parse::<u64>().map_err(|e| {
        CacheError::Configuration(format!("{} must be a number of seconds: {}", name, e))
    })
}

/// 校验命名空间
///
/// 命名空间参与键前缀 `<namespace>:` 与频道名的构造，只允许 `[A-Za-z0-9_.-]`，
/// 保证前缀扫描不会匹配到其他命名空间的键。
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(CacheError::InvalidKey(
            "Namespace cannot be empty".to_string(),
        ));
    }
    if namespace.len() > MAX_NAMESPACE_LEN {
        return Err(CacheError::InvalidKey(format!(
            "Namespace '{}' exceeds maximum length of {} characters",
            namespace, MAX_NAMESPACE_LEN
        )));
    }
    if let Some(c) = namespace
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(CacheError::InvalidKey(format!(
            "Namespace '{}' contains invalid character '{}'",
            namespace, c
        )));
    }
    Ok(())
}
