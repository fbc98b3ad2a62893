//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的错误类型和处理机制。

use thiserror::Error;

/// 缓存系统错误类型枚举
///
/// 连接类错误（`Connectivity`、`Timeout`、`RedisError`）在读路径上降级为未命中；
/// `Serialization` 错误永远不会被当作未命中处理。
#[derive(Error, Debug)]
pub enum CacheError {
    /// 共享层或消息总线不可达
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// 共享层或消息总线调用超时
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// 序列化/反序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 失效频道订阅失败
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 非法的命名空间或键
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Redis错误
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CacheError {
    /// 是否属于连接类错误（超时与连接错误同等对待）
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            CacheError::Connectivity(_) | CacheError::Timeout(_) | CacheError::RedisError(_)
        )
    }
}

/// 缓存操作结果类型别名
pub type Result<T> = std::result::Result<T, CacheError>;
