//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块负责根据配置建立Redis连接。

use crate::{
    config::{L2Config, RedisMode},
    error::{CacheError, Result},
};
use redis::{aio::ConnectionManager, Client};
use secrecy::ExposeSecret;
use tokio::time::{timeout, Duration};
use tracing::info;

/// 按L2配置建立客户端与连接管理器
///
/// 连接管理器自动重连，可被所有并发操作克隆共享。
pub async fn connect(config: &L2Config) -> Result<(Client, ConnectionManager)> {
    match config.mode {
        RedisMode::Standalone => {
            let url = standalone_url(
                config.connection_string.expose_secret(),
                config.enable_tls,
            );
            open_manager(&url, config.connection_timeout_ms).await
        }
        RedisMode::Sentinel => {
            info!("Initializing Sentinel client with automatic failover support");
            let url = sentinel_url(config)?;
            open_manager(&url, config.connection_timeout_ms).await
        }
    }
}

/// 打开指定地址的连接管理器，受连接超时约束
pub async fn open_manager(url: &str, connection_timeout_ms: u64) -> Result<(Client, ConnectionManager)> {
    let client = Client::open(url)?;
    let manager = timeout(
        Duration::from_millis(connection_timeout_ms),
        client.get_connection_manager(),
    )
    .await
    .map_err(|_| {
        CacheError::Connectivity(format!(
            "Connection timed out after {}ms",
            connection_timeout_ms
        ))
    })??;
    Ok((client, manager))
}

fn standalone_url(connection_string: &str, enable_tls: bool) -> String {
    if enable_tls && !connection_string.starts_with("rediss://") {
        connection_string.replace("redis://", "rediss://")
    } else {
        connection_string.to_string()
    }
}

// redis+sentinel://[:password@]host:port[,host:port]/service_name
fn sentinel_url(config: &L2Config) -> Result<String> {
    let sentinel = config.sentinel.as_ref().ok_or_else(|| {
        CacheError::Configuration("Sentinel configuration is missing".to_string())
    })?;

    let nodes: Vec<&str> = sentinel
        .nodes
        .iter()
        .map(|n| {
            n.trim_start_matches("redis://")
                .trim_start_matches("redis+sentinel://")
        })
        .collect();
    if nodes.is_empty() {
        return Err(CacheError::Configuration(
            "No sentinel nodes provided".to_string(),
        ));
    }

    let mut url = "redis+sentinel://".to_string();
    if let Some(password) = &config.password {
        url.push_str(&format!(":{}@", password.expose_secret()));
    }
    url.push_str(&nodes.join(","));
    url.push('/');
    url.push_str(&sentinel.master_name);
    Ok(url)
}
