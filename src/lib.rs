//! fleetcache - 面向多实例部署的双层命名空间缓存
//!
//! 每个进程持有一个本地L1（Moka）缓存，所有进程共享一个L2（Redis）缓存；
//! 清空信号通过 Redis Pub/Sub 广播到所有实例，使各实例的本地层一起失效。

#![doc(html_root_url = "https://docs.rs/fleetcache/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod recovery;
pub mod serialization;
pub mod sync;
pub mod telemetry;

// Re-export commonly used items
pub use backend::{L2Backend, MemoryL2Backend, RedisL2Backend};
pub use client::{CacheExt, CacheOps, TwoLevelClient};
pub use config::Config;
pub use error::{CacheError, Result};
pub use manager::CacheManager;
pub use sync::invalidation::{InvalidationBus, InvalidationHandler, MemoryBus, RedisBus};

/// fleetcache 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
