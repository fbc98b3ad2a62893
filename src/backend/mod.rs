//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的后端提供者，包括L1和L2缓存后端。

pub mod l1;
pub mod l2;
pub mod memory;
pub mod redis_l2;
pub mod redis_provider;

pub use l1::L1Backend;
pub use l2::{namespace_pattern, namespaced_key, L2Backend};
pub use memory::MemoryL2Backend;
pub use redis_l2::RedisL2Backend;
