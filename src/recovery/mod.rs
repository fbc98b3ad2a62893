//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的恢复机制，即L2健康跟踪与健康检查。

pub mod health;
