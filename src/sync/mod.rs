//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的同步机制，包括跨实例失效总线和一次性订阅保护。

pub mod invalidation;
pub mod subscription;
