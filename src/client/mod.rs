//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存客户端的接口和实现。

pub mod two_level;

use crate::error::Result;
use crate::serialization::{Serializer, SerializerEnum};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use tracing::instrument;

pub use two_level::TwoLevelClient;

/// 缓存扩展特征
///
/// 在字节接口之上提供类型安全的缓存操作
#[async_trait]
pub trait CacheExt: CacheOps {
    /// 获取缓存值（反序列化）
    ///
    /// 命中但无法反序列化时返回 `CacheError::Serialization`，不会当作未命中。
    #[instrument(skip(self), level = "debug")]
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.get_bytes(key).await? {
            Some(data) => Ok(Some(self.serializer().deserialize(&data)?)),
            None => Ok(None),
        }
    }

    /// 设置缓存值（序列化）
    #[instrument(skip(self, value), level = "debug")]
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = self.serializer().serialize(value)?;
        self.set_bytes(key, bytes).await
    }

    /// 读穿：未命中时调用 `loader` 从主存储加载，加载到值则写回缓存
    ///
    /// `loader` 的错误原样返回；缓存本身的连接故障不会影响加载。
    async fn get_or_load<T, F, Fut>(&self, key: &str, loader: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Option<T>>> + Send,
    {
        if let Some(cached) = self.get::<T>(key).await? {
            return Ok(Some(cached));
        }
        let loaded = loader().await?;
        if let Some(value) = &loaded {
            self.set(key, value).await?;
        }
        Ok(loaded)
    }
}

impl<T: CacheOps + ?Sized> CacheExt for T {}

/// 缓存操作特征
///
/// 领域层通过该接口访问缓存：读穿、写穿、清空与广播清空。
#[async_trait]
pub trait CacheOps: Send + Sync {
    /// 命名空间
    fn namespace(&self) -> &str;

    /// 获取缓存值，两层都未命中时返回 `None`
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// 写入缓存值，完全替换同名条目
    async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// 清空本实例的本地层，并删除共享层中该命名空间下的所有键
    async fn clear_all(&self) -> Result<()>;

    /// 向所有实例广播清空信号，不同步清空本地状态
    async fn publish_clear(&self) -> Result<()>;

    /// 获取序列化器
    fn serializer(&self) -> &SerializerEnum;

    /// 优雅关闭客户端
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
