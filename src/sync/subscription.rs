//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了失效频道订阅的一次性初始化保护。

use crate::error::{CacheError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use tokio::sync::Mutex;

const UNINITIALIZED: u8 = 0;
const PENDING: u8 = 1;
const SUBSCRIBED: u8 = 2;

/// 订阅状态
///
/// `Uninitialized → SubscriptionPending → Subscribed`，不存在反向迁移。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Uninitialized,
    SubscriptionPending,
    Subscribed,
}

/// 订阅保护
///
/// 并发的首次调用共享同一个进行中的订阅尝试；该尝试失败时，等待它的
/// 调用直接得到失败结果而不再排队重试，所以每个调用最多等待一次尝试。
/// 失败后保持 `SubscriptionPending`，之后的新调用重新尝试。成功后不会再次订阅。
#[derive(Debug, Default)]
pub struct SubscriptionGuard {
    attempt: Mutex<()>,
    state: AtomicU8,
    attempts: AtomicU64,
    failures: AtomicU64,
}

impl SubscriptionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前订阅状态
    pub fn state(&self) -> SubscriptionState {
        match self.state.load(Ordering::Acquire) {
            UNINITIALIZED => SubscriptionState::Uninitialized,
            PENDING => SubscriptionState::SubscriptionPending,
            _ => SubscriptionState::Subscribed,
        }
    }

    /// 实际发起过的订阅尝试次数
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Acquire)
    }

    fn is_subscribed(&self) -> bool {
        self.state.load(Ordering::Acquire) == SUBSCRIBED
    }

    /// 确保订阅已建立
    ///
    /// `subscribe` 最多同时运行一个；已订阅时直接返回。
    pub async fn ensure<F, Fut>(&self, subscribe: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self.is_subscribed() {
            return Ok(());
        }
        let failures_seen = self.failures.load(Ordering::Acquire);
        let _attempt = self.attempt.lock().await;
        if self.is_subscribed() {
            return Ok(());
        }
        if self.failures.load(Ordering::Acquire) != failures_seen {
            return Err(CacheError::Subscription(
                "concurrent subscription attempt failed".to_string(),
            ));
        }

        self.state.store(PENDING, Ordering::Release);
        self.attempts.fetch_add(1, Ordering::AcqRel);
        match subscribe().await {
            Ok(()) => {
                self.state.store(SUBSCRIBED, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }
}
