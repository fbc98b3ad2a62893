//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了L2共享层的健康状态跟踪与后台健康检查。

use crate::backend::l2::L2Backend;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::timeout;

/// 恢复为健康所需的连续成功次数
pub const RECOVERY_THRESHOLD: u32 = 3;

/// 健康状态枚举
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HealthState {
    /// 健康状态
    Healthy,
    /// 降级状态，`since` 为最近一次失败的时间
    Degraded { since: Instant, failure_count: u32 },
    /// 恢复中状态
    Recovering { since: Instant, success_count: u32 },
}

impl HealthState {
    /// 根据一次探测结果计算下一个状态
    pub fn next(self, is_healthy: bool) -> HealthState {
        match (self, is_healthy) {
            (HealthState::Healthy, true) => HealthState::Healthy,
            (HealthState::Healthy, false) => HealthState::Degraded {
                since: Instant::now(),
                failure_count: 1,
            },
            (HealthState::Degraded { .. }, true) => HealthState::Recovering {
                since: Instant::now(),
                success_count: 1,
            },
            (HealthState::Degraded { failure_count, .. }, false) => HealthState::Degraded {
                since: Instant::now(),
                failure_count: failure_count.saturating_add(1),
            },
            (HealthState::Recovering { .. }, false) => HealthState::Degraded {
                since: Instant::now(),
                failure_count: 1,
            },
            (HealthState::Recovering { since, success_count }, true) => {
                if success_count + 1 >= RECOVERY_THRESHOLD {
                    HealthState::Healthy
                } else {
                    HealthState::Recovering {
                        since,
                        success_count: success_count + 1,
                    }
                }
            }
        }
    }

    fn status_code(&self) -> u8 {
        match self {
            HealthState::Healthy => 1,
            HealthState::Recovering { .. } => 2,
            HealthState::Degraded { .. } => 0,
        }
    }
}

/// 健康状态跟踪器
///
/// 同一个L2连接的所有命名空间共享一个跟踪器。克隆共享同一份状态。
#[derive(Clone, Debug)]
pub struct HealthTracker {
    label: String,
    state: Arc<RwLock<HealthState>>,
}

impl HealthTracker {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: Arc::new(RwLock::new(HealthState::Healthy)),
        }
    }

    /// 当前健康状态
    pub async fn state(&self) -> HealthState {
        *self.state.read().await
    }

    /// 记录一次L2失败
    pub async fn record_failure(&self) {
        self.transition(false).await;
    }

    /// 记录一次L2成功
    pub async fn record_success(&self) {
        if matches!(*self.state.read().await, HealthState::Healthy) {
            return;
        }
        self.transition(true).await;
    }

    /// 是否应当跳过L2
    ///
    /// 降级且距最近一次失败不足 `retry_after` 时跳过；超过后放行一次探测。
    pub async fn should_bypass(&self, retry_after: Duration) -> bool {
        match *self.state.read().await {
            HealthState::Degraded { since, .. } => since.elapsed() < retry_after,
            _ => false,
        }
    }

    async fn transition(&self, is_healthy: bool) {
        let mut guard = self.state.write().await;
        let previous = *guard;
        let next = previous.next(is_healthy);
        *guard = next;
        drop(guard);

        if std::mem::discriminant(&previous) != std::mem::discriminant(&next) {
            match next {
                HealthState::Degraded { .. } => {
                    tracing::warn!("{} L2已降级: {:?} -> {:?}", self.label, previous, next)
                }
                _ => tracing::info!("{} 健康状态变更: {:?} -> {:?}", self.label, previous, next),
            }
            crate::metrics::GLOBAL_METRICS.set_health(&self.label, next.status_code());
        }
    }
}

/// 健康检查器
///
/// 定期 ping L2，并据此推进健康状态。
pub struct HealthChecker {
    l2: Arc<dyn L2Backend>,
    tracker: HealthTracker,
    interval: Duration,
    command_timeout: Duration,
}

impl HealthChecker {
    pub fn new(
        l2: Arc<dyn L2Backend>,
        tracker: HealthTracker,
        interval: Duration,
        command_timeout: Duration,
    ) -> Self {
        Self {
            l2,
            tracker,
            interval,
            command_timeout,
        }
    }

    /// 执行一次探测
    pub async fn check_once(&self) -> bool {
        let is_healthy = match timeout(self.command_timeout, self.l2.ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!("{} ping失败: {}", self.tracker.label, e);
                false
            }
            Err(_) => {
                tracing::debug!(
                    "{} ping超时 ({}ms)",
                    self.tracker.label,
                    self.command_timeout.as_millis()
                );
                false
            }
        };
        if is_healthy {
            self.tracker.record_success().await;
        } else {
            self.tracker.record_failure().await;
        }
        is_healthy
    }

    /// 启动健康检查循环
    pub async fn start(self) {
        let mut interval = tokio::time::interval(self.interval);
        loop {
            interval.tick().await;
            self.check_once().await;
        }
    }
}
