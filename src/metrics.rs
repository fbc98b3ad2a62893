//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的指标收集和监控功能。

use dashmap::DashMap;
use lazy_static::lazy_static;
use std::fmt::Write;
use std::sync::Arc;

/// 指标收集器
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// 请求总数统计
    /// key: "namespace:layer:op:result"
    pub requests_total: Arc<DashMap<String, u64>>,
    /// L2健康状态（0: 降级, 1: 健康, 2: 恢复中）
    pub l2_health_status: Arc<DashMap<String, u8>>,
    /// 操作耗时
    /// key: "namespace:layer:op" -> (total_duration_secs, count)
    pub operation_duration: Arc<DashMap<String, (f64, u64)>>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

impl Metrics {
    /// 记录请求指标
    ///
    /// # 参数
    ///
    /// * `namespace` - 命名空间
    /// * `layer` - 缓存层（L1/L2/BUS）
    /// * `op` - 操作类型（get/set/clear/publish/subscribe）
    /// * `result` - 操作结果（hit/miss/success/error/skipped）
    pub fn record_request(&self, namespace: &str, layer: &str, op: &str, result: &str) {
        let key = format!("{}:{}:{}:{}", namespace, layer, op, result);
        *self.requests_total.entry(key).or_insert(0) += 1;
    }

    /// 记录操作耗时
    pub fn record_duration(&self, namespace: &str, layer: &str, op: &str, duration_secs: f64) {
        let key = format!("{}:{}:{}", namespace, layer, op);
        let mut entry = self.operation_duration.entry(key).or_insert((0.0, 0));
        entry.0 += duration_secs;
        entry.1 += 1;
    }

    /// 设置健康状态
    pub fn set_health(&self, label: &str, status: u8) {
        self.l2_health_status.insert(label.to_string(), status);
    }

    /// 读取请求计数
    pub fn request_count(&self, namespace: &str, layer: &str, op: &str, result: &str) -> u64 {
        let key = format!("{}:{}:{}:{}", namespace, layer, op, result);
        self.requests_total.get(&key).map(|v| *v).unwrap_or(0)
    }
}

/// 获取指标字符串
///
/// 以 Prometheus 文本格式输出所有指标
pub fn get_metrics_string() -> String {
    let metrics = &GLOBAL_METRICS;
    let mut output = String::new();

    for entry in metrics.requests_total.iter() {
        let parts: Vec<&str> = entry.key().rsplitn(4, ':').collect();
        if let [result, op, layer, namespace] = parts[..] {
            let _ = writeln!(
                output,
                "cache_requests_total{{namespace=\"{}\", layer=\"{}\", operation=\"{}\", result=\"{}\"}} {}",
                namespace, layer, op, result, entry.value()
            );
        }
    }
    for entry in metrics.l2_health_status.iter() {
        let _ = writeln!(
            output,
            "cache_l2_health_status{{source=\"{}\"}} {}",
            entry.key(),
            entry.value()
        );
    }
    for entry in metrics.operation_duration.iter() {
        let parts: Vec<&str> = entry.key().rsplitn(3, ':').collect();
        if let [op, layer, namespace] = parts[..] {
            let (total, count) = *entry.value();
            let _ = writeln!(
                output,
                "cache_operation_duration_seconds_sum{{namespace=\"{}\", layer=\"{}\", operation=\"{}\"}} {}",
                namespace, layer, op, total
            );
            let _ = writeln!(
                output,
                "cache_operation_duration_seconds_count{{namespace=\"{}\", layer=\"{}\", operation=\"{}\"}} {}",
                namespace, layer, op, count
            );
        }
    }
    output
}
