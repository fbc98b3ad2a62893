//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的日志与链路追踪初始化。

use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// 未设置 `RUST_LOG` 时使用的过滤规则
pub const DEFAULT_FILTER: &str = "fleetcache=info";

/// 初始化 tracing
///
/// 组合控制台输出、`RUST_LOG` 过滤与 OpenTelemetry layer。应在进程启动时调用一次；
/// 已存在全局 subscriber 时静默跳过，由应用层决定最终的初始化方式。
///
/// # 参数
///
/// * `service_name` - 服务名称，用作 tracer 名称
/// * `endpoint` - OTLP 收集器端点，目前仅记录在日志中
pub fn init_tracing(service_name: &str, endpoint: Option<&str>) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // 未配置 exporter 时 provider 不导出任何 span
    let provider = SdkTracerProvider::builder().build();
    global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(service_name.to_string());

    let subscriber = Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(tracing_opentelemetry::layer().with_tracer(tracer));

    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        if let Some(endpoint) = endpoint {
            tracing::debug!(endpoint, "OTLP exporter is not configured, spans stay local");
        }
    }
}
