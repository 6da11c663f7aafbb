//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了链路追踪初始化：控制台日志加 OpenTelemetry 层。

use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// 初始化 OpenTelemetry Tracing
///
/// 在应用启动时调用一次。日志级别以 `RUST_LOG` 为准，
/// 未设置时使用 `default_level`。已有全局 subscriber 时不做任何事。
///
/// # 参数
///
/// * `service_name` - 上报的服务名称
/// * `default_level` - 默认日志级别
pub fn init_tracing(service_name: &str, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // 未配置导出器时 provider 只在进程内生成 span
    let provider = SdkTracerProvider::builder().build();
    global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(service_name.to_string());

    let subscriber = Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(tracing_opentelemetry::layer().with_tracer(tracer));

    let _ = tracing::subscriber::set_global_default(subscriber);
}
