//! 可观测性
//!
//! 进程启动时一次性装配日志、追踪和 Prometheus 指标，返回的守卫需要一直持有到进程退出。

pub mod metrics;
pub mod middleware;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;
use serde::Deserialize;

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// 服务名称，用于标识追踪和指标的来源
    pub service_name: String,

    /// OpenTelemetry OTLP 端点，为空时不导出追踪
    pub otlp_endpoint: Option<String>,

    /// Prometheus 指标导出端口
    pub metrics_port: u16,

    /// 是否启动指标导出服务
    pub metrics_enabled: bool,

    /// 默认日志级别，RUST_LOG 存在时以 RUST_LOG 为准
    pub log_level: String,

    /// 是否启用 JSON 格式日志
    pub json_logs: bool,

    /// 追踪采样率，1.0 表示全部采样
    pub trace_sample_ratio: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "notification-service".to_string(),
            otlp_endpoint: None,
            metrics_port: 9090,
            metrics_enabled: true,
            log_level: "info".to_string(),
            json_logs: false,
            trace_sample_ratio: 1.0,
        }
    }
}

impl ObservabilityConfig {
    pub fn with_service_name(mut self, service_name: &str) -> Self {
        self.service_name = service_name.to_string();
        self
    }
}

/// 可观测性守卫，drop 时刷新尚未导出的 span
pub struct ObservabilityGuard {
    _metrics: Option<metrics::MetricsHandle>,
    _tracing: tracing::TracingGuard,
}

/// 先装配日志（后续初始化日志才能输出），再启动指标导出
pub async fn init(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    let tracing = tracing::init(config)?;

    let metrics = if config.metrics_enabled {
        Some(metrics::init(config).await?)
    } else {
        None
    };

    info!(
        service = %config.service_name,
        metrics_port = ?config.metrics_enabled.then_some(config.metrics_port),
        otlp_endpoint = ?config.otlp_endpoint,
        trace_sample_ratio = config.trace_sample_ratio,
        "可观测性已就绪"
    );

    Ok(ObservabilityGuard {
        _metrics: metrics,
        _tracing: tracing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default().with_service_name("svc");
        assert_eq!(config.service_name, "svc");
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
        assert_eq!(config.trace_sample_ratio, 1.0);
    }
}
