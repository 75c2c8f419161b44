//! Prometheus 指标
//!
//! 记录函数在未安装 recorder 时是空操作，测试里可以直接调用。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 指标名称
pub mod names {
    pub const HTTP_REQUESTS: &str = "http_requests_total";
    pub const HTTP_DURATION: &str = "http_request_duration_seconds";
    pub const DISPATCH_STARTED: &str = "notification_dispatch_started_total";
    pub const DISPATCH: &str = "notification_dispatch_total";
    pub const DISPATCH_DURATION: &str = "notification_dispatch_duration_seconds";
    pub const PERSISTENCE_WARNINGS: &str = "notification_persistence_warnings_total";
    pub const EVENTS: &str = "notification_events_total";
    pub const STORE_HEALTH: &str = "store_health_status";
    pub const STORE_CONNECTIONS: &str = "store_connections";
}

/// 渠道调用通常在百毫秒级，超时上限默认 10 秒
const DISPATCH_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// 指标服务器句柄
pub struct MetricsHandle {
    _server: tokio::task::JoinHandle<()>,
}

/// 安装 Prometheus recorder 并在独立端口暴露 `/metrics`
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::DISPATCH_DURATION.to_string()),
            DISPATCH_BUCKETS,
        )?
        .install_recorder()?;

    describe_metrics();
    metrics::counter!("service_starts_total", "service" => config.service_name.clone()).increment(1);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server = serve_metrics(addr, handle).await?;

    Ok(MetricsHandle { _server: server })
}

fn describe_metrics() {
    metrics::describe_counter!(names::HTTP_REQUESTS, "HTTP 请求数");
    metrics::describe_histogram!(names::HTTP_DURATION, "HTTP 请求耗时（秒）");
    metrics::describe_counter!(names::DISPATCH_STARTED, "进入投递流水线的通知数");
    metrics::describe_counter!(names::DISPATCH, "通知投递次数，按来源、渠道和结果区分");
    metrics::describe_histogram!(names::DISPATCH_DURATION, "渠道调用耗时（秒）");
    metrics::describe_counter!(names::PERSISTENCE_WARNINGS, "投递完成后状态回写失败的次数");
    metrics::describe_counter!(names::EVENTS, "消费的用户事件数");
    metrics::describe_gauge!(names::STORE_HEALTH, "存储后端健康状态（1 = 健康）");
    metrics::describe_gauge!(names::STORE_CONNECTIONS, "存储连接池占用");
}

async fn serve_metrics(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new().route("/metrics", get(move || std::future::ready(handle.render())));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "指标服务已监听");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "指标服务异常退出");
        }
    }))
}

/// 记录 HTTP 请求，path 为路由模板
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        names::HTTP_REQUESTS,
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        names::HTTP_DURATION,
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录一条通知进入投递流水线
pub fn record_notification_dispatch_started(source: &str, channel: &str) {
    metrics::counter!(
        names::DISPATCH_STARTED,
        "source" => source.to_string(),
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// 记录一次通知投递
///
/// `source` 区分直接发送、事件驱动与人工重试。
pub fn record_notification_dispatch(source: &str, channel: &str, status: &str, duration_secs: f64) {
    metrics::counter!(
        names::DISPATCH,
        "source" => source.to_string(),
        "channel" => channel.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        names::DISPATCH_DURATION,
        "source" => source.to_string(),
        "channel" => channel.to_string()
    )
    .record(duration_secs);
}

/// 记录投递后状态回写失败
pub fn record_persistence_warning(channel: &str) {
    metrics::counter!(
        names::PERSISTENCE_WARNINGS,
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// 记录消费到的事件
pub fn record_event_consumed(event_type: &str, status: &str) {
    metrics::counter!(
        names::EVENTS,
        "event_type" => event_type.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 更新存储健康状态
pub fn set_store_health(backend: &str, healthy: bool) {
    metrics::gauge!(names::STORE_HEALTH, "backend" => backend.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

/// 更新连接池状态
pub fn set_store_connections(backend: &str, state: &str, count: f64) {
    metrics::gauge!(
        names::STORE_CONNECTIONS,
        "backend" => backend.to_string(),
        "state" => state.to_string()
    )
    .set(count);
}
