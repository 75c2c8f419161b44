//! 可观测性集成测试
//!
//! 指标记录函数在未安装 recorder 时应为空操作；HTTP 中间件在真实路由上生效。

use axum::{Router, body::Body, http::Request, middleware, routing::get};
use notify_shared::observability::ObservabilityConfig;
use notify_shared::observability::metrics::{
    record_event_consumed, record_http_request, record_notification_dispatch,
    record_notification_dispatch_started, record_persistence_warning, set_store_connections, set_store_health,
};
use notify_shared::observability::middleware::{REQUEST_ID_HEADER, RequestId, http_metrics, request_id};
use metrics_exporter_prometheus::PrometheusBuilder;
use tower::ServiceExt;

// ============================================================================
// 指标记录
// ============================================================================

#[test]
fn test_recorders_without_exporter() {
    record_http_request("GET", "/api/v1/notifications/{id}", 200, 0.01);
    record_http_request("POST", "/api/v1/notifications", 424, 0.2);
    record_notification_dispatch_started("direct", "email");
    record_notification_dispatch("direct", "email", "sent", 0.05);
    record_notification_dispatch_started("event", "email");
    record_notification_dispatch("event", "email", "failed", 1.5);
    record_notification_dispatch("retry", "sms", "sent", 0.3);
    record_persistence_warning("push");
    record_event_consumed("user.registered", "delivered");
    record_event_consumed("bogus.event", "dead_letter");
    set_store_health("postgres", true);
    set_store_health("redis", false);
    set_store_connections("postgres", "idle", 20.0);
}

#[test]
fn test_dispatch_checkpoints_rendered() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        record_notification_dispatch_started("event", "email");
        record_notification_dispatch_started("event", "email");
        record_notification_dispatch("event", "email", "sent", 0.05);
    });

    let rendered = handle.render();
    let started = rendered
        .lines()
        .find(|line| line.starts_with("notification_dispatch_started_total{"))
        .expect("started counter missing");
    assert!(started.contains(r#"source="event""#));
    assert!(started.contains(r#"channel="email""#));
    assert!(started.ends_with(" 2"));
    assert!(rendered.contains("notification_dispatch_total{"));
}

// ============================================================================
// 配置
// ============================================================================

#[test]
fn test_observability_config_defaults() {
    let config = ObservabilityConfig::default().with_service_name("notification-service");
    assert_eq!(config.service_name, "notification-service");
    assert_eq!(config.metrics_port, 9090);
    assert!(config.metrics_enabled);
    assert!(config.otlp_endpoint.is_none());
}

// ============================================================================
// 中间件
// ============================================================================

fn app() -> Router {
    Router::new()
        .route(
            "/echo",
            get(|axum::Extension(id): axum::Extension<RequestId>| async move {
                id.as_str().to_string()
            }),
        )
        .layer(middleware::from_fn(http_metrics))
        .layer(middleware::from_fn(request_id))
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/echo")
                .header(REQUEST_ID_HEADER, "trace-me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()[REQUEST_ID_HEADER], "trace-me");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"trace-me");
}

#[tokio::test]
async fn test_request_id_is_generated() {
    let response = app()
        .oneshot(Request::builder().uri("/echo").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let id = response.headers()[REQUEST_ID_HEADER].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn test_unmatched_route_still_responds() {
    let response = app()
        .oneshot(Request::builder().uri("/missing").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
}
