//! HTTP 接口测试
//!
//! 通过 `tower::ServiceExt::oneshot` 直接驱动路由，内存存储 + 内置渠道。

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use notification_service::api::{AppState, router};
use notification_service::models::{Notification, NotificationType};
use notification_service::providers::ProviderRegistry;
use notification_service::repository::NotificationRepository;
use notification_service::repository::memory::{
    InMemoryNotificationRepository, InMemoryTemplateRepository,
};
use notification_service::service::NotificationService;
use notify_shared::config::{DeliveryConfig, HealthConfig};
use notify_shared::health::{AlwaysHealthy, HealthChecker};
use serde_json::{Value, json};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    notifications: Arc<InMemoryNotificationRepository>,
}

fn app() -> TestApp {
    let notifications = Arc::new(InMemoryNotificationRepository::new());
    let service = NotificationService::new(
        notifications.clone(),
        Arc::new(InMemoryTemplateRepository::new()),
        ProviderRegistry::with_defaults(&DeliveryConfig::default()),
    );
    let checker = HealthChecker::new(Arc::new(AlwaysHealthy), &HealthConfig::default());

    TestApp {
        router: router(AppState::new(Arc::new(service), checker.status_handle())),
        notifications,
    }
}

async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn send_then_fetch() {
    let app = app();

    let (status, body) = call(
        &app.router,
        post_json(
            "/api/v1/notifications",
            json!({
                "recipient": "judy@example.com",
                "type": "email",
                "subject": "Hello",
                "content": "<p>Hi</p>",
                "priority": "high"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "sent");
    assert_eq!(body["data"]["priority"], "high");

    let id = body["data"]["id"].as_str().unwrap().to_string();
    let (status, body) = call(&app.router, get(&format!("/api/v1/notifications/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["recipient"], "judy@example.com");
    assert_eq!(body["data"]["type"], "email");
    assert_eq!(body["data"]["error_message"], "");
}

#[tokio::test]
async fn history_is_paginated() {
    let app = app();
    for i in 0..3 {
        let (status, _) = call(
            &app.router,
            post_json(
                "/api/v1/notifications",
                json!({
                    "recipient": "+15550100",
                    "type": "sms",
                    "content": format!("code {}", i)
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = call(
        &app.router,
        get("/api/v1/notifications?recipient=%2B15550100&limit=2"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (_, body) = call(
        &app.router,
        get("/api/v1/notifications?recipient=%2B15550100&limit=2&offset=2"),
    )
    .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = call(&app.router, get("/api/v1/notifications?recipient=nobody")).await;
    assert_eq!(body["data"], json!([]));

    let (status, body) = call(
        &app.router,
        get("/api/v1/notifications?recipient=nobody&offset=9223372036854775807"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn error_kinds_map_to_status_codes() {
    let app = app();

    // 未知渠道
    let (status, body) = call(
        &app.router,
        post_json(
            "/api/v1/notifications",
            json!({ "recipient": "a@example.com", "type": "fax", "content": "x" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "UNSUPPORTED_TYPE");

    // 参数校验
    let (status, body) = call(
        &app.router,
        post_json(
            "/api/v1/notifications",
            json!({ "recipient": "", "type": "email", "content": "x" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    // 渠道拒绝：记录保存为 Failed
    let (status, body) = call(
        &app.router,
        post_json(
            "/api/v1/notifications",
            json!({ "recipient": "not-an-address", "type": "email", "content": "x" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FAILED_DEPENDENCY);
    assert_eq!(body["code"], "DELIVERY_FAILED");
    assert_eq!(app.notifications.len(), 1);

    // 不存在
    let (status, body) = call(
        &app.router,
        get(&format!("/api/v1/notifications/{}", uuid::Uuid::now_v7())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn retry_and_cancel_enforce_status() {
    let app = app();

    let pending = Notification::new(NotificationType::Push, "device-token-1", "Title", "Body");
    app.notifications.save(&pending).await.unwrap();

    // Pending 不能重试
    let (status, body) = call(
        &app.router,
        post_json(&format!("/api/v1/notifications/{}/retry", pending.id), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_STATUS_TRANSITION");

    let (status, body) = call(
        &app.router,
        post_json(&format!("/api/v1/notifications/{}/cancel", pending.id), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");

    // 失败的通知可以重试
    let mut failed = Notification::new(NotificationType::Push, "device-token-2", "Title", "Body");
    failed.mark_failed("token expired").unwrap();
    app.notifications.save(&failed).await.unwrap();

    let (status, body) = call(
        &app.router,
        post_json(&format!("/api/v1/notifications/{}/retry", failed.id), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "sent");
    assert_eq!(body["data"]["retry_count"], 1);
}

#[tokio::test]
async fn health_reports_store_status() {
    let app = app();
    let (status, body) = call(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["backend"], "memory");
    assert_eq!(body["healthy"], true);
}

#[tokio::test]
async fn request_id_is_echoed() {
    let app = app();
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-123");
}
