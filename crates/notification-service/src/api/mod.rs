//! HTTP API
//!
//! | 方法 | 路径 | 说明 |
//! |------|------|------|
//! | POST | `/api/v1/notifications` | 直接发送 |
//! | GET | `/api/v1/notifications?recipient=&limit=&offset=` | 收件人历史 |
//! | GET | `/api/v1/notifications/{id}` | 单条查询 |
//! | POST | `/api/v1/notifications/{id}/retry` | 重试失败通知 |
//! | POST | `/api/v1/notifications/{id}/cancel` | 取消待发送通知 |
//! | GET | `/health` | 存储健康状态 |

pub mod dto;
pub mod error;
mod handlers;

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use notify_shared::health::HealthStatus;
use notify_shared::observability::middleware::{http_metrics, request_id};
use parking_lot::RwLock;
use tower_http::trace::TraceLayer;

use crate::service::NotificationService;

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<NotificationService>,
    pub health: Arc<RwLock<HealthStatus>>,
}

impl AppState {
    pub fn new(service: Arc<NotificationService>, health: Arc<RwLock<HealthStatus>>) -> Self {
        Self { service, health }
    }
}

pub fn router(state: AppState) -> Router {
    let notifications = Router::new()
        .route(
            "/notifications",
            post(handlers::send_notification).get(handlers::list_notifications),
        )
        .route("/notifications/{id}", get(handlers::get_notification))
        .route(
            "/notifications/{id}/retry",
            post(handlers::retry_notification),
        )
        .route(
            "/notifications/{id}/cancel",
            post(handlers::cancel_notification),
        );

    Router::new()
        .nest("/api/v1", notifications)
        .route("/health", get(handlers::health))
        .layer(middleware::from_fn(http_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id))
        .with_state(state)
}
