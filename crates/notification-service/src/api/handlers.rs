//! 通知 API 处理器

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::AppState;
use super::dto::{ApiResponse, HistoryQuery, SendNotificationRequest};
use super::error::ApiError;
use crate::models::Notification;

type ApiResult<T> = Result<T, ApiError>;

/// 直接发送通知
///
/// POST /api/v1/notifications
pub async fn send_notification(
    State(state): State<AppState>,
    Json(req): Json<SendNotificationRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Notification>>)> {
    req.validate()?;
    let notification = req.into_notification()?;

    let sent = state.service.send_notification(notification).await?;
    info!(notification_id = %sent.id, recipient = %sent.recipient, "通知已受理");

    Ok((StatusCode::CREATED, Json(ApiResponse::success(sent))))
}

/// 查询单条通知
///
/// GET /api/v1/notifications/{id}
pub async fn get_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Notification>>> {
    let notification = state.service.get_notification(id).await?;
    Ok(Json(ApiResponse::success(notification)))
}

/// 按收件人分页查询历史，按创建时间倒序
///
/// GET /api/v1/notifications?recipient=&limit=&offset=
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<ApiResponse<Vec<Notification>>>> {
    query.validate()?;
    let history = state
        .service
        .get_notification_history(&query.recipient, query.limit, query.offset)
        .await?;
    Ok(Json(ApiResponse::success(history)))
}

/// 重试失败的通知
///
/// POST /api/v1/notifications/{id}/retry
pub async fn retry_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Notification>>> {
    let notification = state.service.retry_notification(id).await?;
    Ok(Json(ApiResponse::success(notification)))
}

/// 取消待发送的通知
///
/// POST /api/v1/notifications/{id}/cancel
pub async fn cancel_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Notification>>> {
    let notification = state.service.cancel_notification(id).await?;
    Ok(Json(ApiResponse::success(notification)))
}

/// 存储健康状态
///
/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.health.read().clone();
    let code = if status.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}
