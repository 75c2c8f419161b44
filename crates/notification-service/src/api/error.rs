//! HTTP 错误映射

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::NotificationError;

/// HTTP 层错误，包装服务错误并决定状态码
#[derive(Debug)]
pub struct ApiError(pub NotificationError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            NotificationError::Validation(_)
            | NotificationError::Decode(_)
            | NotificationError::UnsupportedType(_)
            | NotificationError::UnknownEventType(_) => StatusCode::BAD_REQUEST,

            NotificationError::NotFound { .. } | NotificationError::TemplateNotFound(_) => {
                StatusCode::NOT_FOUND
            }

            NotificationError::InvalidTransition { .. } => StatusCode::CONFLICT,

            NotificationError::Delivery { .. } => StatusCode::FAILED_DEPENDENCY,

            NotificationError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<NotificationError> for ApiError {
    fn from(err: NotificationError) -> Self {
        Self(err)
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self(NotificationError::Validation(errors.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 存储错误只返回通用提示，详细信息记录日志
        let message = match &self.0 {
            NotificationError::Storage(e) => {
                tracing::error!(error = %e, "存储操作失败");
                "存储暂不可用，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.0.code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotificationStatus, NotificationType};
    use notify_shared::error::SharedError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (NotificationError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (NotificationError::Decode("x".into()), StatusCode::BAD_REQUEST),
            (NotificationError::UnsupportedType("fax".into()), StatusCode::BAD_REQUEST),
            (NotificationError::notification_not_found("1"), StatusCode::NOT_FOUND),
            (NotificationError::TemplateNotFound("t".into()), StatusCode::NOT_FOUND),
            (
                NotificationError::InvalidTransition {
                    from: NotificationStatus::Sent,
                    to: NotificationStatus::Cancelled,
                },
                StatusCode::CONFLICT,
            ),
            (
                NotificationError::Delivery {
                    channel: NotificationType::Email,
                    reason: "bounce".into(),
                },
                StatusCode::FAILED_DEPENDENCY,
            ),
            (
                NotificationError::Storage(SharedError::Internal("down".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError(err).status_code(), expected);
        }
    }
}
