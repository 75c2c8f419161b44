//! 通知服务错误类型
//!
//! 错误分类决定调用方的处理策略：HTTP 层据此映射状态码，
//! 消费者据此决定重试（存储故障）还是放弃（解码、路由、投递失败）。

use notify_shared::error::SharedError;
use thiserror::Error;

use crate::models::{NotificationStatus, NotificationType};

#[derive(Debug, Error)]
pub enum NotificationError {
    // ==================== 输入错误 ====================
    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error("事件解码失败: {0}")]
    Decode(String),

    // ==================== 路由错误 ====================
    #[error("不支持的通知类型: {0}")]
    UnsupportedType(String),

    #[error("未知事件类型: {0}")]
    UnknownEventType(String),

    #[error("通知模板未找到: {0}")]
    TemplateNotFound(String),

    // ==================== 状态错误 ====================
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("非法状态流转: {from} -> {to}")]
    InvalidTransition {
        from: NotificationStatus,
        to: NotificationStatus,
    },

    // ==================== 外部错误 ====================
    #[error("通知发送失败: 渠道={channel}, 原因={reason}")]
    Delivery {
        channel: NotificationType,
        reason: String,
    },

    #[error(transparent)]
    Storage(#[from] SharedError),
}

pub type Result<T> = std::result::Result<T, NotificationError>;

impl NotificationError {
    pub fn notification_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "notification",
            id: id.to_string(),
        }
    }

    pub fn template_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "template",
            id: id.to_string(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Decode(_) => "DECODE_ERROR",
            Self::UnsupportedType(_) => "UNSUPPORTED_TYPE",
            Self::UnknownEventType(_) => "UNKNOWN_EVENT_TYPE",
            Self::TemplateNotFound(_) => "TEMPLATE_NOT_FOUND",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::Delivery { .. } => "DELIVERY_FAILED",
            Self::Storage(e) => e.code(),
        }
    }

    /// 是否为可重试错误
    ///
    /// 投递失败不重试：渠道调用不保证幂等，盲目重试可能重复下发。
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// 记录到通知上的失败原因
    pub fn failure_reason(&self) -> String {
        match self {
            Self::Delivery { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for NotificationError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(SharedError::Database(err))
    }
}

impl From<redis::RedisError> for NotificationError {
    fn from(err: redis::RedisError) -> Self {
        Self::Storage(SharedError::Redis(err))
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(SharedError::Serialization(err))
    }
}
