//! 请求与响应 DTO

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::Result;
use crate::models::{Notification, NotificationType, Priority};

/// 历史查询默认页大小
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// API 统一响应
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }
}

/// 直接发送请求
#[derive(Debug, Deserialize, Validate)]
pub struct SendNotificationRequest {
    #[validate(length(min = 1, max = 320, message = "recipient 长度必须在1-320个字符之间"))]
    pub recipient: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    #[serde(default)]
    #[validate(length(max = 255, message = "subject 不能超过255个字符"))]
    pub subject: String,
    #[validate(length(min = 1, message = "content 不能为空"))]
    pub content: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub template_data: HashMap<String, String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SendNotificationRequest {
    /// 转为新通知，类型和优先级在这里解析
    pub fn into_notification(self) -> Result<Notification> {
        let notification_type: NotificationType = self.notification_type.parse()?;
        let priority = match self.priority.as_deref() {
            Some(p) => p.parse()?,
            None => Priority::default(),
        };

        let mut notification =
            Notification::new(notification_type, self.recipient, self.subject, self.content)
                .with_priority(priority)
                .with_template_data(self.template_data);
        notification.metadata = self.metadata;
        Ok(notification)
    }
}

/// 历史查询参数
#[derive(Debug, Deserialize, Validate)]
pub struct HistoryQuery {
    #[validate(length(min = 1, message = "recipient 不能为空"))]
    pub recipient: String,
    #[serde(default = "default_limit")]
    #[validate(range(max = 100, message = "limit 不能超过100"))]
    pub limit: i64,
    #[serde(default)]
    #[validate(range(min = 0, max = 100_000, message = "offset 必须在 0 到 100000 之间"))]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotificationError;
    use crate::models::NotificationStatus;

    fn request() -> SendNotificationRequest {
        serde_json::from_value(serde_json::json!({
            "recipient": "bob@example.com",
            "type": "email",
            "subject": "Hi",
            "content": "<p>Hello</p>",
            "priority": "high",
            "metadata": { "campaign": "spring" }
        }))
        .unwrap()
    }

    #[test]
    fn test_into_notification() {
        let n = request().into_notification().unwrap();
        assert_eq!(n.notification_type, NotificationType::Email);
        assert_eq!(n.priority, Priority::High);
        assert_eq!(n.status, NotificationStatus::Pending);
        assert_eq!(n.metadata["campaign"], "spring");
    }

    #[test]
    fn test_unknown_type_is_unsupported() {
        let mut req = request();
        req.notification_type = "fax".to_string();
        assert!(matches!(
            req.into_notification(),
            Err(NotificationError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_request_validation() {
        let mut req = request();
        assert!(req.validate().is_ok());
        req.content.clear();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_history_query_defaults() {
        let q: HistoryQuery = serde_json::from_value(serde_json::json!({ "recipient": "a" })).unwrap();
        assert_eq!(q.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(q.offset, 0);
    }

    #[test]
    fn test_history_query_offset_bounds() {
        let query = |offset: i64| -> HistoryQuery {
            serde_json::from_value(serde_json::json!({ "recipient": "a", "offset": offset })).unwrap()
        };
        assert!(query(100_000).validate().is_ok());
        assert!(query(-1).validate().is_err());
        assert!(query(i64::MAX).validate().is_err());
    }
}
