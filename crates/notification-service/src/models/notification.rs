//! 通知实体
//!
//! 一条通知对应一次投递尝试记录。实体只做纯内存的状态变更，
//! 持久化由仓储负责，状态流转由编排服务驱动。

use std::collections::HashMap;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{NotificationStatus, NotificationType, Priority};
use crate::error::{NotificationError, Result};

/// 当前时间，截断到微秒
///
/// PostgreSQL TIMESTAMPTZ 只保留微秒精度，截断后写入再读出的值完全一致。
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// 通知记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub subject: String,
    pub content: String,
    pub status: NotificationStatus,
    pub priority: Priority,
    pub template_id: Option<Uuid>,
    pub template_type: Option<NotificationType>,
    #[serde(default)]
    pub template_data: HashMap<String, String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// 创建待发送的通知，分配新的 id
    pub fn new(
        notification_type: NotificationType,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let now = now();
        Self {
            id: Uuid::now_v7(),
            recipient: recipient.into(),
            notification_type,
            subject: subject.into(),
            content: content.into(),
            status: NotificationStatus::Pending,
            priority: Priority::default(),
            template_id: None,
            template_type: None,
            template_data: HashMap::new(),
            metadata: HashMap::new(),
            error_message: String::new(),
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// 绑定模板，冗余保存模板类型以便按类型过滤
    pub fn with_template(mut self, template_id: Uuid, template_type: NotificationType) -> Self {
        self.template_id = Some(template_id);
        self.template_type = Some(template_type);
        self
    }

    pub fn with_template_data(mut self, data: HashMap<String, String>) -> Self {
        self.template_data = data;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 持久化前的校验
    pub fn validate(&self) -> Result<()> {
        if self.recipient.trim().is_empty() {
            return Err(NotificationError::Validation("recipient 不能为空".to_string()));
        }
        if self.template_id.is_some() && self.template_type.is_none() {
            return Err(NotificationError::Validation(
                "绑定模板时 template_type 不能为空".to_string(),
            ));
        }
        Ok(())
    }

    fn transition(&mut self, next: NotificationStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(NotificationError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now();
        Ok(())
    }

    /// 标记为已发送，清空上次失败原因
    pub fn mark_sent(&mut self) -> Result<()> {
        self.transition(NotificationStatus::Sent)?;
        self.error_message.clear();
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(NotificationStatus::Failed)?;
        self.error_message = reason.into();
        Ok(())
    }

    pub fn mark_delivered(&mut self) -> Result<()> {
        self.transition(NotificationStatus::Delivered)
    }

    /// 运营取消，只对尚未发送的通知有效
    pub fn cancel(&mut self) -> Result<()> {
        self.transition(NotificationStatus::Cancelled)
    }

    pub fn increment_retry_count(&mut self) {
        self.retry_count += 1;
        self.updated_at = now();
    }
}
