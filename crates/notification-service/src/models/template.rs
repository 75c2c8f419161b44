//! 消息模板实体
//!
//! 模板按 name 查找，只有 is_active 的版本参与渲染。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::NotificationType;
use super::notification::now;
use crate::error::{NotificationError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub template_type: NotificationType,
    pub subject: String,
    pub content: String,
    /// 声明的占位变量，用于文档和缺失检查
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub version: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    pub fn new(
        name: impl Into<String>,
        template_type: NotificationType,
        subject: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let now = now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            template_type,
            subject: subject.into(),
            content: content.into(),
            variables: Vec::new(),
            metadata: HashMap::new(),
            version: 1,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = variables.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(NotificationError::Validation("模板名称不能为空".to_string()));
        }
        if self.subject.trim().is_empty() {
            return Err(NotificationError::Validation("模板标题不能为空".to_string()));
        }
        if self.content.trim().is_empty() {
            return Err(NotificationError::Validation("模板内容不能为空".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_template_defaults() {
        let t = Template::new("welcome.html", NotificationType::Email, "Hi", "Hello {{Name}}")
            .with_variables(["Name"]);
        assert_eq!(t.version, 1);
        assert!(t.is_active);
        assert_eq!(t.variables, vec!["Name".to_string()]);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_fields() {
        let t = Template::new("", NotificationType::Sms, "s", "c");
        assert!(t.validate().is_err());

        let t = Template::new("otp", NotificationType::Sms, "s", " ");
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_json_shape() {
        let t = Template::new("otp", NotificationType::Sms, "Code", "{{Code}}");
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["type"], "sms");
        assert_eq!(json["is_active"], true);
        assert_eq!(json["variables"], serde_json::json!([]));
    }
}
