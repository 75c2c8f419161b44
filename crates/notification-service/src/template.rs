//! 模板渲染
//!
//! 按名称解析启用中的模板，把 `{{Variable}}`（也接受 `{{ .Variable }}`）替换为数据中的值。
//! 数据里缺失的变量保留原样并记录警告。
//!
//! ```ignore
//! let renderer = TemplateRenderer::new(templates);
//! let data = serde_json::json!({ "FirstName": "Ada" });
//! let msg = renderer.render("welcome.html", data.as_object().unwrap(), None).await?;
//! ```

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{NotificationError, Result};
use crate::models::{NotificationType, Template};
use crate::repository::TemplateRepository;

static VARIABLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*\.?(\w+)\s*\}\}").expect("template variable pattern is valid")
});

/// 渲染结果
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub template_id: Uuid,
    pub template_type: NotificationType,
    pub subject: String,
    pub content: String,
}

/// 将 JSON 值转为替换文本，字符串不带引号，null 为空串
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// 变量替换
pub fn substitute(template: &str, data: &Map<String, Value>) -> String {
    VARIABLE_PATTERN
        .replace_all(template, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match data.get(var_name) {
                Some(value) => value_to_string(value),
                None => {
                    warn!(variable = var_name, "模板变量未找到，保留原样");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// 模板渲染器
#[derive(Clone)]
pub struct TemplateRenderer {
    templates: Arc<dyn TemplateRepository>,
}

impl TemplateRenderer {
    pub fn new(templates: Arc<dyn TemplateRepository>) -> Self {
        Self { templates }
    }

    /// 解析启用中的模板
    ///
    /// `locale` 目前只记录日志，所有语言共用同一模板。
    pub async fn get_template(&self, name: &str, locale: Option<&str>) -> Result<Template> {
        if let Some(locale) = locale {
            debug!(template = name, locale, "暂不支持多语言模板，使用默认模板");
        }

        self.templates
            .find_by_name(name)
            .await?
            .ok_or_else(|| NotificationError::TemplateNotFound(name.to_string()))
    }

    pub async fn render(
        &self,
        name: &str,
        data: &Map<String, Value>,
        locale: Option<&str>,
    ) -> Result<RenderedMessage> {
        let template = self.get_template(name, locale).await?;

        let missing: Vec<&str> = template
            .variables
            .iter()
            .map(String::as_str)
            .filter(|v| !data.contains_key(*v))
            .collect();
        if !missing.is_empty() {
            warn!(template = name, ?missing, "渲染数据缺少模板声明的变量");
        }

        Ok(RenderedMessage {
            template_id: template.id,
            template_type: template.template_type,
            subject: substitute(&template.subject, data),
            content: substitute(&template.content, data),
        })
    }
}

// ==================== 内置模板 ====================

/// 事件路由依赖的内置邮件模板
pub fn default_templates() -> Vec<Template> {
    vec![
        Template::new(
            "welcome.html",
            NotificationType::Email,
            "Welcome to Our Service",
            "<h1>Welcome, {{FirstName}}!</h1>\
             <p>Your account <strong>{{Username}}</strong> ({{Email}}) is ready.</p>\
             <footer>&copy; {{Year}}</footer>",
        )
        .with_variables(["FirstName", "Username", "Email", "Year"]),
        Template::new(
            "email_verified.html",
            NotificationType::Email,
            "Email Verification Successful",
            "<p>The address {{Email}} has been verified.</p>\
             <footer>&copy; {{Year}}</footer>",
        )
        .with_variables(["Email", "Year"]),
        Template::new(
            "password_reset.html",
            NotificationType::Email,
            "Password Reset Request",
            "<p>A password reset was requested for {{Email}}.</p>\
             <p><a href=\"{{ResetLink}}\">Reset your password</a></p>\
             <footer>&copy; {{Year}}</footer>",
        )
        .with_variables(["Email", "ResetLink", "Year"]),
        Template::new(
            "password_changed.html",
            NotificationType::Email,
            "Password Changed Successfully",
            "<p>The password for {{Email}} was changed. \
             If this was not you, contact support immediately.</p>\
             <footer>&copy; {{Year}}</footer>",
        )
        .with_variables(["Email", "Year"]),
    ]
}

/// 写入缺失的内置模板，已存在启用版本的名称跳过
///
/// 返回新写入的模板数量。
pub async fn seed_default_templates(templates: &dyn TemplateRepository) -> Result<usize> {
    let mut seeded = 0;
    for template in default_templates() {
        if templates.find_by_name(&template.name).await?.is_some() {
            continue;
        }
        template.validate()?;
        templates.save(&template).await?;
        info!(template = %template.name, "内置模板已写入");
        seeded += 1;
    }
    Ok(seeded)
}
