//! 用户事件路由表
//!
//! 每种事件对应一个模板名、固定标题和一个解码函数。解码函数把原始载荷
//! 转成统一的 [`EventContext`]，之后由编排服务走同一条渲染、持久化、投递流水线。

use chrono::{Datelike, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{NotificationError, Result};

// ==================== 事件类型 ====================

pub const USER_REGISTERED: &str = "user.registered";
pub const USER_VERIFIED: &str = "user.verified";
pub const USER_PASSWORD_RESET: &str = "user.password.reset";
pub const USER_PASSWORD_CHANGED: &str = "user.password.changed";

// ==================== 事件载荷 ====================

/// 用户事件的公共访问接口
trait UserEvent: DeserializeOwned {
    fn user_id(&self) -> &str;
    fn email(&self) -> &str;

    /// 事件特有的渲染变量
    fn extend_context(&self, _data: &mut Map<String, Value>) {}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRegisteredEvent {
    #[serde(default)]
    user_id: String,
    email: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    #[allow(dead_code)]
    last_name: String,
}

impl UserEvent for UserRegisteredEvent {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn email(&self) -> &str {
        &self.email
    }

    fn extend_context(&self, data: &mut Map<String, Value>) {
        data.insert("FirstName".to_string(), Value::from(self.first_name.clone()));
        data.insert("Username".to_string(), Value::from(self.username.clone()));
    }
}

/// 只携带用户标识的事件（邮箱验证、密码修改）
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserAccountEvent {
    #[serde(default)]
    user_id: String,
    email: String,
}

impl UserEvent for UserAccountEvent {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn email(&self) -> &str {
        &self.email
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResetEvent {
    #[serde(default)]
    user_id: String,
    email: String,
    reset_link: String,
}

impl UserEvent for PasswordResetEvent {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn email(&self) -> &str {
        &self.email
    }

    fn extend_context(&self, data: &mut Map<String, Value>) {
        data.insert("ResetLink".to_string(), Value::from(self.reset_link.clone()));
    }
}

// ==================== 路由 ====================

/// 解码后的事件，渲染和建通知所需的全部信息
#[derive(Debug, Clone, PartialEq)]
pub struct EventContext {
    pub user_id: String,
    pub recipient: String,
    pub data: Map<String, Value>,
}

/// 一条事件路由
pub struct EventRoute {
    pub event_type: &'static str,
    pub template_name: &'static str,
    pub subject: &'static str,
    decode: fn(&[u8]) -> Result<EventContext>,
}

impl EventRoute {
    /// 解码载荷，失败时不做任何后续处理
    pub fn decode(&self, payload: &[u8]) -> Result<EventContext> {
        (self.decode)(payload)
    }
}

impl std::fmt::Debug for EventRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRoute")
            .field("event_type", &self.event_type)
            .field("template_name", &self.template_name)
            .finish()
    }
}

fn decode_as<E: UserEvent>(payload: &[u8]) -> Result<EventContext> {
    let event: E =
        serde_json::from_slice(payload).map_err(|e| NotificationError::Decode(e.to_string()))?;

    let recipient = event.email().trim().to_string();
    if recipient.is_empty() {
        return Err(NotificationError::Validation("事件缺少 email".to_string()));
    }

    let mut data = Map::new();
    data.insert("Email".to_string(), Value::from(recipient.clone()));
    data.insert("Year".to_string(), Value::from(Utc::now().year()));
    event.extend_context(&mut data);

    Ok(EventContext {
        user_id: event.user_id().to_string(),
        recipient,
        data,
    })
}

pub const EVENT_ROUTES: &[EventRoute] = &[
    EventRoute {
        event_type: USER_REGISTERED,
        template_name: "welcome.html",
        subject: "Welcome to Our Service",
        decode: decode_as::<UserRegisteredEvent>,
    },
    EventRoute {
        event_type: USER_VERIFIED,
        template_name: "email_verified.html",
        subject: "Email Verification Successful",
        decode: decode_as::<UserAccountEvent>,
    },
    EventRoute {
        event_type: USER_PASSWORD_RESET,
        template_name: "password_reset.html",
        subject: "Password Reset Request",
        decode: decode_as::<PasswordResetEvent>,
    },
    EventRoute {
        event_type: USER_PASSWORD_CHANGED,
        template_name: "password_changed.html",
        subject: "Password Changed Successfully",
        decode: decode_as::<UserAccountEvent>,
    },
];

/// 按事件类型查找路由
pub fn route_for(event_type: &str) -> Result<&'static EventRoute> {
    EVENT_ROUTES
        .iter()
        .find(|r| r.event_type == event_type)
        .ok_or_else(|| NotificationError::UnknownEventType(event_type.to_string()))
}
