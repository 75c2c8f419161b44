//! 投递渠道
//!
//! 每个渠道只暴露一个 `send(目标, 主文本, 正文)` 操作，编排服务按通知类型选取渠道。
//!
//! ## 支持的渠道
//!
//! - **Email**: 主文本为邮件标题
//! - **SMS**: 主文本忽略，只发送正文
//! - **Push**: 目标为设备 token，主文本为推送标题

mod email;
mod push;
mod sms;

pub use email::EmailProvider;
pub use push::PushProvider;
pub use sms::SmsProvider;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use notify_shared::config::DeliveryConfig;
use serde::Serialize;

use crate::error::{NotificationError, Result};
use crate::models::NotificationType;

/// 渠道受理回执
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    /// 渠道返回的消息标识
    pub message_id: String,
}

/// 投递渠道 trait
///
/// 失败时返回 `NotificationError::Delivery`，reason 会原样记录到通知上。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryProvider: Send + Sync {
    fn channel(&self) -> NotificationType;

    async fn send(&self, destination: &str, primary_text: &str, body: &str)
    -> Result<DeliveryReceipt>;
}

/// 渠道注册表
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<NotificationType, Arc<dyn DeliveryProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册三种内置渠道
    pub fn with_defaults(config: &DeliveryConfig) -> Self {
        Self::new()
            .register(Arc::new(EmailProvider::new(config.email_from.clone())))
            .register(Arc::new(SmsProvider::new(config.sms_sender_id.clone())))
            .register(Arc::new(PushProvider::new(config.push_app_id.clone())))
    }

    /// 按渠道自报的类型注册，同类型后注册的覆盖先注册的
    pub fn register(mut self, provider: Arc<dyn DeliveryProvider>) -> Self {
        self.providers.insert(provider.channel(), provider);
        self
    }

    pub fn resolve(&self, notification_type: NotificationType) -> Result<Arc<dyn DeliveryProvider>> {
        self.providers
            .get(&notification_type)
            .cloned()
            .ok_or_else(|| NotificationError::UnsupportedType(notification_type.to_string()))
    }
}

pub(crate) fn delivery_error(channel: NotificationType, reason: impl Into<String>) -> NotificationError {
    NotificationError::Delivery {
        channel,
        reason: reason.into(),
    }
}
