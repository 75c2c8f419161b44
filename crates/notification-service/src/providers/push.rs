//! 推送渠道（模拟实现）
//!
//! 生产环境替换为 APNs / FCM 调用。

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use super::{DeliveryProvider, DeliveryReceipt, delivery_error};
use crate::error::Result;
use crate::models::NotificationType;

pub struct PushProvider {
    app_id: String,
}

impl PushProvider {
    pub fn new(app_id: String) -> Self {
        Self { app_id }
    }
}

#[async_trait]
impl DeliveryProvider for PushProvider {
    fn channel(&self) -> NotificationType {
        NotificationType::Push
    }

    async fn send(&self, device_token: &str, title: &str, message: &str) -> Result<DeliveryReceipt> {
        if device_token.trim().is_empty() || device_token.contains(char::is_whitespace) {
            return Err(delivery_error(
                NotificationType::Push,
                "invalid device token",
            ));
        }

        let message_id = format!("push_{}", Uuid::now_v7());

        info!(
            channel = "PUSH",
            app_id = %self.app_id,
            device_token = %device_token,
            title = %title,
            body_length = message.len(),
            message_id = %message_id,
            "模拟发送推送通知"
        );

        Ok(DeliveryReceipt { message_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_send() {
        let provider = PushProvider::new("app".to_string());
        assert!(provider.send("fcm-token-abc", "Hi", "body").await.is_ok());
        assert!(provider.send("bad token", "Hi", "body").await.is_err());
    }
}
