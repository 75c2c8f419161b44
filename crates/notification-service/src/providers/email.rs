//! Email 渠道
//!
//! 当前为模拟实现，只校验地址并记录日志；接入 SMTP 或邮件服务商时替换 `send` 内部即可。

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use super::{DeliveryProvider, DeliveryReceipt, delivery_error};
use crate::error::Result;
use crate::models::NotificationType;

pub struct EmailProvider {
    from_address: String,
}

impl EmailProvider {
    pub fn new(from_address: String) -> Self {
        Self { from_address }
    }
}

fn is_plausible_address(address: &str) -> bool {
    match address.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    }
}

#[async_trait]
impl DeliveryProvider for EmailProvider {
    fn channel(&self) -> NotificationType {
        NotificationType::Email
    }

    async fn send(&self, destination: &str, subject: &str, body: &str) -> Result<DeliveryReceipt> {
        if !is_plausible_address(destination) {
            return Err(delivery_error(
                NotificationType::Email,
                format!("invalid email address: {}", destination),
            ));
        }

        let message_id = format!("email_{}", Uuid::now_v7());

        info!(
            channel = "EMAIL",
            from = %self.from_address,
            to = %destination,
            subject = %subject,
            content_length = body.len(),
            message_id = %message_id,
            "模拟发送邮件通知"
        );

        Ok(DeliveryReceipt { message_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotificationError;

    #[tokio::test]
    async fn test_send_success() {
        let provider = EmailProvider::new("no-reply@example.com".to_string());
        let receipt = provider
            .send("alice@example.com", "Welcome", "<p>Hi</p>")
            .await
            .unwrap();
        assert!(receipt.message_id.starts_with("email_"));
    }

    #[tokio::test]
    async fn test_invalid_address_is_delivery_error() {
        let provider = EmailProvider::new("no-reply@example.com".to_string());
        for bad in ["", "alice", "@example.com", "alice@localhost"] {
            let err = provider.send(bad, "s", "b").await.unwrap_err();
            assert!(
                matches!(err, NotificationError::Delivery { channel: NotificationType::Email, .. }),
                "{bad:?} should be rejected"
            );
        }
    }
}
