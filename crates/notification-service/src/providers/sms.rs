//! 短信渠道（模拟实现）

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use super::{DeliveryProvider, DeliveryReceipt, delivery_error};
use crate::error::Result;
use crate::models::NotificationType;

/// 单条短信正文上限（按字符计）
const MAX_SMS_CHARS: usize = 1_600;

pub struct SmsProvider {
    sender_id: String,
}

impl SmsProvider {
    pub fn new(sender_id: String) -> Self {
        Self { sender_id }
    }
}

/// E.164 风格号码：可选的 `+`，随后 6~15 位数字
fn is_phone_number(destination: &str) -> bool {
    let digits = destination.strip_prefix('+').unwrap_or(destination);
    (6..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

#[async_trait]
impl DeliveryProvider for SmsProvider {
    fn channel(&self) -> NotificationType {
        NotificationType::Sms
    }

    async fn send(&self, destination: &str, _primary_text: &str, body: &str) -> Result<DeliveryReceipt> {
        if !is_phone_number(destination) {
            return Err(delivery_error(
                NotificationType::Sms,
                format!("invalid phone number: {}", destination),
            ));
        }
        let chars = body.chars().count();
        if chars > MAX_SMS_CHARS {
            return Err(delivery_error(
                NotificationType::Sms,
                format!("message too long: {} > {}", chars, MAX_SMS_CHARS),
            ));
        }

        let message_id = format!("sms_{}", Uuid::now_v7());

        info!(
            channel = "SMS",
            sender_id = %self.sender_id,
            to = %destination,
            body = %body,
            message_id = %message_id,
            "模拟发送短信通知"
        );

        Ok(DeliveryReceipt { message_id })
    }
}
