//! 死信队列
//!
//! 处理失败的消息（不可重试的错误，或重试耗尽的瞬时错误）会被写入死信队列，
//! 随后提交原 offset，避免一条坏消息阻塞整个分区。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SharedError;
use crate::kafka::{ConsumerMessage, KafkaProducer};

// ---------------------------------------------------------------------------
// DeadLetterMessage
// ---------------------------------------------------------------------------

/// 死信消息信封
///
/// 包装原始消息，附加失败原因与来源位置，便于人工排查或重放。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterMessage {
    pub source_topic: String,
    pub source_partition: i32,
    pub source_offset: i64,
    pub key: Option<String>,
    /// 原始负载（按 UTF-8 宽松解码）
    pub payload: String,
    pub error_code: String,
    pub error: String,
    /// 放弃前的总尝试次数
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
    pub source_service: String,
}

impl DeadLetterMessage {
    pub fn from_consumer_message(
        msg: &ConsumerMessage,
        error_code: impl Into<String>,
        error: impl Into<String>,
        attempts: u32,
        source_service: impl Into<String>,
    ) -> Self {
        Self {
            source_topic: msg.topic.clone(),
            source_partition: msg.partition,
            source_offset: msg.offset,
            key: msg.key.clone(),
            payload: String::from_utf8_lossy(&msg.payload).into_owned(),
            error_code: error_code.into(),
            error: error.into(),
            attempts,
            failed_at: Utc::now(),
            source_service: source_service.into(),
        }
    }

    /// 死信消息的 key：topic/partition/offset，保证同一条原始消息幂等
    pub fn message_key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.source_topic, self.source_partition, self.source_offset
        )
    }
}

// ---------------------------------------------------------------------------
// DlqProducer
// ---------------------------------------------------------------------------

/// DLQ 生产者
pub struct DlqProducer {
    producer: KafkaProducer,
    topic: String,
}

impl DlqProducer {
    pub fn new(producer: KafkaProducer, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }

    /// 将失败消息发送到死信队列
    pub async fn send(&self, message: &DeadLetterMessage) -> Result<(), SharedError> {
        let key = message.message_key();
        self.producer.send_json(&self.topic, &key, message).await?;

        warn!(
            dlq_topic = %self.topic,
            key = %key,
            error_code = %message.error_code,
            error = %message.error,
            "消息已发送到死信队列"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_dead_letter_from_consumer_message() {
        let msg = ConsumerMessage {
            topic: "user.events".to_string(),
            partition: 2,
            offset: 17,
            key: Some("user.registered".to_string()),
            payload: br#"{"userId":"u-1"}"#.to_vec(),
            timestamp: None,
            headers: HashMap::new(),
        };

        let dead = DeadLetterMessage::from_consumer_message(
            &msg,
            "DECODE_ERROR",
            "missing field `email`",
            1,
            "notification-service",
        );

        assert_eq!(dead.message_key(), "user.events/2/17");
        assert_eq!(dead.payload, r#"{"userId":"u-1"}"#);
        assert_eq!(dead.attempts, 1);

        let json = serde_json::to_value(&dead).unwrap();
        assert_eq!(json["sourceTopic"], "user.events");
        assert_eq!(json["errorCode"], "DECODE_ERROR");
    }
}
