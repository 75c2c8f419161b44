//! 用户事件消费者
//!
//! 从 Kafka 消费用户事件，交给编排服务处理。事件类型取自 `event-type` header，
//! 缺失时回退到消息 key。
//!
//! ## 失败处理
//!
//! - 存储故障：按退避策略重试，耗尽后进入死信队列
//! - 解码失败、未知事件、缺少模板等：不重试，直接进入死信队列
//! - 投递失败：通知已记录为 Failed，可通过 API 重试，直接提交
//!
//! 只有死信写入失败时才不提交 offset：消费循环回退到该消息重新拉取，
//! 同一分区在它处理成功之前不会提交更靠后的 offset。

use std::sync::Arc;

use notify_shared::config::AppConfig;
use notify_shared::dlq::{DeadLetterMessage, DlqProducer};
use notify_shared::error::SharedError;
use notify_shared::kafka::{ConsumerMessage, KafkaConsumer};
use notify_shared::observability::metrics;
use notify_shared::retry::{RetryPolicy, retry_with_policy};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::NotificationError;
use crate::service::NotificationService;

/// 携带事件类型的 header
pub const EVENT_TYPE_HEADER: &str = "event-type";

const SOURCE_SERVICE: &str = "notification-service";

/// 单条消息的处理结论
#[derive(Debug)]
pub enum EventDisposition {
    /// 已处理并投递成功
    Delivered,
    /// 已处理但投递失败，失败已记录在通知上
    DeliveryFailed(NotificationError),
    /// 无法处理，需要进入死信队列
    DeadLetter(NotificationError),
}

impl EventDisposition {
    fn status(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::DeliveryFailed(_) => "delivery_failed",
            Self::DeadLetter(_) => "dead_letter",
        }
    }
}

/// 处理一条消息，存储故障按策略重试
pub async fn process_message(
    service: &NotificationService,
    policy: &RetryPolicy,
    msg: &ConsumerMessage,
) -> EventDisposition {
    let Some(event_type) = msg.header_or_key(EVENT_TYPE_HEADER) else {
        return EventDisposition::DeadLetter(NotificationError::UnknownEventType(String::new()));
    };

    let result = retry_with_policy(
        policy,
        "handle_event",
        NotificationError::is_retryable,
        || service.handle_event(event_type, &msg.payload),
    )
    .await;

    match result {
        Ok(notification) => {
            info!(
                event_type,
                notification_id = %notification.id,
                "用户事件处理完成"
            );
            EventDisposition::Delivered
        }
        Err(e @ NotificationError::Delivery { .. }) => EventDisposition::DeliveryFailed(e),
        Err(e) => EventDisposition::DeadLetter(e),
    }
}

/// 用户事件消费者
pub struct EventConsumer {
    consumer: KafkaConsumer,
    service: Arc<NotificationService>,
    dlq: DlqProducer,
    policy: RetryPolicy,
    topics: Vec<String>,
}

impl EventConsumer {
    pub fn new(
        config: &AppConfig,
        service: Arc<NotificationService>,
        dlq: DlqProducer,
    ) -> Result<Self, SharedError> {
        Ok(Self {
            consumer: KafkaConsumer::new(&config.kafka)?,
            service,
            dlq,
            policy: RetryPolicy::from(&config.consumer_retry),
            topics: config.kafka.topics.clone(),
        })
    }

    /// 启动消费循环，直到收到 shutdown 信号
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), SharedError> {
        let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();
        self.consumer.subscribe(&topics)?;
        info!(topics = ?topics, "用户事件消费者已启动");

        let service = self.service;
        let dlq = self.dlq;
        let policy = self.policy;

        self.consumer
            .start(shutdown, |msg| {
                let service = &service;
                let dlq = &dlq;
                let policy = &policy;
                async move { handle_message(service, dlq, policy, msg).await }
            })
            .await;

        info!("用户事件消费者已停止");
        Ok(())
    }
}

async fn handle_message(
    service: &NotificationService,
    dlq: &DlqProducer,
    policy: &RetryPolicy,
    msg: ConsumerMessage,
) -> Result<(), SharedError> {
    let event_type = msg
        .header_or_key(EVENT_TYPE_HEADER)
        .unwrap_or("unknown")
        .to_string();

    let disposition = process_message(service, policy, &msg).await;
    metrics::record_event_consumed(&event_type, disposition.status());

    match disposition {
        EventDisposition::Delivered => Ok(()),
        EventDisposition::DeliveryFailed(e) => {
            warn!(
                event_type = %event_type,
                offset = msg.offset,
                error = %e,
                "事件已处理但投递失败，等待人工重试"
            );
            Ok(())
        }
        EventDisposition::DeadLetter(e) => {
            error!(
                event_type = %event_type,
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                error = %e,
                "事件无法处理，转入死信队列"
            );
            let attempts = if e.is_retryable() {
                policy.max_retries + 1
            } else {
                1
            };
            let dead_letter = DeadLetterMessage::from_consumer_message(
                &msg,
                e.code(),
                e.to_string(),
                attempts,
                SOURCE_SERVICE,
            );
            dlq.send(&dead_letter).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationStatus;
    use crate::providers::ProviderRegistry;
    use crate::repository::NotificationRepository;
    use crate::repository::memory::{InMemoryNotificationRepository, InMemoryTemplateRepository};
    use crate::template::seed_default_templates;
    use notify_shared::config::DeliveryConfig;
    use std::collections::HashMap;
    use std::time::Duration;

    fn message(key: Option<&str>, event_type: Option<&str>, payload: &str) -> ConsumerMessage {
        let mut headers = HashMap::new();
        if let Some(t) = event_type {
            headers.insert(EVENT_TYPE_HEADER.to_string(), t.to_string());
        }
        ConsumerMessage {
            topic: "user.events".to_string(),
            partition: 0,
            offset: 7,
            key: key.map(String::from),
            payload: payload.as_bytes().to_vec(),
            timestamp: None,
            headers,
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 1,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            multiplier: 1.0,
        }
    }

    async fn service() -> (NotificationService, Arc<InMemoryNotificationRepository>) {
        let notifications = Arc::new(InMemoryNotificationRepository::new());
        let templates = Arc::new(InMemoryTemplateRepository::new());
        seed_default_templates(templates.as_ref()).await.unwrap();
        let service = NotificationService::new(
            notifications.clone(),
            templates,
            ProviderRegistry::with_defaults(&DeliveryConfig::default()),
        );
        (service, notifications)
    }

    #[tokio::test]
    async fn test_event_type_from_key_fallback() {
        let (service, repo) = service().await;
        let msg = message(
            Some("user.verified"),
            None,
            r#"{"userId":"u-9","email":"zed@example.com"}"#,
        );

        let disposition = process_message(&service, &fast_policy(), &msg).await;
        assert!(matches!(disposition, EventDisposition::Delivered));

        let stored = repo
            .find_by_recipient("zed@example.com", 10, 0)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, NotificationStatus::Sent);
        assert_eq!(stored[0].metadata["eventType"], "user.verified");
    }

    #[tokio::test]
    async fn test_header_wins_over_key() {
        let (service, _) = service().await;
        let msg = message(
            Some("user.verified"),
            Some("bogus.event"),
            r#"{"userId":"u-9","email":"zed@example.com"}"#,
        );

        let disposition = process_message(&service, &fast_policy(), &msg).await;
        assert!(matches!(
            disposition,
            EventDisposition::DeadLetter(NotificationError::UnknownEventType(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_payload_goes_to_dead_letter() {
        let (service, repo) = service().await;
        let msg = message(None, Some("user.registered"), "{oops");

        let disposition = process_message(&service, &fast_policy(), &msg).await;
        assert!(matches!(
            disposition,
            EventDisposition::DeadLetter(NotificationError::Decode(_))
        ));
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_missing_event_type() {
        let (service, _) = service().await;
        let msg = message(None, None, "{}");

        let disposition = process_message(&service, &fast_policy(), &msg).await;
        assert_eq!(disposition.status(), "dead_letter");
    }
}
