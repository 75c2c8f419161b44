//! Kafka 接入
//!
//! 用户事件从这里进入服务：消费者手动提交 offset，处理失败的事件由生产者写入死信 topic。

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use futures::{Stream, StreamExt};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Offset, TopicPartitionList};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;
use crate::error::SharedError;

// ---------------------------------------------------------------------------
// Topic 常量
// ---------------------------------------------------------------------------

pub mod topics {
    pub const USER_EVENTS: &str = "user.events";
    pub const DEAD_LETTER_QUEUE: &str = "notification.dlq";
}

/// 消费到的 Kafka 消息的统一表示
///
/// 拥有所有字段，可以跨 await 点传递给异步处理函数。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
    pub headers: HashMap<String, String>,
}

impl ConsumerMessage {
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let key = msg
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(String::from);

        let payload = msg.payload().map(|p| p.to_vec()).unwrap_or_default();

        let mut headers = HashMap::new();
        if let Some(h) = msg.headers() {
            for idx in 0..h.count() {
                let header = h.get(idx);
                if let Some(raw) = header.value
                    && let Ok(value) = std::str::from_utf8(raw)
                {
                    headers.insert(header.key.to_string(), value.to_string());
                }
            }
        }

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key,
            payload,
            timestamp: msg.timestamp().to_millis(),
            headers,
        }
    }

    /// 读取 header，缺失时回退到消息 key
    pub fn header_or_key(&self, header: &str) -> Option<&str> {
        self.headers
            .get(header)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .or_else(|| self.key.as_deref().filter(|k| !k.is_empty()))
    }
}

/// Kafka 生产者，目前只用于写死信队列
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self, SharedError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| SharedError::Kafka(format!("创建生产者失败: {e}")))?;

        info!(brokers = %config.brokers, "Kafka 生产者已初始化");
        Ok(Self { producer })
    }

    /// 发送原始字节消息
    pub async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<(i32, i64), SharedError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        let delivery = self
            .producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| SharedError::Kafka(format!("发送消息失败: {e}")))?;

        debug!(
            topic,
            key,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送"
        );
        Ok((delivery.partition, delivery.offset))
    }

    /// 将值序列化为 JSON 后发送
    pub async fn send_json<T: Serialize>(
        &self,
        topic: &str,
        key: &str,
        value: &T,
    ) -> Result<(i32, i64), SharedError> {
        let payload = serde_json::to_vec(value)?;
        self.send(topic, key, &payload).await
    }
}

/// 手动提交的 Kafka 消费者
///
/// 关闭自动提交，handler 返回后才提交该消息的 offset，保证至少一次投递。
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    redelivery_backoff: Duration,
}

impl KafkaConsumer {
    pub fn new(config: &KafkaConfig) -> Result<Self, SharedError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.consumer_group)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .create()
            .map_err(|e| SharedError::Kafka(format!("创建消费者失败: {e}")))?;

        info!(
            brokers = %config.brokers,
            group_id = %config.consumer_group,
            "Kafka 消费者已初始化"
        );
        Ok(Self {
            consumer,
            redelivery_backoff: Duration::from_millis(config.redelivery_backoff_ms),
        })
    }

    /// 订阅指定的 topic 列表
    pub fn subscribe(&self, topics: &[&str]) -> Result<(), SharedError> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| SharedError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(?topics, "已订阅 Kafka topics");
        Ok(())
    }

    /// 消费直到收到关闭信号
    ///
    /// 消息逐条顺序处理，handler 成功后提交 offset。handler 失败时回退到该消息的
    /// offset 重新拉取，该分区在这条消息成功之前不会提交更靠后的 offset。
    pub async fn start<F, Fut>(self, shutdown: watch::Receiver<bool>, handler: F)
    where
        F: Fn(ConsumerMessage) -> Fut,
        Fut: Future<Output = Result<(), SharedError>>,
    {
        let stream = self.consumer.stream().map(|next| {
            next.map(|borrowed| ConsumerMessage::from_borrowed(&borrowed))
                .map_err(SharedError::from)
        });
        futures::pin_mut!(stream);

        info!("开始消费用户事件");
        drive(stream, &self, shutdown, handler, self.redelivery_backoff).await;
        info!("事件消费已停止");
    }
}

/// 分区 offset 的提交与回退
pub trait OffsetControl {
    /// 提交已处理的消息，下次从 offset + 1 开始消费
    fn commit(&self, topic: &str, partition: i32, offset: i64) -> Result<(), SharedError>;

    /// 把分区的读取位置移回 offset，使该消息被重新拉取
    fn rewind(&self, topic: &str, partition: i32, offset: i64) -> Result<(), SharedError>;
}

impl OffsetControl for KafkaConsumer {
    fn commit(&self, topic: &str, partition: i32, offset: i64) -> Result<(), SharedError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(topic, partition, Offset::Offset(offset + 1))?;
        self.consumer.commit(&tpl, CommitMode::Async)?;
        Ok(())
    }

    fn rewind(&self, topic: &str, partition: i32, offset: i64) -> Result<(), SharedError> {
        self.consumer
            .seek(topic, partition, Offset::Offset(offset), Duration::from_secs(5))?;
        Ok(())
    }
}

/// 消费循环
///
/// 回退后、失败消息重新到达之前，同一分区里预取的更靠后的消息直接跳过，
/// 既不处理也不提交，它们会在失败消息之后按顺序重新到达。
pub async fn drive<S, C, F, Fut>(
    mut stream: S,
    control: &C,
    mut shutdown: watch::Receiver<bool>,
    handler: F,
    redelivery_backoff: Duration,
) where
    S: Stream<Item = Result<ConsumerMessage, SharedError>> + Unpin,
    C: OffsetControl,
    F: Fn(ConsumerMessage) -> Fut,
    Fut: Future<Output = Result<(), SharedError>>,
{
    // (topic, partition) -> 等待重新投递的 offset
    let mut rewound: HashMap<(String, i32), i64> = HashMap::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => break,
            next = stream.next() => next,
        };

        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                error!(error = %e, "拉取 Kafka 消息出错");
                continue;
            }
            None => {
                warn!("Kafka 消息流已结束");
                break;
            }
        };

        let (topic, partition, offset) = (msg.topic.clone(), msg.partition, msg.offset);
        let partition_key = (topic.clone(), partition);
        if let Some(&pending) = rewound.get(&partition_key) {
            if offset > pending {
                debug!(topic = %topic, partition, offset, pending, "跳过回退点之后的预取消息");
                continue;
            }
            rewound.remove(&partition_key);
        }

        debug!(topic = %topic, partition, offset, "收到事件");
        match handler(msg).await {
            Ok(()) => {
                if let Err(e) = control.commit(&topic, partition, offset) {
                    error!(error = %e, topic = %topic, partition, offset, "提交 offset 失败");
                }
            }
            Err(e) => {
                error!(error = %e, topic = %topic, partition, offset, "事件未处理完成，回退 offset 等待重新投递");
                if let Err(e) = control.rewind(&topic, partition, offset) {
                    error!(error = %e, topic = %topic, partition, offset, "回退 offset 失败");
                }
                rewound.insert(partition_key, offset);

                tokio::select! {
                    biased;
                    _ = shutdown.wait_for(|stop| *stop) => break,
                    _ = tokio::time::sleep(redelivery_backoff) => {}
                }
            }
        }
    }
}
