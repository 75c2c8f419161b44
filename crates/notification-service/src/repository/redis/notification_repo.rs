//! Redis 通知仓储
//!
//! 键布局：
//! - `notification:<id>`：通知 JSON，带保留期 TTL
//! - `recipient:<recipient>`：ZSET，member 为通知 id，score 为创建时间（微秒）
//!
//! 记录过期后索引里可能残留 id，读取时发现即清理并重新取页。

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{NotificationError, Result};
use crate::models::Notification;
use crate::repository::traits::{NotificationRepository, normalize_page};

pub(crate) fn record_key(id: Uuid) -> String {
    format!("notification:{}", id)
}

pub(crate) fn recipient_key(recipient: &str) -> String {
    format!("recipient:{}", recipient)
}

/// 一页索引对应的 ZREVRANGE 区间（闭区间），超大 offset 不会溢出
fn index_range(limit: i64, offset: i64) -> (i64, i64) {
    (offset, offset.saturating_add(limit - 1))
}

/// 按索引顺序拆分 MGET 结果：仍存在的记录，以及记录已过期的索引项
fn split_page(
    ids: &[String],
    values: Vec<Option<String>>,
) -> Result<(Vec<Notification>, Vec<String>)> {
    let mut page = Vec::with_capacity(values.len());
    let mut stale = Vec::new();
    for (id, value) in ids.iter().zip(values) {
        match value {
            Some(json) => page.push(serde_json::from_str::<Notification>(&json)?),
            None => stale.push(id.clone()),
        }
    }
    Ok((page, stale))
}

/// 收件人变化时需要迁移的索引：(旧索引, 新索引)
fn index_move(existing: &Notification, updated: &Notification) -> Option<(String, String)> {
    (existing.recipient != updated.recipient).then(|| {
        (
            recipient_key(&existing.recipient),
            recipient_key(&updated.recipient),
        )
    })
}

/// 通知仓储（Redis），记录与收件人索引一起按保留期过期
pub struct RedisNotificationRepository {
    conn: MultiplexedConnection,
    retention: Duration,
}

impl RedisNotificationRepository {
    pub fn new(conn: MultiplexedConnection, retention: Duration) -> Self {
        Self { conn, retention }
    }

    fn retention_millis(&self) -> u64 {
        (self.retention.as_millis() as u64).max(1)
    }

    async fn get_raw(&self, id: Uuid) -> Result<Option<Notification>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(record_key(id))
            .query_async(&mut conn)
            .await?;

        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(NotificationError::from)
    }
}

#[async_trait]
impl NotificationRepository for RedisNotificationRepository {
    #[instrument(skip(self, notification), fields(notification_id = %notification.id))]
    async fn save(&self, notification: &Notification) -> Result<()> {
        let json = serde_json::to_string(notification)?;
        let ttl = self.retention_millis();
        let index = recipient_key(&notification.recipient);
        let mut conn = self.conn.clone();

        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(record_key(notification.id))
            .arg(json)
            .arg("PX")
            .arg(ttl)
            .ignore()
            .cmd("ZADD")
            .arg(&index)
            .arg(notification.created_at.timestamp_micros())
            .arg(notification.id.to_string())
            .ignore()
            .cmd("PEXPIRE")
            .arg(&index)
            .arg(ttl)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>> {
        self.get_raw(id).await
    }

    async fn find_by_recipient(
        &self,
        recipient: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>> {
        let Some((limit, offset)) = normalize_page(limit, offset) else {
            return Ok(Vec::new());
        };
        let index = recipient_key(recipient);
        let (start, stop) = index_range(limit, offset);
        let mut conn = self.conn.clone();

        loop {
            let ids: Vec<String> = redis::cmd("ZREVRANGE")
                .arg(&index)
                .arg(start)
                .arg(stop)
                .query_async(&mut conn)
                .await?;

            if ids.is_empty() {
                return Ok(Vec::new());
            }

            let keys: Vec<String> = ids
                .iter()
                .map(|id| format!("notification:{}", id))
                .collect();
            let values: Vec<Option<String>> = redis::cmd("MGET")
                .arg(&keys)
                .query_async(&mut conn)
                .await?;

            let (page, stale) = split_page(&ids, values)?;

            if stale.is_empty() {
                return Ok(page);
            }

            // 清理已过期记录留下的索引项后重取，保证分页位置准确
            debug!(recipient, stale = stale.len(), "清理收件人索引中的过期项");
            redis::cmd("ZREM")
                .arg(&index)
                .arg(&stale)
                .query_async::<()>(&mut conn)
                .await?;
        }
    }

    #[instrument(skip(self, notification), fields(notification_id = %notification.id))]
    async fn update(&self, notification: &Notification) -> Result<()> {
        let existing = self
            .get_raw(notification.id)
            .await?
            .ok_or_else(|| NotificationError::notification_not_found(notification.id))?;

        let json = serde_json::to_string(notification)?;
        let mut conn = self.conn.clone();

        // XX：记录在读取后过期时不会被重新创建；KEEPTTL：不延长保留期
        let written: Option<String> = redis::cmd("SET")
            .arg(record_key(notification.id))
            .arg(json)
            .arg("XX")
            .arg("KEEPTTL")
            .query_async(&mut conn)
            .await?;

        if written.is_none() {
            return Err(NotificationError::notification_not_found(notification.id));
        }

        if let Some((old_index, new_index)) = index_move(&existing, notification) {
            let ttl = self.retention_millis();
            redis::pipe()
                .atomic()
                .cmd("ZREM")
                .arg(old_index)
                .arg(notification.id.to_string())
                .ignore()
                .cmd("ZADD")
                .arg(&new_index)
                .arg(notification.created_at.timestamp_micros())
                .arg(notification.id.to_string())
                .ignore()
                .cmd("PEXPIRE")
                .arg(&new_index)
                .arg(ttl)
                .ignore()
                .query_async::<()>(&mut conn)
                .await?;
        }

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let Some(existing) = self.get_raw(id).await? else {
            return Ok(());
        };
        let mut conn = self.conn.clone();

        redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(record_key(id))
            .ignore()
            .cmd("ZREM")
            .arg(recipient_key(&existing.recipient))
            .arg(id.to_string())
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationType;

    #[test]
    fn test_key_layout() {
        let id = Uuid::nil();
        assert_eq!(
            record_key(id),
            "notification:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(recipient_key("bob@example.com"), "recipient:bob@example.com");
    }

    #[test]
    fn test_index_range() {
        assert_eq!(index_range(10, 0), (0, 9));
        assert_eq!(index_range(1, 5), (5, 5));
        assert_eq!(index_range(10, i64::MAX), (i64::MAX, i64::MAX));
        assert_eq!(index_range(i64::MAX, 1), (1, i64::MAX));
    }

    fn stored(recipient: &str) -> Notification {
        Notification::new(NotificationType::Email, recipient, "Hi", "<p>Hello</p>")
    }

    #[test]
    fn test_split_page_separates_expired_entries() {
        let first = stored("a@example.com");
        let third = stored("a@example.com");
        let ids = vec![
            first.id.to_string(),
            "expired-id".to_string(),
            third.id.to_string(),
        ];
        let values = vec![
            Some(serde_json::to_string(&first).unwrap()),
            None,
            Some(serde_json::to_string(&third).unwrap()),
        ];

        let (page, stale) = split_page(&ids, values).unwrap();
        assert_eq!(page, vec![first, third]);
        assert_eq!(stale, vec!["expired-id".to_string()]);
    }

    #[test]
    fn test_split_page_all_expired() {
        let ids = vec!["x".to_string(), "y".to_string()];
        let (page, stale) = split_page(&ids, vec![None, None]).unwrap();
        assert!(page.is_empty());
        assert_eq!(stale, ids);
    }

    #[test]
    fn test_split_page_rejects_corrupt_record() {
        let ids = vec!["x".to_string()];
        let err = split_page(&ids, vec![Some("{not json".to_string())]).unwrap_err();
        assert!(matches!(err, NotificationError::Storage(_)));
    }

    #[test]
    fn test_index_move_only_on_recipient_change() {
        let existing = stored("old@example.com");

        let mut same = existing.clone();
        same.mark_sent().unwrap();
        assert_eq!(index_move(&existing, &same), None);

        let mut moved = existing.clone();
        moved.recipient = "new@example.com".to_string();
        assert_eq!(
            index_move(&existing, &moved),
            Some((
                "recipient:old@example.com".to_string(),
                "recipient:new@example.com".to_string()
            ))
        );
    }
}
