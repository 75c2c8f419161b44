//! PostgreSQL 通知仓储

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{NotificationError, Result};
use crate::models::{Notification, NotificationStatus, NotificationType, Priority};
use crate::repository::traits::{NotificationRepository, normalize_page};

/// 数据库行，JSONB 列经 `Json` 解码
#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    recipient: String,
    #[sqlx(rename = "type")]
    notification_type: NotificationType,
    subject: String,
    content: String,
    status: NotificationStatus,
    priority: Priority,
    template_id: Option<Uuid>,
    template_type: Option<NotificationType>,
    template_data: Json<HashMap<String, String>>,
    metadata: Json<HashMap<String, String>>,
    error_message: String,
    retry_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            recipient: row.recipient,
            notification_type: row.notification_type,
            subject: row.subject,
            content: row.content,
            status: row.status,
            priority: row.priority,
            template_id: row.template_id,
            template_type: row.template_type,
            template_data: row.template_data.0,
            metadata: row.metadata.0,
            error_message: row.error_message,
            retry_count: row.retry_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// 通知仓储（PostgreSQL），记录永久保留
pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    #[instrument(skip(self, notification), fields(notification_id = %notification.id))]
    async fn save(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, recipient, type, subject, content, status, priority,
                template_id, template_type, template_data, metadata,
                error_message, retry_count, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(notification.id)
        .bind(&notification.recipient)
        .bind(notification.notification_type)
        .bind(&notification.subject)
        .bind(&notification.content)
        .bind(notification.status)
        .bind(notification.priority)
        .bind(notification.template_id)
        .bind(notification.template_type)
        .bind(Json(&notification.template_data))
        .bind(Json(&notification.metadata))
        .bind(&notification.error_message)
        .bind(notification.retry_count)
        .bind(notification.created_at)
        .bind(notification.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, recipient, type, subject, content, status, priority,
                   template_id, template_type, template_data, metadata,
                   error_message, retry_count, created_at, updated_at
            FROM notifications
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Notification::from))
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

        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, recipient, type, subject, content, status, priority,
                   template_id, template_type, template_data, metadata,
                   error_message, retry_count, created_at, updated_at
            FROM notifications
            WHERE recipient = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(recipient)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Notification::from).collect())
    }

    #[instrument(skip(self, notification), fields(notification_id = %notification.id))]
    async fn update(&self, notification: &Notification) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET recipient = $2, type = $3, subject = $4, content = $5, status = $6,
                priority = $7, template_id = $8, template_type = $9, template_data = $10,
                metadata = $11, error_message = $12, retry_count = $13, updated_at = $14
            WHERE id = $1
            "#,
        )
        .bind(notification.id)
        .bind(&notification.recipient)
        .bind(notification.notification_type)
        .bind(&notification.subject)
        .bind(&notification.content)
        .bind(notification.status)
        .bind(notification.priority)
        .bind(notification.template_id)
        .bind(notification.template_type)
        .bind(Json(&notification.template_data))
        .bind(Json(&notification.metadata))
        .bind(&notification.error_message)
        .bind(notification.retry_count)
        .bind(notification.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(NotificationError::notification_not_found(notification.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
