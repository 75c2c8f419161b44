//! PostgreSQL 模板仓储

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::error::{NotificationError, Result};
use crate::models::{NotificationType, Template, now};
use crate::repository::traits::TemplateRepository;

#[derive(Debug, sqlx::FromRow)]
struct TemplateRow {
    id: Uuid,
    name: String,
    #[sqlx(rename = "type")]
    template_type: NotificationType,
    subject: String,
    content: String,
    variables: Json<Vec<String>>,
    metadata: Json<HashMap<String, String>>,
    version: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TemplateRow> for Template {
    fn from(row: TemplateRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            template_type: row.template_type,
            subject: row.subject,
            content: row.content,
            variables: row.variables.0,
            metadata: row.metadata.0,
            version: row.version,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// 模板仓储（PostgreSQL）
pub struct PgTemplateRepository {
    pool: PgPool,
}

impl PgTemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateRepository for PgTemplateRepository {
    async fn save(&self, template: &Template) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO templates (
                id, name, type, subject, content, variables, metadata,
                version, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(template.id)
        .bind(&template.name)
        .bind(template.template_type)
        .bind(&template.subject)
        .bind(&template.content)
        .bind(Json(&template.variables))
        .bind(Json(&template.metadata))
        .bind(template.version)
        .bind(template.is_active)
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Template>> {
        let row = sqlx::query_as::<_, TemplateRow>(
            r#"
            SELECT id, name, type, subject, content, variables, metadata,
                   version, is_active, created_at, updated_at
            FROM templates
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Template::from))
    }

    async fn find_by_type(&self, template_type: NotificationType) -> Result<Vec<Template>> {
        let rows = sqlx::query_as::<_, TemplateRow>(
            r#"
            SELECT id, name, type, subject, content, variables, metadata,
                   version, is_active, created_at, updated_at
            FROM templates
            WHERE type = $1
            ORDER BY version DESC, updated_at DESC
            "#,
        )
        .bind(template_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Template::from).collect())
    }

    async fn find_active_by_type(
        &self,
        template_type: NotificationType,
    ) -> Result<Vec<Template>> {
        let rows = sqlx::query_as::<_, TemplateRow>(
            r#"
            SELECT id, name, type, subject, content, variables, metadata,
                   version, is_active, created_at, updated_at
            FROM templates
            WHERE type = $1 AND is_active = TRUE
            ORDER BY version DESC, updated_at DESC
            "#,
        )
        .bind(template_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Template::from).collect())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Template>> {
        let row = sqlx::query_as::<_, TemplateRow>(
            r#"
            SELECT id, name, type, subject, content, variables, metadata,
                   version, is_active, created_at, updated_at
            FROM templates
            WHERE name = $1 AND is_active = TRUE
            ORDER BY version DESC, updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Template::from))
    }

    async fn update(&self, template: &Template) -> Result<Template> {
        // 版本号在库内递增，调用方传入的 version 不参与写入
        let row = sqlx::query_as::<_, TemplateRow>(
            r#"
            UPDATE templates
            SET name = $2, type = $3, subject = $4, content = $5, variables = $6,
                metadata = $7, is_active = $8, version = version + 1, updated_at = $9
            WHERE id = $1
            RETURNING id, name, type, subject, content, variables, metadata,
                      version, is_active, created_at, updated_at
            "#,
        )
        .bind(template.id)
        .bind(&template.name)
        .bind(template.template_type)
        .bind(&template.subject)
        .bind(&template.content)
        .bind(Json(&template.variables))
        .bind(Json(&template.metadata))
        .bind(template.is_active)
        .bind(now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Template::from)
            .ok_or_else(|| NotificationError::template_not_found(template.id))
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM templates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
