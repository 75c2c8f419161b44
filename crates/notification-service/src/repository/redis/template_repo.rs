//! Redis 模板仓储
//!
//! 键布局：
//! - `template:<id>`：模板 JSON，不过期
//! - `template:type:<type>`：SET，该类型下的模板 id
//! - `template:name:<name>`：SET，同名模板的 id

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use uuid::Uuid;

use crate::error::{NotificationError, Result};
use crate::models::{NotificationType, Template, now};
use crate::repository::traits::{TemplateRepository, newest_first};

fn record_key(id: Uuid) -> String {
    format!("template:{}", id)
}

fn type_key(template_type: NotificationType) -> String {
    format!("template:type:{}", template_type)
}

fn name_key(name: &str) -> String {
    format!("template:name:{}", name)
}

/// 模板仓储（Redis）
pub struct RedisTemplateRepository {
    conn: MultiplexedConnection,
}

impl RedisTemplateRepository {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    /// 读取索引集合中的全部模板，顺带清理指向已删除记录的 id
    async fn load_index(&self, index: &str) -> Result<Vec<Template>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = redis::cmd("SMEMBERS")
            .arg(index)
            .query_async(&mut conn)
            .await?;

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| format!("template:{}", id)).collect();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        let mut stale = Vec::new();
        let mut templates = Vec::with_capacity(values.len());
        for (id, value) in ids.iter().zip(values) {
            match value {
                Some(json) => templates.push(serde_json::from_str::<Template>(&json)?),
                None => stale.push(id.clone()),
            }
        }

        if !stale.is_empty() {
            redis::cmd("SREM")
                .arg(index)
                .arg(&stale)
                .query_async::<()>(&mut conn)
                .await?;
        }

        templates.sort_by(newest_first);
        Ok(templates)
    }

    async fn write(&self, template: &Template, previous: Option<&Template>) -> Result<()> {
        let json = serde_json::to_string(template)?;
        let id = template.id.to_string();
        let mut conn = self.conn.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET")
            .arg(record_key(template.id))
            .arg(json)
            .ignore()
            .cmd("SADD")
            .arg(type_key(template.template_type))
            .arg(&id)
            .ignore()
            .cmd("SADD")
            .arg(name_key(&template.name))
            .arg(&id)
            .ignore();

        if let Some(prev) = previous {
            if prev.template_type != template.template_type {
                pipe.cmd("SREM")
                    .arg(type_key(prev.template_type))
                    .arg(&id)
                    .ignore();
            }
            if prev.name != template.name {
                pipe.cmd("SREM").arg(name_key(&prev.name)).arg(&id).ignore();
            }
        }

        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl TemplateRepository for RedisTemplateRepository {
    async fn save(&self, template: &Template) -> Result<()> {
        self.write(template, None).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Template>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(record_key(id))
            .query_async(&mut conn)
            .await?;

        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(NotificationError::from)
    }

    async fn find_by_type(&self, template_type: NotificationType) -> Result<Vec<Template>> {
        self.load_index(&type_key(template_type)).await
    }

    async fn find_active_by_type(
        &self,
        template_type: NotificationType,
    ) -> Result<Vec<Template>> {
        let mut templates = self.load_index(&type_key(template_type)).await?;
        templates.retain(|t| t.is_active);
        Ok(templates)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Template>> {
        let templates = self.load_index(&name_key(name)).await?;
        // 已按 newest_first 排序
        Ok(templates.into_iter().find(|t| t.is_active && t.name == name))
    }

    async fn update(&self, template: &Template) -> Result<Template> {
        let existing = self
            .find_by_id(template.id)
            .await?
            .ok_or_else(|| NotificationError::template_not_found(template.id))?;

        let mut updated = template.clone();
        updated.version = existing.version + 1;
        updated.created_at = existing.created_at;
        updated.updated_at = now();

        self.write(&updated, Some(&existing)).await?;
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let Some(existing) = self.find_by_id(id).await? else {
            return Ok(());
        };
        let member = id.to_string();
        let mut conn = self.conn.clone();

        redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(record_key(id))
            .ignore()
            .cmd("SREM")
            .arg(type_key(existing.template_type))
            .arg(&member)
            .ignore()
            .cmd("SREM")
            .arg(name_key(&existing.name))
            .arg(&member)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }
}
