//! 进程内仓储
//!
//! 本地开发（`storage.backend = "memory"`）和测试使用，语义与持久化后端一致，无过期。

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::traits::{NotificationRepository, TemplateRepository, newest_first, normalize_page};
use crate::error::{NotificationError, Result};
use crate::models::{Notification, NotificationType, Template, now};

#[derive(Default)]
pub struct InMemoryNotificationRepository {
    records: RwLock<HashMap<Uuid, Notification>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn save(&self, notification: &Notification) -> Result<()> {
        self.records
            .write()
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>> {
        Ok(self.records.read().get(&id).cloned())
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

        let mut matching: Vec<Notification> = self
            .records
            .read()
            .values()
            .filter(|n| n.recipient == recipient)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        Ok(matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn update(&self, notification: &Notification) -> Result<()> {
        let mut records = self.records.write();
        match records.get_mut(&notification.id) {
            Some(slot) => {
                *slot = notification.clone();
                Ok(())
            }
            None => Err(NotificationError::notification_not_found(notification.id)),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.records.write().remove(&id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTemplateRepository {
    records: RwLock<HashMap<Uuid, Template>>,
}

impl InMemoryTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect(&self, filter: impl Fn(&Template) -> bool) -> Vec<Template> {
        let mut templates: Vec<Template> = self
            .records
            .read()
            .values()
            .filter(|t| filter(t))
            .cloned()
            .collect();
        templates.sort_by(newest_first);
        templates
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn save(&self, template: &Template) -> Result<()> {
        self.records.write().insert(template.id, template.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Template>> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn find_by_type(&self, template_type: NotificationType) -> Result<Vec<Template>> {
        Ok(self.collect(|t| t.template_type == template_type))
    }

    async fn find_active_by_type(
        &self,
        template_type: NotificationType,
    ) -> Result<Vec<Template>> {
        Ok(self.collect(|t| t.template_type == template_type && t.is_active))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Template>> {
        Ok(self
            .collect(|t| t.name == name && t.is_active)
            .into_iter()
            .next())
    }

    async fn update(&self, template: &Template) -> Result<Template> {
        let mut records = self.records.write();
        let existing = records
            .get_mut(&template.id)
            .ok_or_else(|| NotificationError::template_not_found(template.id))?;

        let mut updated = template.clone();
        updated.version = existing.version + 1;
        updated.created_at = existing.created_at;
        updated.updated_at = now();
        *existing = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.records.write().remove(&id);
        Ok(())
    }
}
