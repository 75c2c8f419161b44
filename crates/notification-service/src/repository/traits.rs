//! 仓储 Trait 定义
//!
//! PostgreSQL 与 Redis 两种后端实现同一组契约，服务层只依赖这里的抽象。

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Notification, NotificationType, Template};

/// 通知仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// 写入新记录
    async fn save(&self, notification: &Notification) -> Result<()>;

    /// 不存在时返回 `Ok(None)`，只有查询失败才返回错误
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>>;

    /// 按创建时间倒序分页；limit <= 0 返回空列表，负 offset 视为 0
    async fn find_by_recipient(
        &self,
        recipient: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>>;

    /// 覆盖已有记录，id 不存在时返回 `NotFound`
    async fn update(&self, notification: &Notification) -> Result<()>;

    /// 幂等删除
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// 模板仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn save(&self, template: &Template) -> Result<()>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Template>>;

    /// 版本号倒序
    async fn find_by_type(&self, template_type: NotificationType) -> Result<Vec<Template>>;

    async fn find_active_by_type(&self, template_type: NotificationType)
    -> Result<Vec<Template>>;

    /// 按名称查找启用中的模板
    ///
    /// 同名多个启用模板时取 version 最大者，version 相同取 updated_at 最新者。
    async fn find_by_name(&self, name: &str) -> Result<Option<Template>>;

    /// 递增版本号并刷新 updated_at，返回写入后的模板；id 不存在时返回 `NotFound`
    async fn update(&self, template: &Template) -> Result<Template>;

    /// 幂等删除
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// 分页参数归一化：(limit, offset)，limit <= 0 时返回 None
pub(crate) fn normalize_page(limit: i64, offset: i64) -> Option<(i64, i64)> {
    if limit <= 0 {
        return None;
    }
    Some((limit, offset.max(0)))
}

/// 同名模板的择优规则
pub(crate) fn newest_first(a: &Template, b: &Template) -> std::cmp::Ordering {
    b.version
        .cmp(&a.version)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
}
