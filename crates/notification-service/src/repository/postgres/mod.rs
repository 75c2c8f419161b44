//! PostgreSQL 存储后端

mod notification_repo;
mod template_repo;

pub use notification_repo::PgNotificationRepository;
pub use template_repo::PgTemplateRepository;

use notify_shared::error::SharedError;
use sqlx::PgPool;
use tracing::info;

/// 执行 `migrations/` 下的建表脚本
pub async fn run_migrations(pool: &PgPool) -> Result<(), SharedError> {
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations completed");
    Ok(())
}
