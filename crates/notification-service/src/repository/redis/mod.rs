//! Redis 存储后端

mod notification_repo;
mod template_repo;

pub use notification_repo::RedisNotificationRepository;
pub use template_repo::RedisTemplateRepository;
