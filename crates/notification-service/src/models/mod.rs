//! 数据模型

mod enums;
mod notification;
mod template;

pub use enums::{NotificationStatus, NotificationType, Priority};
pub use notification::{Notification, now};
pub use template::Template;
