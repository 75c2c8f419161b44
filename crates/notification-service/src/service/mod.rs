//! 通知编排
//!
//! - [`NotificationService`]: 直接发送、事件驱动发送、查询、重试、取消
//! - [`events`]: 用户事件到模板的路由表
//! - [`observer`]: 流水线检查点的观测端口

pub mod events;
mod notification_service;
pub mod observer;

pub use notification_service::{
    DEFAULT_PROVIDER_TIMEOUT, DeliveryOutcome, DispatchReport, NotificationService,
};
pub use observer::{DispatchSource, MetricsObserver, NoopObserver, NotificationObserver};
