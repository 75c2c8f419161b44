//! 通知服务
//!
//! 事件驱动的多渠道通知派发：消费用户事件或接收直接发送请求，
//! 渲染模板、持久化通知、经对应渠道投递并记录最终状态。
//!
//! ## 模块
//!
//! - [`models`]: 通知与模板实体、状态机
//! - [`repository`]: PostgreSQL / Redis / 内存三种存储后端
//! - [`providers`]: Email / SMS / Push 投递渠道
//! - [`template`]: 模板渲染与内置模板
//! - [`service`]: 编排流水线、事件路由、观测端口
//! - [`consumer`]: Kafka 用户事件消费
//! - [`api`]: HTTP 接口

pub mod api;
pub mod consumer;
pub mod error;
pub mod models;
pub mod providers;
pub mod repository;
pub mod service;
pub mod template;

pub use error::{NotificationError, Result};
pub use service::NotificationService;
