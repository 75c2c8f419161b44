//! 共享库
//!
//! 通知服务共用的配置、错误处理、数据库连接、Redis、Kafka、健康检查与可观测性基础设施。

pub mod cache;
pub mod config;
pub mod database;
pub mod dlq;
pub mod error;
pub mod health;
pub mod kafka;
pub mod observability;
pub mod retry;
