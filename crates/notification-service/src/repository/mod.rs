//! 仓储层
//!
//! 通知与模板的持久化契约及其实现。
//!
//! ## 设计原则
//!
//! - 仓储只负责持久化与检索，不包含业务规则
//! - PostgreSQL（永久保留）与 Redis（按保留期过期）对外语义一致
//! - 查不到返回 `Ok(None)`，更新不存在的记录返回 `NotFound`，删除幂等

pub mod memory;
pub mod postgres;
pub mod redis;
mod traits;

pub use traits::*;
