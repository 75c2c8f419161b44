//! Redis 连接管理模块

use crate::config::RedisConfig;
use crate::error::{Result, SharedError};
use redis::Client;
use redis::aio::MultiplexedConnection;
use tracing::info;

/// Redis 客户端包装
#[derive(Clone)]
pub struct Cache {
    client: Client,
}

impl Cache {
    /// 创建 Redis 客户端（惰性连接）
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        info!("Redis client created");
        Ok(Self { client })
    }

    /// 获取多路复用连接
    ///
    /// 多路复用连接可以 clone 后在多个任务间共享。
    pub async fn connection(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(SharedError::from)
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(SharedError::from)
    }
}
