//! 存储健康检查
//!
//! 以固定间隔探测存储后端，每次探测受超时约束；结果写入共享快照供 `/health`
//! 读取，同时更新健康与连接池指标。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::config::HealthConfig;
use crate::database::Database;
use crate::error::Result;
use crate::observability::metrics;

/// 可探测的存储后端
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// 后端名称，用作指标标签
    fn name(&self) -> &'static str;

    async fn ping(&self) -> Result<()>;

    /// 上报连接池状态，默认不做任何事
    fn report_pool(&self) {}
}

#[async_trait]
impl HealthProbe for Database {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<()> {
        self.health_check().await
    }

    fn report_pool(&self) {
        let (size, idle) = self.pool_stats();
        metrics::set_store_connections(self.name(), "open", size as f64);
        metrics::set_store_connections(self.name(), "idle", idle as f64);
    }
}

#[async_trait]
impl HealthProbe for Cache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> Result<()> {
        self.health_check().await
    }
}

/// 始终健康的探针（进程内存储）
pub struct AlwaysHealthy;

#[async_trait]
impl HealthProbe for AlwaysHealthy {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// 最近一次探测结果
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub backend: &'static str,
    pub healthy: bool,
    pub last_error: Option<String>,
    pub checked_at: Option<DateTime<Utc>>,
}

/// 健康检查器
pub struct HealthChecker {
    probe: Arc<dyn HealthProbe>,
    interval: Duration,
    timeout: Duration,
    status: Arc<RwLock<HealthStatus>>,
}

impl HealthChecker {
    pub fn new(probe: Arc<dyn HealthProbe>, config: &HealthConfig) -> Self {
        let status = HealthStatus {
            backend: probe.name(),
            // 首次探测前视为健康，避免启动瞬间被摘流
            healthy: true,
            last_error: None,
            checked_at: None,
        };
        Self {
            probe,
            interval: Duration::from_secs(config.interval_seconds.max(1)),
            timeout: Duration::from_secs(config.timeout_seconds.max(1)),
            status: Arc::new(RwLock::new(status)),
        }
    }

    /// 共享的状态快照句柄
    pub fn status_handle(&self) -> Arc<RwLock<HealthStatus>> {
        self.status.clone()
    }

    /// 执行一次探测并更新快照
    pub async fn check_once(&self) -> HealthStatus {
        let backend = self.probe.name();
        let outcome = tokio::time::timeout(self.timeout, self.probe.ping()).await;

        let last_error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("健康检查超时（{:?}）", self.timeout)),
        };
        let healthy = last_error.is_none();

        match &last_error {
            None => debug!(backend, "存储健康检查通过"),
            Some(e) => warn!(backend, error = %e, "存储健康检查失败"),
        }

        metrics::set_store_health(backend, healthy);
        self.probe.report_pool();

        let snapshot = HealthStatus {
            backend,
            healthy,
            last_error,
            checked_at: Some(Utc::now()),
        };
        *self.status.write() = snapshot.clone();
        snapshot
    }

    /// 周期探测，直到收到关闭信号
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            backend = self.probe.name(),
            interval = ?self.interval,
            timeout = ?self.timeout,
            "健康检查已启动"
        );

        loop {
            self.check_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("健康检查退出");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SharedError;

    struct FailingProbe;

    #[async_trait]
    impl HealthProbe for FailingProbe {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn ping(&self) -> Result<()> {
            Err(SharedError::Internal("connection refused".into()))
        }
    }

    struct SlowProbe;

    #[async_trait]
    impl HealthProbe for SlowProbe {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn ping(&self) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    fn config() -> HealthConfig {
        HealthConfig {
            interval_seconds: 1,
            timeout_seconds: 1,
        }
    }

    #[tokio::test]
    async fn test_healthy_probe() {
        let checker = HealthChecker::new(Arc::new(AlwaysHealthy), &config());
        let status = checker.check_once().await;
        assert!(status.healthy);
        assert_eq!(status.backend, "memory");
        assert!(checker.status_handle().read().checked_at.is_some());
    }

    #[tokio::test]
    async fn test_failing_probe_records_error() {
        let checker = HealthChecker::new(Arc::new(FailingProbe), &config());
        let status = checker.check_once().await;
        assert!(!status.healthy);
        assert!(status.last_error.unwrap().contains("connection refused"));
        assert!(!checker.status_handle().read().healthy);
    }

    #[tokio::test]
    async fn test_slow_probe_times_out() {
        let checker = HealthChecker::new(Arc::new(SlowProbe), &config());
        let status = checker.check_once().await;
        assert!(!status.healthy);
        assert!(status.last_error.unwrap().contains("超时"));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let checker = HealthChecker::new(Arc::new(AlwaysHealthy), &config());
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(checker.run(rx));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
