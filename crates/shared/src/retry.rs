//! 事件处理的退避重试
//!
//! 消费者在把事件判为死信之前，先对存储抖动之类的瞬时错误按指数退避重试。

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RetryConfig;

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大重试次数（不含首次执行）
    pub max_retries: u32,
    /// 首次重试前的等待时间
    pub initial_delay: Duration,
    /// 退避时间上限
    pub max_delay: Duration,
    /// 每次重试的退避倍数
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
        }
    }
}

impl RetryPolicy {
    /// 第 N 次重试前的等待时间（attempt 从 0 开始）
    ///
    /// initial_delay * multiplier^attempt，不超过 max_delay。
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = scaled.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// 依次给出每轮重试前的等待时间，共 max_retries 项
    pub fn backoff(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }
}

/// 按策略重复执行 `operation`
///
/// 只有 `is_retryable` 认可的错误才会进入退避，其他错误原样返回；
/// 退避次数用尽后返回最后一次的错误。
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut backoff = policy.backoff().enumerate();

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !is_retryable(&err) => return Err(err),
            Err(err) => err,
        };

        let Some((attempt, delay)) = backoff.next() else {
            warn!(
                operation = operation_name,
                max_retries = policy.max_retries,
                error = %err,
                "重试次数用尽"
            );
            return Err(err);
        };

        debug!(
            operation = operation_name,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "瞬时错误，退避后重试"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SharedError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_for_attempt_exponential_backoff() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = RetryPolicy {
            max_retries: 10,
            max_delay: Duration::from_secs(5),
            ..RetryPolicy::default()
        };

        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_yields_one_delay_per_retry() {
        let delays: Vec<_> = fast_policy(4).backoff().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(1),
                Duration::from_millis(2),
                Duration::from_millis(4),
                Duration::from_millis(8),
            ]
        );
        assert_eq!(fast_policy(0).backoff().count(), 0);
    }

    #[test]
    fn test_from_config() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay_ms: 200,
            max_delay_ms: 1_000,
            multiplier: 3.0,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(600));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let call_count = Arc::new(AtomicU32::new(0));
        let counter = call_count.clone();

        let result = retry_with_policy(
            &fast_policy(3),
            "handle_event",
            SharedError::is_retryable,
            || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(SharedError::Kafka("broker 暂时不可用".into()))
                    } else {
                        Ok(n)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let call_count = Arc::new(AtomicU32::new(0));
        let counter = call_count.clone();

        let result: Result<(), SharedError> = retry_with_policy(
            &fast_policy(3),
            "handle_event",
            SharedError::is_retryable,
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(SharedError::Internal("格式错误".into()))
                }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let call_count = Arc::new(AtomicU32::new(0));
        let counter = call_count.clone();

        let result: Result<(), SharedError> = retry_with_policy(
            &fast_policy(2),
            "handle_event",
            |_| true,
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(SharedError::Kafka("一直失败".into()))
                }
            },
        )
        .await;

        assert!(result.is_err());
        // 首次 + 2 次重试
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }
}
