//! 编排观测端口
//!
//! 编排服务在固定检查点调用观测者，指标、审计等副作用都挂在这里，
//! 不直接写进流水线。

use std::time::Duration;

use notify_shared::observability::metrics;

use crate::models::Notification;

/// 派发来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchSource {
    /// 直接发送（HTTP 等调用方）
    Direct,
    /// 事件驱动，携带事件类型
    Event(&'static str),
    /// 调用方发起的重试
    Retry,
}

impl DispatchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Event(_) => "event",
            Self::Retry => "retry",
        }
    }
}

/// 观测者 trait，所有检查点默认空实现
pub trait NotificationObserver: Send + Sync {
    /// 校验通过、即将持久化
    fn on_start(&self, _notification: &Notification, _source: DispatchSource) {}

    /// 渠道受理成功
    fn on_success(&self, _notification: &Notification, _source: DispatchSource, _elapsed: Duration) {}

    /// 渠道投递失败
    fn on_failure(
        &self,
        _notification: &Notification,
        _source: DispatchSource,
        _reason: &str,
        _elapsed: Duration,
    ) {
    }

    /// 投递结果已确定，但最终状态写回失败
    fn on_persistence_warning(&self, _notification: &Notification, _warning: &str) {}
}

/// 不做任何事的观测者
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl NotificationObserver for NoopObserver {}

/// 把检查点转成 Prometheus 指标
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsObserver;

impl NotificationObserver for MetricsObserver {
    fn on_start(&self, notification: &Notification, source: DispatchSource) {
        metrics::record_notification_dispatch_started(
            source.as_str(),
            notification.notification_type.as_str(),
        );
    }

    fn on_success(&self, notification: &Notification, source: DispatchSource, elapsed: Duration) {
        metrics::record_notification_dispatch(
            source.as_str(),
            notification.notification_type.as_str(),
            "sent",
            elapsed.as_secs_f64(),
        );
    }

    fn on_failure(
        &self,
        notification: &Notification,
        source: DispatchSource,
        _reason: &str,
        elapsed: Duration,
    ) {
        metrics::record_notification_dispatch(
            source.as_str(),
            notification.notification_type.as_str(),
            "failed",
            elapsed.as_secs_f64(),
        );
    }

    fn on_persistence_warning(&self, notification: &Notification, _warning: &str) {
        metrics::record_persistence_warning(notification.notification_type.as_str());
    }
}
