//! 通知编排服务
//!
//! 直接发送和事件驱动共用一条流水线：
//! 校验 → 选择渠道 → 持久化 → 投递 → 写回最终状态。
//!
//! 投递结果一旦确定，最终状态写回失败只作为 [`DispatchReport::persistence_warning`]
//! 报告，不改变调用结果。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::events;
use super::observer::{DispatchSource, NoopObserver, NotificationObserver};
use crate::error::{NotificationError, Result};
use crate::models::{Notification, NotificationStatus, NotificationType};
use crate::providers::{DeliveryProvider, ProviderRegistry};
use crate::repository::{NotificationRepository, TemplateRepository};
use crate::template::{TemplateRenderer, value_to_string};

/// 渠道调用默认超时
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// 投递结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent {
        message_id: String,
    },
    Failed {
        channel: NotificationType,
        reason: String,
    },
}

/// 一次派发的完整结果
#[derive(Debug, Clone)]
pub struct DispatchReport {
    /// 派发后的通知（内存中的最终状态）
    pub notification: Notification,
    pub outcome: DeliveryOutcome,
    /// 最终状态写回失败时的原因
    pub persistence_warning: Option<String>,
    /// 状态机拒绝了投递结果对应的流转，此时内存与存储中的状态未改变
    pub transition_error: Option<String>,
}

impl DispatchReport {
    pub fn is_delivered(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Sent { .. })
    }

    /// 投递成功返回通知，投递失败返回 `Delivery` 错误
    pub fn into_result(self) -> Result<Notification> {
        match self.outcome {
            DeliveryOutcome::Sent { .. } => Ok(self.notification),
            DeliveryOutcome::Failed { channel, reason } => {
                Err(NotificationError::Delivery { channel, reason })
            }
        }
    }
}

/// 通知编排服务
#[derive(Clone)]
pub struct NotificationService {
    notifications: Arc<dyn NotificationRepository>,
    renderer: TemplateRenderer,
    providers: ProviderRegistry,
    observer: Arc<dyn NotificationObserver>,
    provider_timeout: Duration,
}

impl NotificationService {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        templates: Arc<dyn TemplateRepository>,
        providers: ProviderRegistry,
    ) -> Self {
        Self {
            notifications,
            renderer: TemplateRenderer::new(templates),
            providers,
            observer: Arc::new(NoopObserver),
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn NotificationObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    // ==================== 直接发送 ====================

    /// 直接发送，投递失败以 `Delivery` 错误返回
    #[instrument(
        skip(self, notification),
        fields(notification_id = %notification.id, notification_type = %notification.notification_type)
    )]
    pub async fn send_notification(&self, notification: Notification) -> Result<Notification> {
        self.dispatch(notification, DispatchSource::Direct)
            .await?
            .into_result()
    }

    /// 执行完整流水线并返回详细结果
    ///
    /// 校验失败、状态不是 Pending、渠道不支持、首次持久化失败时返回错误，且不会调用渠道。
    pub async fn dispatch(
        &self,
        notification: Notification,
        source: DispatchSource,
    ) -> Result<DispatchReport> {
        notification.validate()?;
        if notification.status != NotificationStatus::Pending {
            return Err(NotificationError::Validation(format!(
                "只能派发 pending 状态的通知，当前为 {}",
                notification.status
            )));
        }
        let provider = self.providers.resolve(notification.notification_type)?;

        self.observer.on_start(&notification, source);
        self.notifications.save(&notification).await?;

        Ok(self.deliver(provider, notification, source).await)
    }

    async fn deliver(
        &self,
        provider: Arc<dyn DeliveryProvider>,
        mut notification: Notification,
        source: DispatchSource,
    ) -> DispatchReport {
        let channel = notification.notification_type;
        let started = Instant::now();

        let result = match tokio::time::timeout(
            self.provider_timeout,
            provider.send(
                &notification.recipient,
                &notification.subject,
                &notification.content,
            ),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(NotificationError::Delivery {
                channel,
                reason: format!("渠道调用超时 ({}ms)", self.provider_timeout.as_millis()),
            }),
        };
        let elapsed = started.elapsed();
        let mut transition_error = None;

        let outcome = match result {
            Ok(receipt) => {
                if let Err(e) = notification.mark_sent() {
                    warn!(notification_id = %notification.id, error = %e, "标记已发送失败");
                    transition_error = Some(e.to_string());
                }
                info!(
                    notification_id = %notification.id,
                    message_id = %receipt.message_id,
                    "通知已发送"
                );
                self.observer.on_success(&notification, source, elapsed);
                DeliveryOutcome::Sent {
                    message_id: receipt.message_id,
                }
            }
            Err(err) => {
                let reason = err.failure_reason();
                if let Err(e) = notification.mark_failed(reason.clone()) {
                    warn!(notification_id = %notification.id, error = %e, "标记失败状态失败");
                    transition_error = Some(e.to_string());
                }
                warn!(notification_id = %notification.id, %channel, reason = %reason, "通知发送失败");
                self.observer
                    .on_failure(&notification, source, &reason, elapsed);
                DeliveryOutcome::Failed { channel, reason }
            }
        };

        let persistence_warning = match self.notifications.update(&notification).await {
            Ok(()) => None,
            Err(err) => {
                error!(
                    notification_id = %notification.id,
                    error = %err,
                    "投递后写回通知状态失败"
                );
                let warning = err.to_string();
                self.observer
                    .on_persistence_warning(&notification, &warning);
                Some(warning)
            }
        };

        DispatchReport {
            notification,
            outcome,
            persistence_warning,
            transition_error,
        }
    }

    // ==================== 事件驱动 ====================

    /// 处理一条用户事件
    ///
    /// 解码失败、事件类型未知、模板缺失时不持久化任何记录。
    #[instrument(skip(self, payload), fields(payload_len = payload.len()))]
    pub async fn handle_event(&self, event_type: &str, payload: &[u8]) -> Result<Notification> {
        self.handle_event_report(event_type, payload)
            .await?
            .into_result()
    }

    /// 同 [`Self::handle_event`]，但返回详细结果
    pub async fn handle_event_report(
        &self,
        event_type: &str,
        payload: &[u8],
    ) -> Result<DispatchReport> {
        let route = events::route_for(event_type)?;
        let ctx = route.decode(payload)?;

        let rendered = self
            .renderer
            .render(route.template_name, &ctx.data, None)
            .await?;

        let template_data: HashMap<String, String> = ctx
            .data
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect();

        let notification = Notification::new(
            NotificationType::Email,
            ctx.recipient,
            route.subject,
            rendered.content,
        )
        .with_template(rendered.template_id, rendered.template_type)
        .with_template_data(template_data)
        .with_metadata("eventType", route.event_type)
        .with_metadata("userId", ctx.user_id);

        self.dispatch(notification, DispatchSource::Event(route.event_type))
            .await
    }

    // ==================== 查询 ====================

    pub async fn get_notification(&self, id: Uuid) -> Result<Notification> {
        self.notifications
            .find_by_id(id)
            .await?
            .ok_or_else(|| NotificationError::notification_not_found(id))
    }

    pub async fn get_notification_history(
        &self,
        recipient: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>> {
        self.notifications
            .find_by_recipient(recipient, limit, offset)
            .await
    }

    // ==================== 运维操作 ====================

    /// 重新投递一条失败的通知
    ///
    /// 只接受 `Failed` 状态；重试次数加一后经同一渠道投递，结果写回原记录。
    #[instrument(skip(self))]
    pub async fn retry_notification(&self, id: Uuid) -> Result<Notification> {
        let mut notification = self.get_notification(id).await?;
        if notification.status != NotificationStatus::Failed {
            return Err(NotificationError::InvalidTransition {
                from: notification.status,
                to: NotificationStatus::Sent,
            });
        }

        let provider = self.providers.resolve(notification.notification_type)?;
        notification.increment_retry_count();
        info!(retry_count = notification.retry_count, "重试通知");

        self.deliver(provider, notification, DispatchSource::Retry)
            .await
            .into_result()
    }

    /// 取消尚未发送的通知
    #[instrument(skip(self))]
    pub async fn cancel_notification(&self, id: Uuid) -> Result<Notification> {
        let mut notification = self.get_notification(id).await?;
        notification.cancel()?;
        self.notifications.update(&notification).await?;
        info!("通知已取消");
        Ok(notification)
    }
}
