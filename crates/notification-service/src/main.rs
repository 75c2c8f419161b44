//! 通知服务入口
//!
//! 按配置选择存储后端，启动健康检查、HTTP 服务和 Kafka 用户事件消费者。

use std::sync::Arc;
use std::time::Duration;

use notification_service::api::{self, AppState};
use notification_service::consumer::EventConsumer;
use notification_service::providers::ProviderRegistry;
use notification_service::repository::memory::{
    InMemoryNotificationRepository, InMemoryTemplateRepository,
};
use notification_service::repository::postgres::{
    PgNotificationRepository, PgTemplateRepository, run_migrations,
};
use notification_service::repository::redis::{
    RedisNotificationRepository, RedisTemplateRepository,
};
use notification_service::repository::{NotificationRepository, TemplateRepository};
use notification_service::service::{MetricsObserver, NotificationService};
use notification_service::template::seed_default_templates;
use notify_shared::cache::Cache;
use notify_shared::config::{AppConfig, StorageBackend};
use notify_shared::database::Database;
use notify_shared::dlq::DlqProducer;
use notify_shared::health::{AlwaysHealthy, HealthChecker, HealthProbe};
use notify_shared::kafka::KafkaProducer;
use notify_shared::observability;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// 选定后端的仓储和健康探针
struct Storage {
    notifications: Arc<dyn NotificationRepository>,
    templates: Arc<dyn TemplateRepository>,
    probe: Arc<dyn HealthProbe>,
}

async fn connect_storage(config: &AppConfig) -> anyhow::Result<Storage> {
    match config.storage.backend {
        StorageBackend::Postgres => {
            let db = Database::connect(&config.database).await?;
            run_migrations(db.pool()).await?;
            Ok(Storage {
                notifications: Arc::new(PgNotificationRepository::new(db.pool().clone())),
                templates: Arc::new(PgTemplateRepository::new(db.pool().clone())),
                probe: Arc::new(db),
            })
        }
        StorageBackend::Redis => {
            let cache = Cache::new(&config.redis)?;
            let conn = cache.connection().await?;
            Ok(Storage {
                notifications: Arc::new(RedisNotificationRepository::new(
                    conn.clone(),
                    config.redis.retention(),
                )),
                templates: Arc::new(RedisTemplateRepository::new(conn)),
                probe: Arc::new(cache),
            })
        }
        StorageBackend::Memory => Ok(Storage {
            notifications: Arc::new(InMemoryNotificationRepository::new()),
            templates: Arc::new(InMemoryTemplateRepository::new()),
            probe: Arc::new(AlwaysHealthy),
        }),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load("notification-service")?;

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(
        backend = ?config.storage.backend,
        environment = %config.environment,
        "Starting notification-service on {}",
        config.server_addr()
    );

    let storage = connect_storage(&config).await?;

    let seeded = seed_default_templates(storage.templates.as_ref()).await?;
    info!(seeded, "内置模板检查完成");

    let service = Arc::new(
        NotificationService::new(
            storage.notifications,
            storage.templates,
            ProviderRegistry::with_defaults(&config.delivery),
        )
        .with_observer(Arc::new(MetricsObserver))
        .with_provider_timeout(Duration::from_secs(
            config.delivery.provider_timeout_seconds,
        )),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let health_checker = HealthChecker::new(storage.probe, &config.health);
    let health = health_checker.status_handle();
    let health_task = tokio::spawn(health_checker.run(shutdown_rx.clone()));

    let consumer_task = if config.kafka.enabled {
        let dlq = DlqProducer::new(
            KafkaProducer::new(&config.kafka)?,
            config.kafka.dlq_topic.clone(),
        );
        let consumer = EventConsumer::new(&config, service.clone(), dlq)?;
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = consumer.run(rx).await {
                error!(error = %e, "用户事件消费者异常退出");
            }
        }))
    } else {
        info!("Kafka 未启用，只提供 HTTP 接口");
        None
    };

    let app = api::router(AppState::new(service, health));
    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    if let Some(task) = consumer_task {
        let _ = task.await;
    }
    let _ = health_task.await;
    server.await??;

    info!("notification-service 已停止");
    Ok(())
}

/// 监听 Ctrl+C 和 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
