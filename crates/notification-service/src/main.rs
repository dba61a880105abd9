//! 通知服务工作进程
//!
//! 独立运行的通知管线入口：加载配置、连接基础设施、装配通知服务，
//! 然后等待退出信号，按依赖关系逆序优雅关闭。

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

use notification_service::repository::{NotificationRepository, NotificationStore};
use notification_service::service::NotificationService;
use vclip_shared::{cache::Cache, config::AppConfig, database::Database, logging};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置，加载失败时退回默认值
    let config = AppConfig::load("notification-service").unwrap_or_else(|e| {
        eprintln!("配置加载失败，使用默认配置: {e}");
        AppConfig::default()
    });

    // 2. 初始化结构化日志
    logging::init(&config.observability)?;

    info!(
        service = %config.service_name,
        environment = %config.environment,
        "notification-worker 启动中"
    );

    let config = Arc::new(config);

    // 3. 连接 Postgres 并探活，坏后端在启动期就失败
    let db = Database::connect(&config.database).await?;
    db.health_check().await?;
    info!("数据库连接就绪");

    // 4. 连接 Redis（去重窗口）并探活
    let cache = Cache::new(&config.redis)?;
    cache.health_check().await?;
    info!("Redis 连接就绪");

    // 5. 创建通知仓储
    let repository = Arc::new(NotificationRepository::new(db.pool().clone(), &config));

    // 6. 装配通知服务：生产者、消费者与读写门面
    let service =
        NotificationService::new(config.clone(), Some(repository.clone()), cache).await?;
    info!(
        enabled = service.is_enabled(),
        consuming = service.is_consuming(),
        "通知服务装配完成"
    );

    // 7. 等待退出信号
    shutdown_signal().await;

    // 8. 逆序关闭：先停消费与发布，再关存储
    service.close().await;
    repository.close().await;
    info!("notification-worker 已退出");

    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号，用于 Kubernetes 优雅关闭
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到 Ctrl+C，开始优雅关闭");
        }
        _ = terminate => {
            info!("收到 SIGTERM，开始优雅关闭");
        }
    }
}
