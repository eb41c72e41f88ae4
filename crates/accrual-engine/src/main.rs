//! 积分同步服务入口
//!
//! 加载配置、初始化可观测性、连接数据库并建表，然后运行积分同步引擎直到收到关闭信号。

use std::sync::Arc;

use accrual_engine::shutdown;
use accrual_engine::{AccrualEngine, HttpAccrualClient, PgAccrualStore};
use loyalty_shared::config::AppConfig;
use loyalty_shared::database::Database;
use loyalty_shared::error::LoyaltyError;
use loyalty_shared::observability;
use loyalty_shared::retry::{RetryPolicy, retry_with_policy};
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("accrual-sync")?;
    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!(
        environment = %config.environment,
        accrual_address = %config.accrual.address,
        "Starting accrual sync service"
    );

    // 容器编排时数据库可能晚于本服务就绪
    let db = retry_with_policy(
        &RetryPolicy::default(),
        "connect_database",
        LoyaltyError::is_retryable,
        || Database::connect(&config.database),
    )
    .await?;
    db.health_check().await?;

    let store = PgAccrualStore::new(db.pool().clone());
    store.bootstrap().await?;

    let client = HttpAccrualClient::new(&config.accrual)?;
    let engine = Arc::new(AccrualEngine::new(
        Arc::new(store),
        Arc::new(client),
        &config.accrual,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run(shutdown_rx).await })
    };

    shutdown::signal().await;
    let _ = shutdown_tx.send(true);

    if let Err(e) = runner.await {
        error!(error = %e, "积分同步引擎异常退出");
    }

    db.close().await;
    info!("Accrual sync service shutdown complete");
    Ok(())
}
