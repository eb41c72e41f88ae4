//! PostgreSQL 连接池
//!
//! 积分同步服务只持有一个连接池，启动时连接并做一次探活，退出前显式关闭。

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, instrument};

use crate::config::DatabaseConfig;
use crate::error::Result;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 按配置建立连接池
    ///
    /// 连接失败返回 `LoyaltyError::Database`，调用方可配合重试执行器等待数据库就绪。
    #[instrument(skip(config), fields(max_connections = config.max_connections))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "数据库连接池已建立"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 执行一次 `SELECT 1` 确认连接可用
    pub async fn health_check(&self) -> Result<()> {
        let started = Instant::now();
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "数据库探活成功");
        Ok(())
    }

    /// 等待在途查询结束后关闭连接池
    pub async fn close(&self) {
        self.pool.close().await;
        info!("数据库连接池已关闭");
    }
}
