//! PostgreSQL 存储实现
//!
//! 批量写回在一个事务内完成，订单更新带 `status IN ('NEW', 'PROCESSING')` 守卫，
//! 只有真正发生迁移的行才会触发余额变更，重复提交同一结果不会重复入账。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loyalty_shared::error::{LoyaltyError, Result};
use sqlx::PgPool;
use tracing::{debug, info, instrument};

use super::AccrualStore;
use crate::models::{Balance, BatchSummary, Order, OrderOutcome, OrderStatus};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS balances (
    user_id     VARCHAR(64) PRIMARY KEY,
    current     DOUBLE PRECISION NOT NULL DEFAULT 0,
    withdrawn   DOUBLE PRECISION NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS orders (
    number      VARCHAR(64) PRIMARY KEY,
    user_id     VARCHAR(64) NOT NULL,
    status      VARCHAR(16) NOT NULL DEFAULT 'NEW',
    accrual     DOUBLE PRECISION NOT NULL DEFAULT 0 CHECK (accrual >= 0),
    uploaded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_orders_pending
    ON orders (uploaded_at)
    WHERE status IN ('NEW', 'PROCESSING');

CREATE TABLE IF NOT EXISTS retry_gates (
    service     VARCHAR(64) PRIMARY KEY,
    retry_at    TIMESTAMPTZ NOT NULL
);
"#;

/// 基于 sqlx 连接池的积分同步存储
#[derive(Clone)]
pub struct PgAccrualStore {
    pool: PgPool,
}

impl PgAccrualStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 建表（幂等）
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        info!("积分同步表结构已就绪");
        Ok(())
    }

    /// 上传订单，并确保用户余额行存在
    ///
    /// 订单上传本身由 API 层负责，这里主要服务于集成测试与数据修复脚本。
    pub async fn insert_order(&self, user_id: &str, number: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO balances (user_id) VALUES ($1)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO orders (number, user_id, status, accrual, uploaded_at)
            VALUES ($1, $2, 'NEW', 0, NOW())
            "#,
        )
        .bind(number)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_order(&self, number: &str) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT number, user_id, status, accrual, uploaded_at
            FROM orders
            WHERE number = $1
            "#,
        )
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    pub async fn get_balance(&self, user_id: &str) -> Result<Balance> {
        let balance = sqlx::query_as::<_, Balance>(
            "SELECT current, withdrawn FROM balances WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(balance.unwrap_or_default())
    }

    /// 按订单号查询所属用户
    pub async fn order_owner(&self, number: &str) -> Result<String> {
        sqlx::query_scalar::<_, String>("SELECT user_id FROM orders WHERE number = $1")
            .bind(number)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LoyaltyError::NotFound {
                entity: "Order".to_string(),
                id: number.to_string(),
            })
    }
}

#[async_trait]
impl AccrualStore for PgAccrualStore {
    async fn list_pending_for_accrual(&self) -> Result<Vec<String>> {
        let numbers = sqlx::query_scalar::<_, String>(
            r#"
            SELECT number
            FROM orders
            WHERE status IN ('NEW', 'PROCESSING')
            ORDER BY uploaded_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(numbers)
    }

    #[instrument(skip(self, outcomes), fields(batch_size = outcomes.len()))]
    async fn apply_accrual_batch(&self, outcomes: &[OrderOutcome]) -> Result<BatchSummary> {
        let mut tx = self.pool.begin().await?;
        let mut summary = BatchSummary::default();

        for outcome in outcomes {
            // PROCESSING 只能从 NEW 迁移，终态可以从 NEW 或 PROCESSING 迁移
            let owner: Option<String> = sqlx::query_scalar(
                r#"
                UPDATE orders
                SET status = $2, accrual = $3
                WHERE number = $1
                  AND (status = 'NEW' OR (status = 'PROCESSING' AND $2 <> 'PROCESSING'))
                RETURNING user_id
                "#,
            )
            .bind(&outcome.order_number)
            .bind(outcome.status)
            .bind(outcome.accrual)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(user_id) = owner else {
                debug!(order = %outcome.order_number, status = %outcome.status, "订单无需迁移，跳过");
                summary.skipped += 1;
                continue;
            };

            if outcome.status == OrderStatus::Processed {
                sqlx::query(
                    r#"
                    INSERT INTO balances (user_id, current) VALUES ($1, $2)
                    ON CONFLICT (user_id) DO UPDATE
                    SET current = balances.current + EXCLUDED.current
                    "#,
                )
                .bind(&user_id)
                .bind(outcome.accrual)
                .execute(&mut *tx)
                .await?;
                summary.credited += outcome.accrual;
            }

            summary.applied += 1;
        }

        tx.commit().await?;
        Ok(summary)
    }

    async fn get_retry_gate(&self, service_key: &str) -> Result<Option<DateTime<Utc>>> {
        let retry_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT retry_at FROM retry_gates WHERE service = $1",
        )
        .bind(service_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(retry_at)
    }

    async fn set_retry_gate(&self, service_key: &str, retry_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO retry_gates (service, retry_at) VALUES ($1, $2)
            ON CONFLICT (service) DO UPDATE SET retry_at = EXCLUDED.retry_at
            "#,
        )
        .bind(service_key)
        .bind(retry_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
