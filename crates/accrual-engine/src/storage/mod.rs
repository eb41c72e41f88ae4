//! 存储端口
//!
//! 引擎只依赖 `AccrualStore` 抽象：拉取待同步订单、读写限流闸门、事务性地批量写回结果。
//! 提供 PostgreSQL 实现与内存实现，后者用于测试和本地联调。

mod memory;
mod postgres;

pub use memory::InMemoryAccrualStore;
pub use postgres::PgAccrualStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loyalty_shared::error::Result;

use crate::models::{BatchSummary, OrderOutcome};

/// 积分同步存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccrualStore: Send + Sync {
    /// 列出状态为 NEW 或 PROCESSING 的订单号，按上传时间升序
    async fn list_pending_for_accrual(&self) -> Result<Vec<String>>;

    /// 在单个事务中写回一批订单结果
    ///
    /// 已处于终态的订单被跳过；订单迁移到 PROCESSED 时把积分计入所属用户的余额。
    /// 任一行失败则整批回滚。
    async fn apply_accrual_batch(&self, outcomes: &[OrderOutcome]) -> Result<BatchSummary>;

    /// 读取服务的下一次允许调用时间，从未写入时返回 None
    async fn get_retry_gate(&self, service_key: &str) -> Result<Option<DateTime<Utc>>>;

    /// 覆盖写入服务的下一次允许调用时间
    async fn set_retry_gate(&self, service_key: &str, retry_at: DateTime<Utc>) -> Result<()>;
}
