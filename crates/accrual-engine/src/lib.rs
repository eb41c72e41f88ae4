//! 积分同步引擎
//!
//! 周期性拉取待计算订单，经由有界队列分发给固定数量的 worker 并发查询外部积分计算服务，
//! 再将已决出的结果在单个事务中批量写回订单状态与用户余额。
//! 外部服务的限流状态持久化在存储中，所有 worker 在每次请求前都会检查限流闸门。

pub mod client;
pub mod committer;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod gate;
pub mod models;
pub mod pool;
pub mod shutdown;
pub mod storage;

pub use client::{AccrualClient, HttpAccrualClient};
pub use engine::{AccrualEngine, CycleReport};
pub use error::AccrualError;
pub use models::{AccrualOutcome, AccrualResult, OrderOutcome, OrderStatus};
pub use storage::{AccrualStore, InMemoryAccrualStore, PgAccrualStore};
