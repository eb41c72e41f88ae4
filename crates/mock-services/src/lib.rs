//! Mock Services
//!
//! 模拟外部积分计算服务，用于开发和端到端测试。
//!
//! # 主要模块
//!
//! - `models`: 奖励规则、订单登记与查询响应
//! - `store`: 内存存储实现
//! - `services`: REST API 路由与处理器
//! - `server`: HTTP 服务启动
//!
//! # 使用示例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mock_services::server::spawn_server;
//! use mock_services::services::AccrualServiceState;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let state = Arc::new(AccrualServiceState::new());
//! let (addr, _handle) = spawn_server(state.clone()).await?;
//! println!("mock accrual listening on http://{}", addr);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod models;
pub mod server;
pub mod services;
pub mod store;
