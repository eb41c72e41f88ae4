//! 测试辅助工具模块
//!
//! 提供 Mock 积分服务 API 客户端与断言宏。

mod api_client;
mod assertions;

pub use api_client::*;
