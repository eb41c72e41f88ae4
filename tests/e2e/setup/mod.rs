//! 测试环境设置模块
//!
//! 启动 Mock 积分服务并组装积分同步引擎。

mod environment;

pub use environment::{TestEnvConfig, TestEnvironment};
