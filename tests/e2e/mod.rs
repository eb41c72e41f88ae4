//! 积分同步端到端测试
//!
//! 每个测试启动独立的 Mock 积分服务，以真实 HTTP 驱动积分同步引擎，覆盖：
//! - 未登记、零积分、规则命中、批量并发等典型场景
//! - 多用户混合批次与跨周期状态推进
//! - 提交失败的整批回滚
//! - 限流闸门与优雅关闭

pub mod helpers;
pub mod setup;
pub mod suites;

pub use setup::TestEnvironment;
