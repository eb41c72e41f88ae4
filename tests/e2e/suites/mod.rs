//! 测试套件模块
//!
//! 按场景组织的测试用例集合。

pub mod rate_limit;
pub mod settlement;
