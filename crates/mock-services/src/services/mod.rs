//! Mock 服务模块

pub mod accrual_service;

pub use accrual_service::{AccrualServiceState, RateLimitConfig, accrual_routes};
