//! 积分同步领域模型
//!
//! 订单状态、余额、外部服务响应与单次查询结果。
//! 订单和余额支持数据库（sqlx）和 JSON（serde）序列化。

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 订单状态
///
/// 状态只能单调推进：NEW → PROCESSING → {PROCESSED, INVALID}
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// 已上传，尚未被积分服务受理
    #[default]
    New,
    /// 积分服务已受理，结果未出
    Processing,
    /// 计算完成，积分已入账（终态）
    Processed,
    /// 积分服务拒绝计算（终态）
    Invalid,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Processing => "PROCESSING",
            Self::Processed => "PROCESSED",
            Self::Invalid => "INVALID",
        }
    }

    /// PROCESSED 与 INVALID 为终态，不再变更
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Invalid)
    }

    /// 是否允许从当前状态迁移到 `next`
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self, next) {
            (Self::New, Self::Processing) => true,
            (Self::New | Self::Processing, Self::Processed | Self::Invalid) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 订单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub number: String,
    pub user_id: String,
    pub status: OrderStatus,
    /// 仅在 PROCESSED 时有意义
    pub accrual: f64,
    pub uploaded_at: DateTime<Utc>,
}

/// 用户余额
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Balance {
    /// 可用积分
    pub current: f64,
    /// 累计已使用积分（由提现流程维护）
    pub withdrawn: f64,
}

/// 积分计算服务返回的订单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccrualStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

/// 积分计算服务 `GET /api/orders/{number}` 的响应体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualResponse {
    pub order: String,
    pub status: AccrualStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<f64>,
}

/// 单次查询的分类结果
#[derive(Debug, Clone, PartialEq)]
pub enum AccrualOutcome {
    /// 已决出终态（PROCESSED 或 INVALID），INVALID 的积分为 0
    Resolved { status: OrderStatus, accrual: f64 },
    /// 已受理但尚无结论
    Pending,
    /// 积分服务不认识该订单
    Unregistered,
    /// 被限流，需等待 retry_after 后再请求
    RateLimited { retry_after: Duration },
    /// 网络错误、服务端错误、响应格式错误或请求被取消
    Transient { reason: String },
}

impl AccrualOutcome {
    /// 用于日志与指标的简短标签
    pub fn label(&self) -> &'static str {
        match self {
            Self::Resolved {
                status: OrderStatus::Processed,
                ..
            } => "processed",
            Self::Resolved { .. } => "invalid",
            Self::Pending => "pending",
            Self::Unregistered => "unregistered",
            Self::RateLimited { .. } => "rate_limited",
            Self::Transient { .. } => "transient",
        }
    }
}

/// worker 产出的单笔结果，只存活于一个轮询周期
#[derive(Debug, Clone, PartialEq)]
pub struct AccrualResult {
    pub order_number: String,
    /// 积分服务返回的 HTTP 状态码，网络错误或取消时为 None
    pub http_status: Option<u16>,
    pub outcome: AccrualOutcome,
}

impl AccrualResult {
    pub fn new(order_number: impl Into<String>, http_status: Option<u16>, outcome: AccrualOutcome) -> Self {
        Self {
            order_number: order_number.into(),
            http_status,
            outcome,
        }
    }

    /// 解析出的订单状态；未决或失败时为 None
    pub fn order_status(&self) -> Option<OrderStatus> {
        match &self.outcome {
            AccrualOutcome::Resolved { status, .. } => Some(*status),
            AccrualOutcome::Pending => Some(OrderStatus::Processing),
            _ => None,
        }
    }

    /// 解析出的积分，仅终态结果有值
    pub fn accrual(&self) -> Option<f64> {
        match &self.outcome {
            AccrualOutcome::Resolved { accrual, .. } => Some(*accrual),
            _ => None,
        }
    }

    /// 需要写回存储的订单变更；Unregistered / RateLimited / Transient 不写
    pub fn to_order_outcome(&self) -> Option<OrderOutcome> {
        self.order_status().map(|status| OrderOutcome {
            order_number: self.order_number.clone(),
            status,
            accrual: self.accrual().unwrap_or(0.0),
        })
    }
}

/// 提交给存储的单笔订单变更
#[derive(Debug, Clone, PartialEq)]
pub struct OrderOutcome {
    pub order_number: String,
    pub status: OrderStatus,
    pub accrual: f64,
}

/// 一次批量提交的实际效果
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchSummary {
    /// 实际发生状态迁移的订单数
    pub applied: usize,
    /// 因已处于终态、状态未变或订单不存在而跳过的数量
    pub skipped: usize,
    /// 本批次计入余额的积分总额
    pub credited: f64,
}
