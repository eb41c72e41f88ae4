//! 积分同步引擎错误类型
//!
//! 区分拉取、提交、限流闸门与外部请求几类失败，便于上层决定本轮放弃还是记录后继续。
//! 引擎内没有致命错误，所有失败都会在下一个轮询周期重新尝试。

use loyalty_shared::error::LoyaltyError;

#[derive(Debug, thiserror::Error)]
pub enum AccrualError {
    /// 拉取待同步订单失败，本轮放弃
    #[error("拉取待同步订单失败: {0}")]
    Listing(#[source] LoyaltyError),

    /// 批量事务失败，整批回滚，订单保持待同步
    #[error("批量提交失败: orders={orders}, 原因={source}")]
    Commit {
        orders: usize,
        #[source]
        source: LoyaltyError,
    },

    /// 限流闸门读写存储失败
    #[error("限流闸门读写失败: service={service}, 原因={source}")]
    Gate {
        service: String,
        #[source]
        source: LoyaltyError,
    },

    /// HTTP 客户端构建或传输错误
    #[error("积分服务请求失败: {0}")]
    Transport(#[from] reqwest::Error),

    /// 200 响应但响应体无法识别
    #[error("积分服务响应格式错误: {0}")]
    MalformedResponse(String),

    #[error("积分服务返回非预期状态码: {0}")]
    UnexpectedStatus(u16),

    /// 进程关闭导致请求未完成
    #[error("请求已取消")]
    Cancelled,
}

impl AccrualError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Listing(_) => "LISTING_FAILED",
            Self::Commit { .. } => "COMMIT_FAILED",
            Self::Gate { .. } => "GATE_STORAGE_FAILED",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::MalformedResponse(_) => "MALFORMED_RESPONSE",
            Self::UnexpectedStatus(_) => "UNEXPECTED_STATUS",
            Self::Cancelled => "CANCELLED",
        }
    }
}
