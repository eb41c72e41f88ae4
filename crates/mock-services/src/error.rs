//! Mock 积分服务错误

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum MockError {
    #[error("奖励规则已存在: {0}")]
    DuplicateReward(String),

    #[error("订单已登记: {0}")]
    DuplicateOrder(String),

    #[error("请求格式错误: {0}")]
    InvalidRequest(String),
}

impl MockError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DuplicateReward(_) | Self::DuplicateOrder(_) => StatusCode::CONFLICT,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for MockError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}
