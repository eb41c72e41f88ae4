//! 积分计算服务客户端
//!
//! 每笔订单发起一次 `GET {address}/api/orders/{number}`，并把原始响应分类为
//! [`AccrualOutcome`]。客户端本身不做任何重试，未完成的订单由下一轮轮询再次查询。

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loyalty_shared::config::AccrualConfig;
use tracing::debug;

use crate::error::AccrualError;
use crate::models::{AccrualOutcome, AccrualResponse, AccrualResult, AccrualStatus, OrderStatus};

/// Retry-After 的上限，防止异常响应让引擎长时间停摆
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// 积分计算服务的抽象接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccrualClient: Send + Sync {
    /// 查询单笔订单，任何失败都被归类为结果而不是错误
    async fn fetch(&self, order_number: &str) -> AccrualResult;
}

/// 基于 reqwest 的 HTTP 实现
#[derive(Debug, Clone)]
pub struct HttpAccrualClient {
    http: reqwest::Client,
    base_url: String,
    default_retry_after: Duration,
}

impl HttpAccrualClient {
    pub fn new(config: &AccrualConfig) -> Result<Self, AccrualError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.address.trim_end_matches('/').to_string(),
            default_retry_after: config.default_retry_after(),
        })
    }

    fn order_url(&self, order_number: &str) -> String {
        format!("{}/api/orders/{}", self.base_url, order_number)
    }
}

#[async_trait]
impl AccrualClient for HttpAccrualClient {
    async fn fetch(&self, order_number: &str) -> AccrualResult {
        let response = match self.http.get(self.order_url(order_number)).send().await {
            Ok(response) => response,
            Err(e) => {
                return transient(order_number, None, AccrualError::Transport(e));
            }
        };

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                return transient(order_number, Some(status), AccrualError::Transport(e));
            }
        };

        let result = classify(
            order_number,
            status,
            retry_after.as_deref(),
            &body,
            self.default_retry_after,
        );
        debug!(order = %order_number, status, outcome = result.outcome.label(), "积分服务已响应");
        result
    }
}

fn transient(order_number: &str, http_status: Option<u16>, err: AccrualError) -> AccrualResult {
    AccrualResult::new(
        order_number,
        http_status,
        AccrualOutcome::Transient {
            reason: err.to_string(),
        },
    )
}

/// 把一次 HTTP 响应分类为查询结果
///
/// | 状态码 | 结果 |
/// |---|---|
/// | 200 | 按响应体中的 status 决定；响应体非法时为 Transient |
/// | 202 | Pending |
/// | 204 | Unregistered |
/// | 429 | RateLimited，等待时间取自 Retry-After |
/// | 其他 | Transient |
pub fn classify(
    order_number: &str,
    status: u16,
    retry_after: Option<&str>,
    body: &[u8],
    default_retry_after: Duration,
) -> AccrualResult {
    let outcome = match status {
        200 => match parse_body(order_number, body) {
            Ok(outcome) => outcome,
            Err(e) => AccrualOutcome::Transient {
                reason: e.to_string(),
            },
        },
        202 => AccrualOutcome::Pending,
        204 => AccrualOutcome::Unregistered,
        429 => AccrualOutcome::RateLimited {
            retry_after: retry_after
                .and_then(|v| parse_retry_after(v, Utc::now()))
                .unwrap_or(default_retry_after),
        },
        other => AccrualOutcome::Transient {
            reason: AccrualError::UnexpectedStatus(other).to_string(),
        },
    };

    AccrualResult::new(order_number, Some(status), outcome)
}

fn parse_body(order_number: &str, body: &[u8]) -> Result<AccrualOutcome, AccrualError> {
    let response: AccrualResponse = serde_json::from_slice(body)
        .map_err(|e| AccrualError::MalformedResponse(e.to_string()))?;

    if response.order != order_number {
        return Err(AccrualError::MalformedResponse(format!(
            "订单号不匹配: 请求 {}, 响应 {}",
            order_number, response.order
        )));
    }

    let outcome = match response.status {
        AccrualStatus::Registered | AccrualStatus::Processing => AccrualOutcome::Pending,
        AccrualStatus::Invalid => AccrualOutcome::Resolved {
            status: OrderStatus::Invalid,
            accrual: 0.0,
        },
        AccrualStatus::Processed => {
            let accrual = response.accrual.unwrap_or(0.0);
            if !accrual.is_finite() || accrual < 0.0 {
                return Err(AccrualError::MalformedResponse(format!(
                    "积分数额非法: {}",
                    accrual
                )));
            }
            AccrualOutcome::Resolved {
                status: OrderStatus::Processed,
                accrual,
            }
        }
    };

    Ok(outcome)
}

/// 解析 Retry-After，支持秒数与 HTTP-date 两种格式
///
/// 已过去的时间点视为立即可重试，结果不超过 [`MAX_RETRY_AFTER`]。
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();

    let delay = if let Ok(secs) = value.parse::<u64>() {
        Duration::from_secs(secs)
    } else {
        let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
        (at - now).to_std().unwrap_or(Duration::ZERO)
    };

    Some(delay.min(MAX_RETRY_AFTER))
}
