//! Mock 积分计算服务
//!
//! 模拟外部积分计算服务的 REST API：
//! - `POST /api/goods` 登记奖励规则
//! - `POST /api/orders` 登记订单，按已有规则立即计算积分
//! - `GET /api/orders/{number}` 查询订单计算结果，可选按分钟限流

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::MockError;
use crate::models::{AccrualOrder, AccrualOrderStatus, OrderRegistration, RewardRule};
use crate::store::MemoryStore;

/// 限流配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// 窗口内允许的最大请求数
    pub max_requests: u32,
    /// 滚动窗口长度
    pub window: Duration,
    /// 429 响应携带的 Retry-After 秒数
    pub retry_after_secs: u64,
}

impl RateLimitConfig {
    /// 每分钟最多 `max_requests` 次，超限后要求等待 60 秒
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
            retry_after_secs: 60,
        }
    }
}

/// 滚动窗口限流器
#[derive(Debug)]
struct RateLimiter {
    config: RateLimitConfig,
    hits: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            hits: Mutex::new(VecDeque::new()),
        }
    }

    /// 记录一次请求，超出配额时返回 false
    fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.lock();
        while hits
            .front()
            .is_some_and(|at| now.duration_since(*at) >= self.config.window)
        {
            hits.pop_front();
        }

        if hits.len() >= self.config.max_requests as usize {
            return false;
        }
        hits.push_back(now);
        true
    }
}

/// 积分服务状态
///
/// 持有奖励规则与订单的内存存储，供所有路由处理器共享
#[derive(Debug, Default)]
pub struct AccrualServiceState {
    pub rewards: MemoryStore<RewardRule>,
    pub orders: MemoryStore<AccrualOrder>,
    limiter: Option<RateLimiter>,
    requests: AtomicU64,
}

impl AccrualServiceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每分钟最多 `max_requests` 次订单查询
    pub fn with_rate_limit(max_requests: u32) -> Self {
        Self::with_rate_limit_config(RateLimitConfig::per_minute(max_requests))
    }

    pub fn with_rate_limit_config(config: RateLimitConfig) -> Self {
        Self {
            limiter: Some(RateLimiter::new(config)),
            ..Self::default()
        }
    }

    /// 登记奖励规则，`match` 重复时返回冲突
    pub fn register_reward(&self, rule: RewardRule) -> Result<(), MockError> {
        if rule.r#match.is_empty() || !rule.reward.is_finite() || rule.reward < 0.0 {
            return Err(MockError::InvalidRequest(format!(
                "非法的奖励规则: match={:?}, reward={}",
                rule.r#match, rule.reward
            )));
        }

        let key = rule.r#match.clone();
        if !self.rewards.insert_if_absent(&key, rule) {
            return Err(MockError::DuplicateReward(key));
        }
        info!(rule = %key, "登记奖励规则");
        Ok(())
    }

    /// 登记订单并立即计算积分
    pub fn register_order(&self, registration: OrderRegistration) -> Result<AccrualOrder, MockError> {
        if registration.order.is_empty() || !registration.order.chars().all(|c| c.is_ascii_digit()) {
            return Err(MockError::InvalidRequest(format!(
                "订单号格式错误: {:?}",
                registration.order
            )));
        }

        let accrual = registration.accrual(&self.rewards.list());
        let order = AccrualOrder {
            order: registration.order.clone(),
            status: AccrualOrderStatus::Processed,
            accrual: Some(accrual),
        };

        if !self.orders.insert_if_absent(&registration.order, order.clone()) {
            return Err(MockError::DuplicateOrder(registration.order));
        }
        info!(order = %order.order, accrual, "登记订单");
        Ok(order)
    }

    /// 强制设置订单状态，订单不存在时创建
    ///
    /// 非 PROCESSED 状态不返回积分。
    pub fn set_status(&self, number: &str, status: AccrualOrderStatus, accrual: Option<f64>) {
        let accrual = match status {
            AccrualOrderStatus::Processed => Some(accrual.unwrap_or(0.0)),
            _ => None,
        };
        self.orders.insert(
            number,
            AccrualOrder {
                order: number.to_string(),
                status,
                accrual,
            },
        );
    }

    /// 收到的订单查询次数，包含被限流的请求
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }
}

/// 构建积分服务路由
pub fn accrual_routes() -> Router<Arc<AccrualServiceState>> {
    Router::new()
        .route("/api/goods", post(register_reward))
        .route("/api/orders", post(register_order))
        .route("/api/orders/{number}", get(get_order))
}

/// 登记奖励规则
///
/// POST /api/goods
async fn register_reward(
    State(state): State<Arc<AccrualServiceState>>,
    payload: Result<Json<RewardRule>, JsonRejection>,
) -> Result<StatusCode, MockError> {
    let Json(rule) = payload.map_err(|e| MockError::InvalidRequest(e.body_text()))?;
    state.register_reward(rule)?;
    Ok(StatusCode::OK)
}

/// 登记订单
///
/// POST /api/orders
async fn register_order(
    State(state): State<Arc<AccrualServiceState>>,
    payload: Result<Json<OrderRegistration>, JsonRejection>,
) -> Result<StatusCode, MockError> {
    let Json(registration) = payload.map_err(|e| MockError::InvalidRequest(e.body_text()))?;
    state.register_order(registration)?;
    Ok(StatusCode::ACCEPTED)
}

/// 查询订单计算结果
///
/// GET /api/orders/{number}
async fn get_order(
    State(state): State<Arc<AccrualServiceState>>,
    Path(number): Path<String>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);

    if let Some(limiter) = &state.limiter {
        if !limiter.try_acquire() {
            let config = limiter.config;
            warn!(order = %number, max_requests = config.max_requests, "订单查询被限流");
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                format!(
                    "No more than {} requests per minute allowed",
                    config.max_requests
                ),
            )
                .into_response();
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(config.retry_after_secs),
            );
            return response;
        }
    }

    match state.orders.get(&number) {
        Some(order) => {
            debug!(order = %number, status = ?order.status, "查询订单");
            Json(order).into_response()
        }
        None => {
            debug!(order = %number, "订单未登记");
            StatusCode::NO_CONTENT.into_response()
        }
    }
}
