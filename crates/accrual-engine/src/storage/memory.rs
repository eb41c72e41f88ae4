//! 内存存储实现
//!
//! 与 PostgreSQL 实现遵循同一契约：批量写回先在副本上执行，全部成功后整体替换，
//! 失败时原状态不受任何影响。支持故障注入，用于验证引擎在存储失败时的行为。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loyalty_shared::error::{LoyaltyError, Result};
use parking_lot::{Mutex, RwLock};

use super::AccrualStore;
use crate::models::{Balance, BatchSummary, Order, OrderOutcome, OrderStatus};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    orders: HashMap<String, Order>,
    balances: HashMap<String, Balance>,
    gates: HashMap<String, DateTime<Utc>>,
}

/// 内存版积分同步存储
#[derive(Debug, Default)]
pub struct InMemoryAccrualStore {
    state: RwLock<MemoryState>,
    fail_next_listing: AtomicBool,
    /// 下一次批量提交在处理到第 N 条时失败
    fail_commit_at: Mutex<Option<usize>>,
    commit_count: AtomicUsize,
}

impl InMemoryAccrualStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以当前时间作为上传时间写入一笔 NEW 订单
    pub fn insert_order(&self, user_id: &str, number: &str) {
        self.insert_order_at(user_id, number, Utc::now());
    }

    pub fn insert_order_at(&self, user_id: &str, number: &str, uploaded_at: DateTime<Utc>) {
        let mut state = self.state.write();
        state.balances.entry(user_id.to_string()).or_default();
        state.orders.insert(
            number.to_string(),
            Order {
                number: number.to_string(),
                user_id: user_id.to_string(),
                status: OrderStatus::New,
                accrual: 0.0,
                uploaded_at,
            },
        );
    }

    pub fn order(&self, number: &str) -> Option<Order> {
        self.state.read().orders.get(number).cloned()
    }

    pub fn balance(&self, user_id: &str) -> Balance {
        self.state
            .read()
            .balances
            .get(user_id)
            .copied()
            .unwrap_or_default()
    }

    /// 按订单号查询所属用户
    pub fn order_owner(&self, number: &str) -> Result<String> {
        self.state
            .read()
            .orders
            .get(number)
            .map(|o| o.user_id.clone())
            .ok_or_else(|| LoyaltyError::NotFound {
                entity: "Order".to_string(),
                id: number.to_string(),
            })
    }

    /// 成功提交的批次数
    pub fn commit_count(&self) -> usize {
        self.commit_count.load(Ordering::SeqCst)
    }

    /// 让下一次拉取失败
    pub fn fail_next_listing(&self) {
        self.fail_next_listing.store(true, Ordering::SeqCst);
    }

    /// 让下一次批量提交失败
    pub fn fail_next_commit(&self) {
        self.fail_next_commit_at(0);
    }

    /// 让下一次批量提交在处理到第 `index` 条（从 0 开始）时失败，
    /// 此前的条目已在副本上生效，用于验证整批回滚
    pub fn fail_next_commit_at(&self, index: usize) {
        *self.fail_commit_at.lock() = Some(index);
    }
}

#[async_trait]
impl AccrualStore for InMemoryAccrualStore {
    async fn list_pending_for_accrual(&self) -> Result<Vec<String>> {
        if self.fail_next_listing.swap(false, Ordering::SeqCst) {
            return Err(LoyaltyError::Internal("模拟拉取失败".to_string()));
        }

        let state = self.state.read();
        let mut pending: Vec<&Order> = state
            .orders
            .values()
            .filter(|o| !o.status.is_terminal())
            .collect();
        pending.sort_by(|a, b| {
            a.uploaded_at
                .cmp(&b.uploaded_at)
                .then_with(|| a.number.cmp(&b.number))
        });
        Ok(pending.into_iter().map(|o| o.number.clone()).collect())
    }

    async fn apply_accrual_batch(&self, outcomes: &[OrderOutcome]) -> Result<BatchSummary> {
        let fail_at = self.fail_commit_at.lock().take();

        let mut state = self.state.write();
        let mut staged = state.clone();
        let mut summary = BatchSummary::default();

        for (index, outcome) in outcomes.iter().enumerate() {
            if fail_at == Some(index) {
                return Err(LoyaltyError::Internal(format!(
                    "模拟提交失败: order={}",
                    outcome.order_number
                )));
            }

            let Some(order) = staged.orders.get_mut(&outcome.order_number) else {
                summary.skipped += 1;
                continue;
            };
            if !order.status.can_transition_to(outcome.status) {
                summary.skipped += 1;
                continue;
            }

            order.status = outcome.status;
            order.accrual = outcome.accrual;

            if outcome.status == OrderStatus::Processed {
                let user_id = order.user_id.clone();
                staged.balances.entry(user_id).or_default().current += outcome.accrual;
                summary.credited += outcome.accrual;
            }
            summary.applied += 1;
        }

        *state = staged;
        self.commit_count.fetch_add(1, Ordering::SeqCst);
        Ok(summary)
    }

    async fn get_retry_gate(&self, service_key: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.state.read().gates.get(service_key).copied())
    }

    async fn set_retry_gate(&self, service_key: &str, retry_at: DateTime<Utc>) -> Result<()> {
        self.state
            .write()
            .gates
            .insert(service_key.to_string(), retry_at);
        Ok(())
    }
}
