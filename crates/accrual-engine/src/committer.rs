//! 批量提交
//!
//! 收集一个轮询周期内的结果，整理为订单变更后在一个事务中写回存储。
//! 同一时刻只允许一次提交在途。

use std::collections::HashMap;
use std::sync::Arc;

use loyalty_shared::observability::metrics;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::AccrualError;
use crate::models::{AccrualResult, BatchSummary, OrderOutcome};
use crate::storage::AccrualStore;

/// 一次提交的结果
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CommitReport {
    /// 提交给存储的订单变更数，为 0 时没有发起事务
    pub submitted: usize,
    pub summary: BatchSummary,
}

pub struct Committer {
    store: Arc<dyn AccrualStore>,
    in_flight: Mutex<()>,
}

impl Committer {
    pub fn new(store: Arc<dyn AccrualStore>) -> Self {
        Self {
            store,
            in_flight: Mutex::new(()),
        }
    }

    /// 从结果中挑出需要写回的订单变更
    ///
    /// Unregistered、RateLimited、Transient 不产生变更。同一订单出现多次时，
    /// 终态结果优先于 PROCESSING，其余情况保留先到的结果。
    pub fn outcomes(results: &[AccrualResult]) -> Vec<OrderOutcome> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut outcomes: Vec<OrderOutcome> = Vec::new();

        for result in results {
            let Some(outcome) = result.to_order_outcome() else {
                continue;
            };
            match index.get(result.order_number.as_str()) {
                Some(&i) => {
                    if outcome.status.is_terminal() && !outcomes[i].status.is_terminal() {
                        outcomes[i] = outcome;
                    }
                }
                None => {
                    index.insert(result.order_number.as_str(), outcomes.len());
                    outcomes.push(outcome);
                }
            }
        }

        outcomes
    }

    /// 把一批结果作为单个事务提交
    ///
    /// 没有需要写回的变更时不访问存储。事务失败时整批不生效，订单保持待同步。
    pub async fn commit(&self, results: &[AccrualResult]) -> Result<CommitReport, AccrualError> {
        let outcomes = Self::outcomes(results);
        if outcomes.is_empty() {
            debug!(results = results.len(), "没有需要写回的结果，跳过提交");
            return Ok(CommitReport::default());
        }

        let _guard = self.in_flight.lock().await;

        match self.store.apply_accrual_batch(&outcomes).await {
            Ok(summary) => {
                metrics::record_commit("success", summary.applied as u64);
                info!(
                    submitted = outcomes.len(),
                    applied = summary.applied,
                    skipped = summary.skipped,
                    credited = summary.credited,
                    "积分结果批量提交成功"
                );
                Ok(CommitReport {
                    submitted: outcomes.len(),
                    summary,
                })
            }
            Err(source) => {
                metrics::record_commit("failure", 0);
                let err = AccrualError::Commit {
                    orders: outcomes.len(),
                    source,
                };
                error!(error = %err, "积分结果批量提交失败，整批回滚");
                Err(err)
            }
        }
    }
}
