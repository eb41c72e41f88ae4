//! 分发器
//!
//! 每个调度周期从存储拉取一次待同步订单，按上传时间顺序送入有界工作队列。
//! 队列满时发送会等待，背压作用于分发速度而不会丢弃订单。

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::error::AccrualError;
use crate::shutdown;
use crate::storage::AccrualStore;

/// 一次分发的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// 存储返回的待同步订单数
    pub listed: usize,
    /// 实际进入队列的订单数
    pub enqueued: usize,
}

pub struct Dispatcher {
    store: Arc<dyn AccrualStore>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn AccrualStore>) -> Self {
        Self { store }
    }

    /// 执行一次分发
    ///
    /// 拉取失败时本轮放弃并返回错误；收到关闭信号后停止入队。
    /// 函数返回时 `queue` 随之丢弃，worker 在队列排空后退出。
    pub async fn dispatch(
        &self,
        queue: mpsc::Sender<String>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<DispatchSummary, AccrualError> {
        let numbers = self
            .store
            .list_pending_for_accrual()
            .await
            .map_err(AccrualError::Listing)?;

        let mut summary = DispatchSummary {
            listed: numbers.len(),
            enqueued: 0,
        };

        for number in numbers {
            if *shutdown.borrow() {
                info!(enqueued = summary.enqueued, "收到关闭信号，停止分发");
                break;
            }

            tokio::select! {
                biased;

                _ = shutdown::cancelled(shutdown) => {
                    info!(enqueued = summary.enqueued, "收到关闭信号，停止分发");
                    break;
                }
                sent = queue.send(number) => {
                    if sent.is_err() {
                        warn!(enqueued = summary.enqueued, "工作队列已关闭，停止分发");
                        break;
                    }
                    summary.enqueued += 1;
                }
            }
        }

        info!(listed = summary.listed, enqueued = summary.enqueued, "待同步订单已分发");
        Ok(summary)
    }
}
