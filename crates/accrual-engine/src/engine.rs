//! 积分同步引擎
//!
//! 编排一次完整的轮询周期：分发器 → 工作队列 → worker 池 → 结果通道 → 批量提交。
//! `run` 以固定间隔重复执行周期，任何周期内的失败都只记录日志，下一轮继续。

use std::sync::Arc;
use std::time::{Duration, Instant};

use loyalty_shared::config::AccrualConfig;
use loyalty_shared::observability::metrics;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::client::AccrualClient;
use crate::committer::{CommitReport, Committer};
use crate::dispatcher::Dispatcher;
use crate::error::AccrualError;
use crate::gate::RateLimitGate;
use crate::models::AccrualResult;
use crate::pool::WorkerPool;
use crate::shutdown;
use crate::storage::AccrualStore;

/// 一个轮询周期的汇总
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// 存储返回的待同步订单数
    pub listed: usize,
    /// 实际进入工作队列的订单数
    pub dispatched: usize,
    /// worker 发布的全部结果，顺序不固定
    pub results: Vec<AccrualResult>,
    pub commit: CommitReport,
}

impl CycleReport {
    /// 按结果标签计数，标签见 [`crate::models::AccrualOutcome::label`]
    pub fn count(&self, label: &str) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome.label() == label)
            .count()
    }
}

pub struct AccrualEngine {
    dispatcher: Dispatcher,
    committer: Committer,
    client: Arc<dyn AccrualClient>,
    gate: Arc<RateLimitGate>,
    worker_count: usize,
    queue_capacity: usize,
    poll_interval: Duration,
}

impl AccrualEngine {
    pub fn new(
        store: Arc<dyn AccrualStore>,
        client: Arc<dyn AccrualClient>,
        config: &AccrualConfig,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(store.clone()),
            committer: Committer::new(store.clone()),
            gate: Arc::new(RateLimitGate::new(store, config.service_key.clone())),
            client,
            worker_count: config.worker_count.max(1),
            queue_capacity: config.queue_capacity.max(1),
            poll_interval: config.poll_interval(),
        }
    }

    pub fn gate(&self) -> &RateLimitGate {
        &self.gate
    }

    /// 执行一个完整的轮询周期
    ///
    /// 拉取失败或提交失败时返回错误；收到关闭信号时仍会提交已决出的结果。
    pub async fn run_cycle(
        &self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<CycleReport, AccrualError> {
        let started = Instant::now();

        let (queue_tx, queue_rx) = mpsc::channel(self.queue_capacity);
        let (results_tx, mut results_rx) = mpsc::channel(self.queue_capacity);

        let pool = WorkerPool::spawn(
            self.worker_count,
            queue_rx,
            results_tx,
            self.client.clone(),
            self.gate.clone(),
            shutdown.clone(),
        );

        // 结果必须与分发、worker 同时消费，否则结果通道写满后 worker 无法出队，分发随之阻塞
        let mut dispatch_shutdown = shutdown.clone();
        let collect = async {
            let mut results = Vec::new();
            while let Some(result) = results_rx.recv().await {
                results.push(result);
            }
            results
        };
        let (dispatched, _published, results) = tokio::join!(
            self.dispatcher.dispatch(queue_tx, &mut dispatch_shutdown),
            pool.join(),
            collect
        );
        let dispatched = dispatched?;

        let commit = self.committer.commit(&results).await?;

        let report = CycleReport {
            listed: dispatched.listed,
            dispatched: dispatched.enqueued,
            results,
            commit,
        };
        metrics::record_cycle(started.elapsed().as_secs_f64());
        info!(
            listed = report.listed,
            dispatched = report.dispatched,
            results = report.results.len(),
            committed = report.commit.submitted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "积分同步周期完成"
        );

        Ok(report)
    }

    /// 调度循环，直到收到关闭信号
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval = ?self.poll_interval,
            worker_count = self.worker_count,
            queue_capacity = self.queue_capacity,
            service = %self.gate.service_key(),
            "积分同步引擎已启动"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown::cancelled(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.run_cycle(&shutdown).await {
                error!(code = e.code(), error = %e, "本轮积分同步失败，等待下一轮");
            }
            metrics::set_worker_last_run("accrual_sync");
        }

        info!("积分同步引擎已停止");
    }
}
