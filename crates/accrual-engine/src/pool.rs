//! Worker 池
//!
//! 固定数量的 worker 共享一个有界工作队列：出队一个订单号后先等待限流闸门打开，
//! 再调用积分服务，把结果发布到结果通道。
//! 队列关闭且排空后 worker 退出；收到关闭信号时，进行中的请求被中断，
//! 队列里剩余的订单全部以“已取消”的 Transient 结果发布，不会静默丢失。

use std::sync::Arc;
use std::time::Instant;

use loyalty_shared::observability::metrics;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::client::AccrualClient;
use crate::error::AccrualError;
use crate::gate::RateLimitGate;
use crate::models::{AccrualOutcome, AccrualResult};
use crate::shutdown;

type SharedQueue = Arc<Mutex<mpsc::Receiver<String>>>;

/// 单个 worker 的共享依赖
#[derive(Clone)]
struct WorkerContext {
    queue: SharedQueue,
    results: mpsc::Sender<AccrualResult>,
    client: Arc<dyn AccrualClient>,
    gate: Arc<RateLimitGate>,
}

/// worker 退出原因
enum Exit {
    /// 队列已关闭且排空
    Drained,
    /// 收到关闭信号
    Shutdown,
    /// 结果通道已关闭，无法继续发布
    ResultsClosed,
}

pub struct WorkerPool {
    workers: JoinSet<usize>,
}

impl WorkerPool {
    /// 启动 `size` 个 worker
    pub fn spawn(
        size: usize,
        queue: mpsc::Receiver<String>,
        results: mpsc::Sender<AccrualResult>,
        client: Arc<dyn AccrualClient>,
        gate: Arc<RateLimitGate>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let ctx = WorkerContext {
            queue: Arc::new(Mutex::new(queue)),
            results,
            client,
            gate,
        };

        let mut workers = JoinSet::new();
        for id in 0..size.max(1) {
            let ctx = ctx.clone();
            let shutdown = shutdown.clone();
            workers.spawn(run_worker(id, ctx, shutdown));
        }

        Self { workers }
    }

    /// 等待所有 worker 退出，返回发布的结果总数
    pub async fn join(mut self) -> usize {
        let mut published = 0;
        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Ok(count) => published += count,
                Err(e) => error!(error = %e, "worker 异常退出"),
            }
        }
        published
    }
}

async fn run_worker(id: usize, ctx: WorkerContext, mut shutdown: watch::Receiver<bool>) -> usize {
    let mut published = 0;

    let exit = loop {
        // 先出队再检查闸门，队列已排空时不必等待限流结束
        let next = ctx.queue.lock().await.recv().await;
        let Some(order_number) = next else {
            break Exit::Drained;
        };

        let result = if ctx.gate.wait_until_allowed(&mut shutdown).await {
            call(&ctx, &order_number, &mut shutdown).await
        } else {
            cancelled(order_number)
        };

        let stop = *shutdown.borrow();
        if ctx.results.send(result).await.is_err() {
            break Exit::ResultsClosed;
        }
        published += 1;

        if stop {
            break Exit::Shutdown;
        }
    };

    if matches!(exit, Exit::Shutdown) {
        published += drain_cancelled(id, &ctx).await;
    }
    if matches!(exit, Exit::ResultsClosed) {
        warn!(worker = id, "结果通道已关闭，worker 提前退出");
    }

    debug!(worker = id, published, "worker 已退出");
    published
}

/// 调用积分服务；关闭信号会中断进行中的请求
async fn call(
    ctx: &WorkerContext,
    order_number: &str,
    shutdown: &mut watch::Receiver<bool>,
) -> AccrualResult {
    let started = Instant::now();

    let result = tokio::select! {
        biased;

        _ = shutdown::cancelled(shutdown) => cancelled(order_number.to_string()),
        result = ctx.client.fetch(order_number) => result,
    };
    metrics::record_accrual_request(result.outcome.label(), started.elapsed().as_secs_f64());

    match &result.outcome {
        AccrualOutcome::RateLimited { retry_after } => {
            if let Err(e) = ctx.gate.block(*retry_after).await {
                warn!(error = %e, "限流闸门写入存储失败，本进程内仍然生效");
            }
        }
        AccrualOutcome::Transient { reason } => {
            warn!(order = %order_number, http_status = ?result.http_status, reason = %reason, "积分服务查询失败，下一轮重试");
        }
        _ => {
            debug!(order = %order_number, outcome = result.outcome.label(), "积分服务查询完成");
        }
    }

    result
}

/// 把队列中剩余的订单全部发布为已取消
async fn drain_cancelled(id: usize, ctx: &WorkerContext) -> usize {
    let mut drained = 0;
    loop {
        let next = ctx.queue.lock().await.recv().await;
        let Some(order_number) = next else {
            break;
        };
        if ctx.results.send(cancelled(order_number)).await.is_err() {
            break;
        }
        drained += 1;
    }
    if drained > 0 {
        info!(worker = id, drained, "关闭时队列中剩余订单已标记为取消");
    }
    drained
}

fn cancelled(order_number: String) -> AccrualResult {
    AccrualResult::new(
        order_number,
        None,
        AccrualOutcome::Transient {
            reason: AccrualError::Cancelled.to_string(),
        },
    )
}
