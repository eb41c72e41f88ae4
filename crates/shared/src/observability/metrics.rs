//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Metrics 资源守卫
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

/// 注册积分同步相关指标的描述
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "accrual_requests_total",
        "Total number of accrual service lookups by outcome"
    );
    metrics::describe_histogram!(
        "accrual_request_duration_seconds",
        "Accrual service lookup duration in seconds"
    );
    metrics::describe_counter!(
        "accrual_rate_limited_total",
        "Total number of 429 responses observed from the accrual service"
    );
    metrics::describe_counter!("accrual_commits_total", "Total number of batch commits");
    metrics::describe_counter!(
        "accrual_committed_orders_total",
        "Total number of order outcomes written by batch commits"
    );
    metrics::describe_histogram!(
        "accrual_cycle_duration_seconds",
        "Full poll cycle duration in seconds"
    );
    metrics::describe_gauge!(
        "worker_last_run_timestamp",
        "Unix timestamp of the last completed worker loop"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 指标记录函数
// ============================================================================

/// 记录一次对积分计算服务的查询
#[inline]
pub fn record_accrual_request(outcome: &str, duration_secs: f64) {
    metrics::counter!("accrual_requests_total", "outcome" => outcome.to_string()).increment(1);
    metrics::histogram!("accrual_request_duration_seconds").record(duration_secs);
}

/// 记录一次限流响应
#[inline]
pub fn record_rate_limited(service_key: &str) {
    metrics::counter!("accrual_rate_limited_total", "service" => service_key.to_string())
        .increment(1);
}

/// 记录一次批量提交
#[inline]
pub fn record_commit(status: &str, orders: u64) {
    metrics::counter!("accrual_commits_total", "status" => status.to_string()).increment(1);
    if status == "success" {
        metrics::counter!("accrual_committed_orders_total").increment(orders);
    }
}

/// 记录一个完整轮询周期的耗时
#[inline]
pub fn record_cycle(duration_secs: f64) {
    metrics::histogram!("accrual_cycle_duration_seconds").record(duration_secs);
}

/// 记录 Worker 最近一次运行时间
#[inline]
pub fn set_worker_last_run(worker: &str) {
    metrics::gauge!("worker_last_run_timestamp", "worker" => worker.to_string())
        .set(chrono::Utc::now().timestamp() as f64);
}
