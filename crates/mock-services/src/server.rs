//! HTTP 服务启动
//!
//! `serve` 供命令行使用，监听固定端口直到 Ctrl+C；
//! `spawn_server` 供测试使用，绑定系统分配的本地端口并在后台运行。

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Json, Router, routing::get};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::services::{AccrualServiceState, accrual_routes};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "mock-accrual",
    })
}

/// 组装完整应用
pub fn build_app(state: Arc<AccrualServiceState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(accrual_routes().with_state(state))
        .layer(TraceLayer::new_for_http())
}

/// 在 `127.0.0.1` 的随机端口上后台启动服务，返回实际监听地址
pub async fn spawn_server(state: Arc<AccrualServiceState>) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("绑定端口失败")?;
    let addr = listener.local_addr()?;
    let app = build_app(state);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Mock 积分服务异常退出: {}", e);
        }
    });

    Ok((addr, handle))
}

/// 在指定端口运行服务，直到收到 Ctrl+C
pub async fn serve(port: u16, state: Arc<AccrualServiceState>) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await.context("绑定端口失败")?;

    info!("Mock 积分服务已启动: http://{}", addr);
    info!("可用端点:");
    info!("  GET  /health - 健康检查");
    info!("  POST /api/goods - 登记奖励规则");
    info!("  POST /api/orders - 登记订单");
    info!("  GET  /api/orders/{{number}} - 查询订单积分");

    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务器运行失败")?;

    info!("Mock 积分服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "安装 CTRL+C 信号处理器失败");
        std::future::pending::<()>().await;
    }
    info!("收到关闭信号，正在停止服务...");
}
