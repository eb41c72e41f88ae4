//! Mock 积分计算服务入口

use std::sync::Arc;

use clap::Parser;
use mock_services::server::serve;
use mock_services::services::AccrualServiceState;

/// Mock 积分计算服务
#[derive(Parser, Debug)]
#[command(name = "mock-accrual")]
#[command(version, about = "积分计算服务模拟器")]
struct Cli {
    /// 服务端口
    #[arg(short, long, default_value = "8081")]
    port: u16,

    /// 每分钟允许的订单查询次数，不设置则不限流
    #[arg(long)]
    rate_limit: Option<u32>,

    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 优先使用环境变量 RUST_LOG，否则使用命令行参数指定的级别
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .init();

    let state = match cli.rate_limit {
        Some(limit) => AccrualServiceState::with_rate_limit(limit),
        None => AccrualServiceState::new(),
    };

    serve(cli.port, Arc::new(state)).await
}
