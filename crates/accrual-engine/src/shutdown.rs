//! 关闭信号
//!
//! 整条流水线共享一个 `watch::Receiver<bool>`，值变为 `true` 即表示进程正在关闭。

use tokio::sync::watch;
use tracing::{info, warn};

/// 等待关闭信号
///
/// 信号已经置位时立即返回；发送端被丢弃而从未置位时永远挂起。
pub async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// 监听 Ctrl+C 和 SIGTERM 信号
pub async fn signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "安装 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "安装 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到 Ctrl+C，开始优雅关闭");
        }
        _ = terminate => {
            info!("收到 SIGTERM，开始优雅关闭");
        }
    }
}
