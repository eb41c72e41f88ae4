//! 限流闸门
//!
//! 记录外部服务下一次允许调用的时间点，持久化在存储中，进程重启后限流依然有效。
//! 所有 worker 在每次请求前检查闸门，闸门关闭时按剩余时间休眠而不是轮询。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use loyalty_shared::observability::metrics;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::AccrualError;
use crate::shutdown;
use crate::storage::AccrualStore;

/// 按服务键隔离的限流闸门
pub struct RateLimitGate {
    store: Arc<dyn AccrualStore>,
    service_key: String,
    /// 本进程最近一次写入的闸门值，存储不可读时兜底
    local: RwLock<Option<DateTime<Utc>>>,
}

impl RateLimitGate {
    pub fn new(store: Arc<dyn AccrualStore>, service_key: impl Into<String>) -> Self {
        Self {
            store,
            service_key: service_key.into(),
            local: RwLock::new(None),
        }
    }

    pub fn service_key(&self) -> &str {
        &self.service_key
    }

    /// 当前生效的闸门时间点
    ///
    /// 取存储值与本地值中较晚的一个；存储读取失败时只使用本地值。
    async fn retry_at(&self) -> Option<DateTime<Utc>> {
        let local = *self.local.read();
        let stored = match self.store.get_retry_gate(&self.service_key).await {
            Ok(stored) => stored,
            Err(source) => {
                let err = AccrualError::Gate {
                    service: self.service_key.clone(),
                    source,
                };
                warn!(error = %err, "读取限流闸门失败，使用本地记录");
                None
            }
        };
        stored.max(local)
    }

    /// 距离允许调用还需等待的时间，None 表示现在即可调用
    pub async fn remaining(&self) -> Option<Duration> {
        let retry_at = self.retry_at().await?;
        (retry_at - Utc::now()).to_std().ok().filter(|d| !d.is_zero())
    }

    pub async fn allowed(&self) -> bool {
        self.remaining().await.is_none()
    }

    /// 关闭闸门 `duration`，写入 `now + duration`
    ///
    /// 并发调用时后写者生效。存储写入失败时本地记录仍然生效，错误返回给调用方记录。
    pub async fn block(&self, duration: Duration) -> Result<DateTime<Utc>, AccrualError> {
        let delta = chrono::Duration::from_std(duration)
            .unwrap_or_else(|_| chrono::Duration::seconds(i64::from(u32::MAX)));
        let retry_at = Utc::now() + delta;

        *self.local.write() = Some(retry_at);
        metrics::record_rate_limited(&self.service_key);
        info!(
            service = %self.service_key,
            retry_after_secs = duration.as_secs_f64(),
            retry_at = %retry_at,
            "积分服务限流，暂停调用"
        );

        self.store
            .set_retry_gate(&self.service_key, retry_at)
            .await
            .map_err(|source| AccrualError::Gate {
                service: self.service_key.clone(),
                source,
            })?;

        Ok(retry_at)
    }

    /// 等待闸门打开
    ///
    /// 返回 true 表示可以调用；返回 false 表示等待期间收到关闭信号。
    pub async fn wait_until_allowed(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        loop {
            if *shutdown.borrow() {
                return false;
            }

            let Some(wait) = self.remaining().await else {
                return true;
            };
            debug!(service = %self.service_key, wait_ms = wait.as_millis() as u64, "限流闸门关闭，等待");

            tokio::select! {
                biased;

                _ = shutdown::cancelled(shutdown) => return false,
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}
