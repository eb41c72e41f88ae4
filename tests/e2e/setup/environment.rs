//! 测试环境管理
//!
//! 每个测试独占一个 Mock 积分服务（随机端口）和一个内存存储，互不干扰。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use accrual_engine::engine::{AccrualEngine, CycleReport};
use accrual_engine::{HttpAccrualClient, InMemoryAccrualStore};
use anyhow::Result;
use loyalty_shared::config::AccrualConfig;
use mock_services::server::spawn_server;
use mock_services::services::{AccrualServiceState, RateLimitConfig};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::super::helpers::ApiClient;

/// 测试环境配置
#[derive(Debug, Clone)]
pub struct TestEnvConfig {
    /// worker 数量
    pub worker_count: usize,
    /// 工作队列容量
    pub queue_capacity: usize,
    /// 单次请求超时
    pub request_timeout: Duration,
    /// Mock 服务限流，None 表示不限流
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for TestEnvConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 8,
            request_timeout: Duration::from_secs(5),
            rate_limit: None,
        }
    }
}

impl TestEnvConfig {
    pub fn with_workers(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Default::default()
        }
    }

    pub fn rate_limited(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }
}

/// 测试环境
pub struct TestEnvironment {
    pub config: TestEnvConfig,
    /// Mock 积分服务状态，可直接注入订单状态或读取请求计数
    pub accrual: Arc<AccrualServiceState>,
    /// Mock 积分服务 API 客户端
    pub api: ApiClient,
    /// 引擎使用的内存存储
    pub store: Arc<InMemoryAccrualStore>,
    pub engine: Arc<AccrualEngine>,
    pub addr: SocketAddr,
    server: JoinHandle<()>,
}

impl TestEnvironment {
    pub async fn setup() -> Result<Self> {
        Self::setup_with_config(TestEnvConfig::default()).await
    }

    pub async fn setup_with_config(config: TestEnvConfig) -> Result<Self> {
        let accrual = Arc::new(match config.rate_limit {
            Some(rate_limit) => AccrualServiceState::with_rate_limit_config(rate_limit),
            None => AccrualServiceState::new(),
        });
        let (addr, server) = spawn_server(accrual.clone()).await?;
        let base_url = format!("http://{}", addr);

        let accrual_config = AccrualConfig {
            address: base_url.clone(),
            worker_count: config.worker_count,
            queue_capacity: config.queue_capacity,
            poll_interval_secs: 1,
            request_timeout_ms: config.request_timeout.as_millis() as u64,
            ..Default::default()
        };

        let store = Arc::new(InMemoryAccrualStore::new());
        let client = HttpAccrualClient::new(&accrual_config)?;
        let engine = Arc::new(AccrualEngine::new(
            store.clone(),
            Arc::new(client),
            &accrual_config,
        ));

        Ok(Self {
            config,
            accrual,
            api: ApiClient::new(&base_url)?,
            store,
            engine,
            addr,
            server,
        })
    }

    /// 用户上传订单（进入 NEW 状态）
    pub fn upload(&self, user_id: &str, number: &str) {
        self.store.insert_order(user_id, number);
    }

    /// 执行一个不会被取消的轮询周期
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let (_tx, rx) = watch::channel(false);
        Ok(self.engine.run_cycle(&rx).await?)
    }

    /// 反复执行周期直到没有待同步订单，返回执行的周期报告
    pub async fn run_until_settled(&self, max_cycles: usize) -> Result<Vec<CycleReport>> {
        let mut reports = Vec::new();
        for _ in 0..max_cycles {
            reports.push(self.run_cycle().await?);
            if self.pending().await?.is_empty() {
                break;
            }
        }
        Ok(reports)
    }

    /// 当前待同步的订单号
    pub async fn pending(&self) -> Result<Vec<String>> {
        use accrual_engine::AccrualStore;
        Ok(self.store.list_pending_for_accrual().await?)
    }
}

impl Drop for TestEnvironment {
    fn drop(&mut self) {
        self.server.abort();
    }
}
