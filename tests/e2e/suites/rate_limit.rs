//! 限流与关闭测试套件
//!
//! 验证 429 关闭闸门后所有 worker 暂停、闸门持久化到存储，以及关闭信号下不丢结果。

use crate::setup::{TestEnvConfig, TestEnvironment};
use accrual_engine::{AccrualStore, OrderStatus};
use chrono::Utc;
use mock_services::models::RewardType;
use mock_services::services::RateLimitConfig;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::sync::watch;

async fn seed_orders(env: &TestEnvironment, count: usize) -> Vec<String> {
    env.api
        .register_reward("Asus", 100.0, RewardType::Points)
        .await
        .unwrap();

    let mut numbers = Vec::new();
    for i in 0..count {
        let number = format!("5000000000{:02}", i);
        env.api
            .register_order(&number, &[("Asus keyboard", 10.0)])
            .await
            .unwrap();
        env.upload("user-1", &number);
        numbers.push(number);
    }
    numbers
}

#[cfg(test)]
mod gate_tests {
    use super::*;

    /// 被限流后等待 Retry-After 再继续，最终全部订单结算
    #[tokio::test]
    async fn test_rate_limited_orders_settle_after_retry_after() {
        let config = TestEnvConfig::with_workers(2).rate_limited(RateLimitConfig {
            max_requests: 2,
            window: Duration::from_secs(1),
            retry_after_secs: 1,
        });
        let env = TestEnvironment::setup_with_config(config).await.unwrap();
        seed_orders(&env, 6).await;

        let started = Instant::now();
        let reports = env.run_until_settled(10).await.unwrap();

        let rate_limited: usize = reports.iter().map(|r| r.count("rate_limited")).sum();
        assert!(rate_limited >= 1, "应至少观察到一次限流");
        assert!(started.elapsed() >= Duration::from_secs(1));

        assert!(env.pending().await.unwrap().is_empty());
        crate::assert_balance!(env.store, "user-1", 600.0);

        // 闸门写入了存储，供重启后的进程继续遵守
        let retry_at = env
            .store
            .get_retry_gate("accrual")
            .await
            .unwrap()
            .expect("限流后应写入闸门");
        assert!(retry_at <= Utc::now());
    }

    /// 闸门关闭期间不发起任何新请求
    #[tokio::test]
    async fn test_no_requests_while_gate_closed() {
        let config = TestEnvConfig::with_workers(1).rate_limited(RateLimitConfig {
            max_requests: 1,
            window: Duration::from_secs(60),
            retry_after_secs: 1,
        });
        let env = TestEnvironment::setup_with_config(config).await.unwrap();
        seed_orders(&env, 3).await;

        let engine = env.engine.clone();
        let (tx, rx) = watch::channel(false);
        let cycle = tokio::spawn(async move { engine.run_cycle(&rx).await });

        // 第 1 个请求成功，第 2 个被限流，之后在 1 秒内不应再有请求
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(env.accrual.request_count(), 2);
        assert!(!env.engine.gate().allowed().await);

        // 闸门打开后第 3 个请求发出（仍被 Mock 的分钟窗口限流）
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(env.accrual.request_count() >= 3);

        tx.send(true).unwrap();
        let report = tokio::time::timeout(Duration::from_secs(5), cycle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(report.count("processed"), 1);
        assert_eq!(report.results.len(), 3);
    }
}

#[cfg(test)]
mod shutdown_tests {
    use super::*;

    /// 关闭信号打断限流等待，剩余订单以取消结果发布，已决出的结果照常提交
    #[tokio::test]
    async fn test_shutdown_during_rate_limit_loses_nothing() {
        let config = TestEnvConfig::with_workers(1).rate_limited(RateLimitConfig::per_minute(1));
        let env = TestEnvironment::setup_with_config(config).await.unwrap();
        let numbers = seed_orders(&env, 5).await;

        let engine = env.engine.clone();
        let (tx, rx) = watch::channel(false);
        let started = Instant::now();
        let cycle = tokio::spawn(async move { engine.run_cycle(&rx).await });

        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send(true).unwrap();

        let report = tokio::time::timeout(Duration::from_secs(5), cycle)
            .await
            .expect("关闭信号应打断 60 秒的限流等待")
            .unwrap()
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));

        assert_eq!(report.dispatched, 5);
        assert_eq!(report.results.len(), 5);
        assert_eq!(report.count("processed"), 1);
        assert_eq!(report.count("rate_limited"), 1);
        assert_eq!(report.count("transient"), 3);
        let observed: HashSet<_> = report
            .results
            .iter()
            .map(|r| r.order_number.clone())
            .collect();
        assert_eq!(observed, numbers.iter().cloned().collect());

        assert_eq!(report.commit.submitted, 1);
        crate::assert_order_status!(env.store, numbers[0].as_str(), OrderStatus::Processed);
        crate::assert_balance!(env.store, "user-1", 100.0);
        assert_eq!(env.pending().await.unwrap().len(), 4);
    }

    /// 调度循环收到关闭信号后退出
    #[tokio::test]
    async fn test_run_loop_stops() {
        let env = TestEnvironment::setup().await.unwrap();
        seed_orders(&env, 2).await;

        let engine = env.engine.clone();
        let (tx, rx) = watch::channel(false);
        let runner = tokio::spawn(async move { engine.run(rx).await });

        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .expect("引擎应在关闭信号后退出")
            .unwrap();

        crate::assert_balance!(env.store, "user-1", 200.0);
    }
}
