//! 结算一致性测试套件
//!
//! 多用户混合批次、跨周期的状态推进与重复结果的幂等性。

use crate::setup::TestEnvironment;
use accrual_engine::OrderStatus;
use mock_services::models::{AccrualOrderStatus, RewardType};

#[cfg(test)]
mod mixed_batch_tests {
    use super::*;

    /// 多个用户的订单在同一批次中结算，各自只获得自己订单的积分
    #[tokio::test]
    async fn test_multiple_customers_in_one_batch() {
        let env = TestEnvironment::setup().await.unwrap();
        env.api
            .register_reward("Bork", 10.0, RewardType::Percent)
            .await
            .unwrap();
        env.api
            .register_reward("Asus", 500.0, RewardType::Points)
            .await
            .unwrap();

        env.api
            .register_order("12345678903", &[("Чайник Bork", 7000.0)])
            .await
            .unwrap();
        env.api
            .register_order("9278923470", &[("Asus Zenbook", 1.0), ("Bork kettle", 100.0)])
            .await
            .unwrap();
        env.api
            .register_order("346436439", &[("Nothing special", 99.0)])
            .await
            .unwrap();
        env.accrual
            .set_status("79927398713", AccrualOrderStatus::Invalid, None);

        env.upload("alice", "12345678903");
        env.upload("bob", "9278923470");
        env.upload("bob", "346436439");
        env.upload("carol", "79927398713");
        env.upload("dave", "4561261212345467");

        let report = env.run_cycle().await.unwrap();

        assert_eq!(report.results.len(), 5);
        assert_eq!(report.commit.submitted, 4);
        assert_eq!(env.store.commit_count(), 1);
        crate::assert_balance!(env.store, "alice", 700.0);
        crate::assert_balance!(env.store, "bob", 510.0);
        crate::assert_balance!(env.store, "carol", 0.0);
        crate::assert_balance!(env.store, "dave", 0.0);
        crate::assert_order_status!(env.store, "79927398713", OrderStatus::Invalid);
        crate::assert_order_status!(env.store, "4561261212345467", OrderStatus::New);
        assert_eq!(env.pending().await.unwrap(), vec!["4561261212345467"]);
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    /// 已受理未计算的订单推进到 PROCESSING，下一轮结算后入账
    #[tokio::test]
    async fn test_pending_then_processed() {
        let env = TestEnvironment::setup().await.unwrap();
        env.accrual
            .set_status("2377225624", AccrualOrderStatus::Registered, None);
        env.upload("user-1", "2377225624");

        let report = env.run_cycle().await.unwrap();
        assert_eq!(report.count("pending"), 1);
        crate::assert_order_status!(env.store, "2377225624", OrderStatus::Processing);
        crate::assert_balance!(env.store, "user-1", 0.0);

        env.accrual
            .set_status("2377225624", AccrualOrderStatus::Processing, None);
        env.run_cycle().await.unwrap();
        crate::assert_order_status!(env.store, "2377225624", OrderStatus::Processing);

        env.accrual
            .set_status("2377225624", AccrualOrderStatus::Processed, Some(729.98));
        env.run_cycle().await.unwrap();
        crate::assert_order_status!(env.store, "2377225624", OrderStatus::Processed);
        crate::assert_balance!(env.store, "user-1", 729.98);
        assert!(env.pending().await.unwrap().is_empty());
    }

    /// 终态订单不再被查询，积分不会重复入账
    #[tokio::test]
    async fn test_terminal_orders_settle_once() {
        let env = TestEnvironment::setup().await.unwrap();
        env.api
            .register_reward("Asus", 5000.0, RewardType::Points)
            .await
            .unwrap();
        env.api
            .register_order("707261873236", &[("Laptop Asus", 100500.1)])
            .await
            .unwrap();
        env.upload("user-1", "707261873236");

        let reports = env.run_until_settled(5).await.unwrap();
        assert_eq!(reports.len(), 1);

        let report = env.run_cycle().await.unwrap();
        assert_eq!(report.listed, 0);
        assert_eq!(env.accrual.request_count(), 1);
        crate::assert_balance!(env.store, "user-1", 5000.0);
    }

    /// 提交失败后订单保持待同步，下一轮完整结算
    #[tokio::test]
    async fn test_commit_failure_then_recovery() {
        let env = TestEnvironment::setup().await.unwrap();
        env.api
            .register_reward("Asus", 5000.0, RewardType::Points)
            .await
            .unwrap();
        env.api
            .register_order("707261873236", &[("Laptop Asus", 1.0)])
            .await
            .unwrap();
        env.api
            .register_order("155047814506", &[("Asus mouse", 1.0)])
            .await
            .unwrap();
        env.upload("user-1", "707261873236");
        env.upload("user-2", "155047814506");
        env.store.fail_next_commit_at(1);

        let err = env.run_cycle().await.unwrap_err();
        assert!(err.to_string().contains("批量提交失败"));
        crate::assert_balance!(env.store, "user-1", 0.0);
        crate::assert_balance!(env.store, "user-2", 0.0);
        assert_eq!(env.pending().await.unwrap().len(), 2);

        env.run_cycle().await.unwrap();
        crate::assert_balance!(env.store, "user-1", 5000.0);
        crate::assert_balance!(env.store, "user-2", 5000.0);
    }
}
