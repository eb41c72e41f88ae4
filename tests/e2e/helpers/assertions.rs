//! 自定义断言宏
//!
//! 提供针对积分同步结果的专用断言功能。

/// 断言订单状态
#[macro_export]
macro_rules! assert_order_status {
    ($store:expr, $number:expr, $status:expr) => {
        let order = $store
            .order($number)
            .unwrap_or_else(|| panic!("订单 {} 不存在", $number));
        assert_eq!(
            order.status, $status,
            "订单 {} 状态应为 {}，实际为 {}",
            $number, $status, order.status
        );
    };
}

/// 断言用户可用积分（误差 0.001）
#[macro_export]
macro_rules! assert_balance {
    ($store:expr, $user_id:expr, $expected:expr) => {
        let current = $store.balance($user_id).current;
        assert!(
            (current - $expected).abs() < 0.001,
            "用户 {} 的积分应为 {}，实际为 {}",
            $user_id,
            $expected,
            current
        );
    };
}
