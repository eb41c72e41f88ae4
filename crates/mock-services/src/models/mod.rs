//! 模拟数据模型

pub mod accrual;

pub use accrual::{
    AccrualOrder, AccrualOrderStatus, GoodsItem, OrderRegistration, RewardRule, RewardType,
};
