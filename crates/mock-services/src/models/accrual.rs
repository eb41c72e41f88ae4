//! 积分计算服务数据模型
//!
//! 与外部积分计算服务的 HTTP 接口保持一致：奖励规则、订单登记请求与订单查询响应。

use serde::{Deserialize, Serialize};

/// 奖励方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardType {
    /// 按商品价格的百分比
    #[serde(rename = "%")]
    Percent,
    /// 固定积分
    #[serde(rename = "pt")]
    Points,
}

/// 奖励规则
///
/// 商品描述包含 `match` 时命中该规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardRule {
    pub r#match: String,
    pub reward: f64,
    pub reward_type: RewardType,
}

impl RewardRule {
    /// 对单个商品计算奖励，未命中返回 None
    pub fn reward_for(&self, item: &GoodsItem) -> Option<f64> {
        if !item.description.contains(&self.r#match) {
            return None;
        }
        Some(match self.reward_type {
            RewardType::Points => self.reward,
            RewardType::Percent => item.price * self.reward / 100.0,
        })
    }
}

/// 订单中的商品
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodsItem {
    pub description: String,
    pub price: f64,
}

/// 订单登记请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRegistration {
    pub order: String,
    pub goods: Vec<GoodsItem>,
}

impl OrderRegistration {
    /// 按全部奖励规则计算订单积分
    pub fn accrual(&self, rules: &[RewardRule]) -> f64 {
        self.goods
            .iter()
            .flat_map(|item| rules.iter().filter_map(move |rule| rule.reward_for(item)))
            .sum()
    }
}

/// 订单计算状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccrualOrderStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

/// `GET /api/orders/{number}` 的响应体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualOrder {
    pub order: String,
    pub status: AccrualOrderStatus,
    /// 仅 PROCESSED 时返回
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<f64>,
}
