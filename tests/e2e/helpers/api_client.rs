//! Mock 积分服务 API 客户端
//!
//! 通过 HTTP 登记奖励规则和订单，与真实积分服务的接入方式一致。

use anyhow::{Result, bail};
use mock_services::models::{GoodsItem, OrderRegistration, RewardRule, RewardType};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

/// API 客户端
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// 登记奖励规则
    pub async fn register_reward(
        &self,
        pattern: &str,
        reward: f64,
        reward_type: RewardType,
    ) -> Result<()> {
        let rule = RewardRule {
            r#match: pattern.to_string(),
            reward,
            reward_type,
        };
        self.post("/api/goods", &rule, StatusCode::OK).await
    }

    /// 登记订单，商品以 (描述, 价格) 给出
    pub async fn register_order(&self, order: &str, goods: &[(&str, f64)]) -> Result<()> {
        let registration = OrderRegistration {
            order: order.to_string(),
            goods: goods
                .iter()
                .map(|(description, price)| GoodsItem {
                    description: description.to_string(),
                    price: *price,
                })
                .collect(),
        };
        self.post("/api/orders", &registration, StatusCode::ACCEPTED)
            .await
    }

    async fn post<R: Serialize>(&self, path: &str, body: &R, expected: StatusCode) -> Result<()> {
        let resp = self.client.post(self.url(path)).json(body).send().await?;
        if resp.status() != expected {
            bail!("POST {} 返回 {}，期望 {}", path, resp.status(), expected);
        }
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
