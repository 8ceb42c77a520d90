// ==========================================
// 集装箱分配系统 - 需求提取引擎
// ==========================================
// 职责: 订单明细 → 按产品键汇总的容量需求
// 输入: 订单明细 + 排除集合（不占箱位的附加项）
// 输出: ProductKey → 需求数量；无有效需求的订单标记为 no_items
// ==========================================

use crate::config::AllocationConfig;
use crate::domain::order::{Order, OrderLineItem, OrderWithItems};
use crate::domain::product::ProductKey;
use crate::domain::allocation::SkippedOrder;
use crate::domain::types::SkipReason;
use std::collections::{BTreeMap, HashSet};

/// 单个订单的容量需求（BTreeMap 保证遍历次序确定）
pub type Requirements = BTreeMap<ProductKey, i64>;

/// 已提取需求、可参与分配的订单
#[derive(Debug, Clone)]
pub struct OrderDemand {
    pub order: Order,
    pub requirements: Requirements,
}

// ==========================================
// RequirementExtractor - 需求提取器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct RequirementExtractor {
    excluded: HashSet<ProductKey>,
}

impl RequirementExtractor {
    pub fn new<I>(excluded: I) -> Self
    where
        I: IntoIterator<Item = ProductKey>,
    {
        Self {
            excluded: excluded.into_iter().filter(|k| !k.is_empty()).collect(),
        }
    }

    pub fn from_config(config: &AllocationConfig) -> Self {
        Self::new(config.excluded_product_keys.iter().cloned())
    }

    /// 产品是否不占用集装箱空间
    pub fn is_excluded(&self, key: &ProductKey) -> bool {
        self.excluded.contains(key)
    }

    /// 汇总明细需求
    ///
    /// 规则：
    /// 1) 同一产品键的数量累加
    /// 2) 排除集合中的产品不计入
    /// 3) 数量 <= 0 或产品键为空的明细不计入
    pub fn extract(&self, items: &[OrderLineItem]) -> Requirements {
        let mut requirements = Requirements::new();
        for item in items {
            if item.quantity <= 0 || item.product_key.is_empty() || self.is_excluded(&item.product_key) {
                continue;
            }
            *requirements.entry(item.product_key.clone()).or_insert(0) += item.quantity;
        }
        requirements
    }

    /// 提取订单需求；无有效需求时返回 no_items 跳过记录
    pub fn demand_for(&self, order: &OrderWithItems) -> Result<OrderDemand, SkippedOrder> {
        let requirements = self.extract(&order.line_items);
        if requirements.is_empty() {
            return Err(SkippedOrder {
                order_id: order.order.order_id.clone(),
                external_number: order.order.external_number.clone(),
                reason: SkipReason::NoItems,
            });
        }
        Ok(OrderDemand {
            order: order.order.clone(),
            requirements,
        })
    }

    /// 批量提取，保持输入次序
    pub fn partition(&self, orders: &[OrderWithItems]) -> (Vec<OrderDemand>, Vec<SkippedOrder>) {
        let mut demands = Vec::with_capacity(orders.len());
        let mut skipped = Vec::new();
        for order in orders {
            match self.demand_for(order) {
                Ok(d) => demands.push(d),
                Err(s) => skipped.push(s),
            }
        }
        (demands, skipped)
    }
}
