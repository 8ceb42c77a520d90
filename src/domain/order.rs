// ==========================================
// 集装箱分配系统 - 订单领域模型
// ==========================================
// 红线: created_at 决定 FIFO 优先级，一经写入不可修改
// 红线: container_id / delivery_eta 只由分配核心写入
// ==========================================

use crate::domain::product::ProductKey;
use crate::domain::types::OrderState;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ==========================================
// Order - 订单
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    // ===== 主键 =====
    pub order_id: String,        // 订单ID
    pub external_number: String, // 外部订单号（如店铺单号）

    // ===== FIFO 优先级 =====
    pub created_at: NaiveDateTime, // 下单时间
    pub arrival_seq: i64,          // 入库序号（同一时间戳的稳定次序）

    // ===== 分配结果 =====
    pub container_id: Option<String>,    // 所在集装箱（至多一个）
    pub delivery_eta: Option<NaiveDate>, // 交付预计日期（随集装箱 ETA）

    pub state: OrderState,
}

impl Order {
    pub fn is_allocated(&self) -> bool {
        self.container_id.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.state == OrderState::Active
    }

    /// FIFO 次序：created_at 升序，同时间按入库序号，最后按订单ID
    pub fn fifo_order(&self, other: &Order) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.arrival_seq.cmp(&other.arrival_seq))
            .then_with(|| self.order_id.cmp(&other.order_id))
    }

    /// 是否在 FIFO 次序上晚于 other
    pub fn is_later_than(&self, other: &Order) -> bool {
        self.fifo_order(other) == Ordering::Greater
    }
}

// ==========================================
// OrderLineItem - 订单明细
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub line_item_id: i64,
    pub order_id: String,
    pub product_name: String,    // 原始产品名称
    pub product_key: ProductKey, // 规范化产品键
    pub quantity: i64,
}

impl OrderLineItem {
    pub fn new(line_item_id: i64, order_id: &str, product_name: &str, quantity: i64) -> Self {
        Self {
            line_item_id,
            order_id: order_id.to_string(),
            product_name: product_name.to_string(),
            product_key: ProductKey::new(product_name),
            quantity,
        }
    }
}

/// 订单及其明细
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderWithItems {
    pub order: Order,
    pub line_items: Vec<OrderLineItem>,
}

/// 按 FIFO 次序排序
pub fn sort_fifo(orders: &mut [OrderWithItems]) {
    orders.sort_by(|a, b| a.order.fifo_order(&b.order));
}

/// 部分退款请求（按明细ID退指定数量）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemRefund {
    pub line_item_id: i64,
    pub quantity: i64,
}
