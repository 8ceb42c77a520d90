// ==========================================
// 集装箱分配系统 - 分配结果领域模型
// ==========================================
// 职责: 分配运行输出的显式差异（分配/跳过/剩余容量）
// ==========================================

use crate::domain::product::ProductKey;
use crate::domain::types::{RemovalKind, SkipReason};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 一条分配决定：订单 → 集装箱
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub order_id: String,
    pub external_number: String,
    pub container_id: String,
    pub delivery_eta: Option<NaiveDate>,
}

/// 未分配订单及原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedOrder {
    pub order_id: String,
    pub external_number: String,
    pub reason: SkipReason,
}

/// 单个 (集装箱, 产品) 的容量概况
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainingCapacity {
    pub container_id: String,
    pub product_key: ProductKey,
    pub total_quantity: i64,
    pub remaining_quantity: i64,
}

impl RemainingCapacity {
    /// 已占用数量（超配时大于总量）
    pub fn allocated_quantity(&self) -> i64 {
        self.total_quantity - self.remaining_quantity
    }
}

// ==========================================
// BatchAllocationReport - 批量分配结果
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchAllocationReport {
    pub considered_count: usize,       // 参与本次运行的未分配订单数
    pub allocated: Vec<Assignment>,    // 新分配
    pub skipped: Vec<SkippedOrder>,    // 跳过
    pub remaining: Vec<RemainingCapacity>, // 运行结束后的剩余容量
    pub elapsed_ms: i64,
}

impl BatchAllocationReport {
    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// 按原因汇总跳过数量
    pub fn skip_reason_counts(&self) -> BTreeMap<SkipReason, usize> {
        let mut counts = BTreeMap::new();
        for s in &self.skipped {
            *counts.entry(s.reason).or_insert(0) += 1;
        }
        counts
    }

    /// 查询某集装箱某产品的剩余量（无条目返回 None）
    pub fn remaining_for(&self, container_id: &str, product: &str) -> Option<i64> {
        let key = ProductKey::new(product);
        self.remaining
            .iter()
            .find(|r| r.container_id == container_id && r.product_key == key)
            .map(|r| r.remaining_quantity)
    }
}

// ==========================================
// SingleAllocationOutcome - 单订单分配结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SingleAllocationOutcome {
    /// 本次分配成功
    Allocated(Assignment),
    /// 订单早已分配，保持不变
    AlreadyAllocated { order_id: String, container_id: String },
    /// 未能分配
    Skipped(SkippedOrder),
}

// ==========================================
// ReallocationReport - 移除订单后的级联重分配结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReallocationReport {
    pub removed_order_id: String,
    pub removal_kind: RemovalKind,
    pub former_container_id: Option<String>,
    /// 被解绑并重放的订单（FIFO 次序）
    pub unlinked: Vec<String>,
    /// 重放后重新分配成功的订单
    pub reallocated: Vec<Assignment>,
    /// 重放后未能重新分配的订单（可见的回退，非错误）
    pub unplaced: Vec<SkippedOrder>,
}

// ==========================================
// RefundOutcome - 部分退款结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundOutcome {
    pub order_id: String,
    /// 被完全移除的明细ID
    pub removed_line_items: Vec<i64>,
    /// 被减少数量的明细ID
    pub reduced_line_items: Vec<i64>,
    /// 订单是否保留原集装箱
    pub kept_container_id: Option<String>,
    /// 退款后不再占用空间时触发的级联重分配
    pub cascade: Option<ReallocationReport>,
}

// ==========================================
// UnlinkOutcome - 人工解绑结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UnlinkOutcome {
    Unlinked { order_id: String, container_id: String },
    NotAllocated { order_id: String },
    UnknownOrder { order_id: String },
}
