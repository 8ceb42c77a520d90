// ==========================================
// 集装箱分配系统 - 分配一致性校验器
// ==========================================
// 职责: 只读审计，发现绕过分配引擎的人工修改造成的超配
// 红线: 不做任何修改；超配由人工决定挤出哪个订单
// ==========================================

use crate::config::AllocationConfig;
use crate::domain::container::{CapacityEntry, Container};
use crate::domain::order::{sort_fifo, OrderWithItems};
use crate::domain::product::ProductKey;
use crate::engine::inventory::InventorySnapshot;
use crate::engine::requirement::RequirementExtractor;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{instrument, warn};

/// 单个 (集装箱, 产品) 的超配记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityViolation {
    pub container_id: String,
    pub product_key: ProductKey,
    pub capacity: i64,
    pub allocated: i64,
    pub excess: i64,
    /// 参与占用的订单（FIFO 次序，截断到上限）
    pub order_ids: Vec<String>,
    /// 参与占用的订单总数（未截断）
    pub order_count: usize,
}

/// 指向不存在集装箱的关联
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanglingLink {
    pub order_id: String,
    pub container_id: String,
}

/// 校验报告
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub checked_pairs: usize,
    pub linked_orders: usize,
    pub violations: Vec<CapacityViolation>,
    pub dangling_links: Vec<DanglingLink>,
}

impl ValidationReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty() && self.dangling_links.is_empty()
    }
}

// ==========================================
// AllocationValidator - 分配校验器
// ==========================================
pub struct AllocationValidator {
    max_order_ids: usize,
}

impl AllocationValidator {
    pub fn new(max_order_ids: usize) -> Self {
        Self {
            max_order_ids: max_order_ids.max(1),
        }
    }

    pub fn from_config(config: &AllocationConfig) -> Self {
        Self::new(config.validator_max_order_ids)
    }

    /// 校验当前台账
    ///
    /// # 参数
    /// - `containers`: 全部集装箱（含已交付）
    /// - `capacity`: 容量条目
    /// - `linked_orders`: 当前已关联集装箱的订单
    /// - `extractor`: 需求提取器（排除集合与分配时一致）
    #[instrument(skip_all, fields(linked = linked_orders.len()))]
    pub fn validate(
        &self,
        containers: &[Container],
        capacity: &[CapacityEntry],
        linked_orders: &[OrderWithItems],
        extractor: &RequirementExtractor,
    ) -> ValidationReport {
        let known: HashSet<&str> = containers.iter().map(|c| c.container_id.as_str()).collect();
        let declared = InventorySnapshot::from_capacity(capacity);

        let mut sorted = linked_orders.to_vec();
        sort_fifo(&mut sorted);

        let mut allocated: BTreeMap<(String, ProductKey), (i64, Vec<String>)> = BTreeMap::new();
        let mut report = ValidationReport::default();

        for linked in &sorted {
            let container_id = match linked.order.container_id.as_deref() {
                Some(c) => c,
                None => continue,
            };
            report.linked_orders += 1;

            if !known.contains(container_id) {
                report.dangling_links.push(DanglingLink {
                    order_id: linked.order.order_id.clone(),
                    container_id: container_id.to_string(),
                });
                continue;
            }

            for (key, qty) in extractor.extract(&linked.line_items) {
                let slot = allocated
                    .entry((container_id.to_string(), key))
                    .or_insert_with(|| (0, Vec::new()));
                slot.0 += qty;
                slot.1.push(linked.order.order_id.clone());
            }
        }

        report.checked_pairs = allocated.len();
        for ((container_id, product_key), (qty, order_ids)) in allocated {
            let cap = declared.total(&container_id, &product_key);
            if qty <= cap {
                continue;
            }
            let order_count = order_ids.len();
            report.violations.push(CapacityViolation {
                excess: qty - cap,
                capacity: cap,
                allocated: qty,
                order_ids: order_ids.into_iter().take(self.max_order_ids).collect(),
                order_count,
                container_id,
                product_key,
            });
        }

        if !report.is_consistent() {
            warn!(
                violations = report.violations.len(),
                dangling_links = report.dangling_links.len(),
                "分配台账存在不一致"
            );
        }
        report
    }
}
