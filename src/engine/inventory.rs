// ==========================================
// 集装箱分配系统 - 库存模型（剩余容量快照）
// ==========================================
// 职责: remaining[(集装箱, 产品)] = 申报容量 − 已关联订单需求
// 红线: 每次运行从持久化台账重建，不跨运行缓存
// 红线: deduct/restore 只修改内存快照，作用域为单次运行
// ==========================================

use crate::domain::allocation::RemainingCapacity;
use crate::domain::container::CapacityEntry;
use crate::domain::order::OrderWithItems;
use crate::domain::product::ProductKey;
use crate::engine::requirement::{RequirementExtractor, Requirements};
use std::collections::BTreeMap;

type SlotKey = (String, ProductKey);

// ==========================================
// InventorySnapshot - 库存快照
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventorySnapshot {
    total: BTreeMap<SlotKey, i64>,
    remaining: BTreeMap<SlotKey, i64>,
}

impl InventorySnapshot {
    /// 仅由容量条目构造（无任何已关联订单）
    ///
    /// 同一集装箱内规范化后相同的产品键容量累加
    pub fn from_capacity(capacity: &[CapacityEntry]) -> Self {
        let mut snapshot = Self::default();
        for entry in capacity {
            let key = (entry.container_id.clone(), entry.product_key.clone());
            *snapshot.total.entry(key.clone()).or_insert(0) += entry.total_quantity;
            *snapshot.remaining.entry(key).or_insert(0) += entry.total_quantity;
        }
        snapshot
    }

    /// 从台账重建快照
    ///
    /// # 参数
    /// - `capacity`: 容量条目
    /// - `linked_orders`: 当前已关联集装箱的订单（含明细）
    /// - `extractor`: 需求提取器
    /// - `exclude_order_id`: 正在决策的订单（不计入占用）
    pub fn rebuild(
        capacity: &[CapacityEntry],
        linked_orders: &[OrderWithItems],
        extractor: &RequirementExtractor,
        exclude_order_id: Option<&str>,
    ) -> Self {
        let mut snapshot = Self::from_capacity(capacity);
        for linked in linked_orders {
            if Some(linked.order.order_id.as_str()) == exclude_order_id {
                continue;
            }
            if let Some(container_id) = linked.order.container_id.as_deref() {
                let requirements = extractor.extract(&linked.line_items);
                snapshot.deduct(container_id, &requirements);
            }
        }
        snapshot
    }

    /// 剩余量（无容量条目视为 0）
    pub fn remaining(&self, container_id: &str, product_key: &ProductKey) -> i64 {
        self.remaining
            .get(&(container_id.to_string(), product_key.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// 申报总量（无容量条目视为 0）
    pub fn total(&self, container_id: &str, product_key: &ProductKey) -> i64 {
        self.total
            .get(&(container_id.to_string(), product_key.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// 集装箱能否同时满足全部需求
    ///
    /// 每个产品都需 remaining >= required 且 remaining > 0
    pub fn can_satisfy(&self, container_id: &str, requirements: &Requirements) -> bool {
        !requirements.is_empty()
            && requirements.iter().all(|(key, &required)| {
                let remaining = self.remaining(container_id, key);
                remaining > 0 && remaining >= required
            })
    }

    /// 扣减需求
    pub fn deduct(&mut self, container_id: &str, requirements: &Requirements) {
        for (key, &qty) in requirements {
            *self
                .remaining
                .entry((container_id.to_string(), key.clone()))
                .or_insert(0) -= qty;
        }
    }

    /// 回滚一次扣减（写入失败时使用）
    pub fn restore(&mut self, container_id: &str, requirements: &Requirements) {
        for (key, &qty) in requirements {
            *self
                .remaining
                .entry((container_id.to_string(), key.clone()))
                .or_insert(0) += qty;
        }
    }

    /// 全部 (集装箱, 产品) 概况，按集装箱ID、产品键排序
    pub fn entries(&self) -> Vec<RemainingCapacity> {
        self.remaining
            .iter()
            .map(|((container_id, product_key), &remaining)| RemainingCapacity {
                container_id: container_id.clone(),
                product_key: product_key.clone(),
                total_quantity: self.total.get(&(container_id.clone(), product_key.clone())).copied().unwrap_or(0),
                remaining_quantity: remaining,
            })
            .collect()
    }

    /// 指定集装箱的概况
    pub fn entries_for(&self, container_id: &str) -> Vec<RemainingCapacity> {
        self.entries()
            .into_iter()
            .filter(|e| e.container_id == container_id)
            .collect()
    }
}

// ==========================================
// 测试模块
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Order, OrderLineItem};
    use crate::domain::types::OrderState;
    use chrono::NaiveDate;

    fn reqs(pairs: &[(&str, i64)]) -> Requirements {
        pairs.iter().map(|(k, q)| (ProductKey::new(k), *q)).collect()
    }

    fn linked(order_id: &str, container_id: &str, items: &[(&str, i64)]) -> OrderWithItems {
        OrderWithItems {
            order: Order {
                order_id: order_id.to_string(),
                external_number: format!("#{}", order_id),
                created_at: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                arrival_seq: 0,
                container_id: Some(container_id.to_string()),
                delivery_eta: None,
                state: OrderState::Active,
            },
            line_items: items
                .iter()
                .enumerate()
                .map(|(i, (name, qty))| OrderLineItem::new(i as i64, order_id, name, *qty))
                .collect(),
        }
    }

    #[test]
    fn test_duplicate_capacity_entries_are_summed() {
        let snapshot = InventorySnapshot::from_capacity(&[
            CapacityEntry::new("C1", "Sofa", 3),
            CapacityEntry::new("C1", " SOFA", 2),
        ]);
        assert_eq!(snapshot.total("C1", &ProductKey::new("sofa")), 5);
        assert_eq!(snapshot.remaining("C1", &ProductKey::new("sofa")), 5);
    }

    #[test]
    fn test_rebuild_subtracts_linked_orders_except_the_one_being_decided() {
        let capacity = vec![CapacityEntry::new("C1", "sofa", 10)];
        let orders = vec![linked("A", "C1", &[("sofa", 3)]), linked("B", "C1", &[("sofa", 4)])];
        let extractor = RequirementExtractor::default();

        let all = InventorySnapshot::rebuild(&capacity, &orders, &extractor, None);
        assert_eq!(all.remaining("C1", &ProductKey::new("sofa")), 3);

        let without_b = InventorySnapshot::rebuild(&capacity, &orders, &extractor, Some("B"));
        assert_eq!(without_b.remaining("C1", &ProductKey::new("sofa")), 7);
    }

    #[test]
    fn test_can_satisfy_requires_every_product() {
        let snapshot = InventorySnapshot::from_capacity(&[
            CapacityEntry::new("C1", "sofa", 5),
            CapacityEntry::new("C1", "chair", 1),
        ]);

        assert!(snapshot.can_satisfy("C1", &reqs(&[("sofa", 5), ("chair", 1)])));
        assert!(!snapshot.can_satisfy("C1", &reqs(&[("sofa", 5), ("chair", 2)])));
        // 无容量条目的产品视为 0
        assert!(!snapshot.can_satisfy("C1", &reqs(&[("table", 1)])));
        assert!(!snapshot.can_satisfy("C2", &reqs(&[("sofa", 1)])));
    }

    #[test]
    fn test_deduct_then_restore_returns_to_original() {
        let mut snapshot = InventorySnapshot::from_capacity(&[CapacityEntry::new("C1", "sofa", 5)]);
        let original = snapshot.clone();

        snapshot.deduct("C1", &reqs(&[("sofa", 2)]));
        assert_eq!(snapshot.remaining("C1", &ProductKey::new("sofa")), 3);

        snapshot.restore("C1", &reqs(&[("sofa", 2)]));
        assert_eq!(snapshot, original);
    }

    #[test]
    fn test_over_allocated_ledger_never_satisfies() {
        let capacity = vec![CapacityEntry::new("C1", "sofa", 2)];
        let orders = vec![linked("A", "C1", &[("sofa", 3)])];
        let snapshot = InventorySnapshot::rebuild(&capacity, &orders, &RequirementExtractor::default(), None);

        assert_eq!(snapshot.remaining("C1", &ProductKey::new("sofa")), -1);
        assert!(!snapshot.can_satisfy("C1", &reqs(&[("sofa", 1)])));
    }
}
