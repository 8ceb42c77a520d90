// ==========================================
// 集装箱分配系统 - 增量（单订单）分配引擎
// ==========================================
// 职责: 新到订单按同一 FIFO 规则单独分配
// 红线: 快照 = 总容量 − 当前全部已关联订单需求（仅排除本订单）
// 红线: 按创建次序逐个重放 ≡ 一次批量运行
// ==========================================

use crate::domain::allocation::SingleAllocationOutcome;
use crate::domain::container::{eligible_in_scan_order, CapacityEntry, Container};
use crate::domain::order::OrderWithItems;
use crate::engine::fifo_allocator::FifoAllocator;
use crate::engine::inventory::InventorySnapshot;
use crate::engine::requirement::RequirementExtractor;
use tracing::instrument;

pub struct IncrementalAllocator {
    allocator: FifoAllocator,
}

impl IncrementalAllocator {
    pub fn new() -> Self {
        Self {
            allocator: FifoAllocator::new(),
        }
    }

    /// 为单个订单分配（纯计算，不落库）
    ///
    /// # 参数
    /// - `order`: 待分配订单
    /// - `containers`: 全部集装箱（内部筛选/排序）
    /// - `capacity`: 容量条目
    /// - `linked_orders`: 当前已关联集装箱的订单
    /// - `extractor`: 需求提取器
    #[instrument(skip_all, fields(order_id = %order.order.order_id))]
    pub fn allocate_one(
        &self,
        order: &OrderWithItems,
        containers: &[Container],
        capacity: &[CapacityEntry],
        linked_orders: &[OrderWithItems],
        extractor: &RequirementExtractor,
    ) -> SingleAllocationOutcome {
        if let Some(container_id) = order.order.container_id.as_deref() {
            return SingleAllocationOutcome::AlreadyAllocated {
                order_id: order.order.order_id.clone(),
                container_id: container_id.to_string(),
            };
        }

        let demand = match extractor.demand_for(order) {
            Ok(d) => d,
            Err(skipped) => return SingleAllocationOutcome::Skipped(skipped),
        };

        let mut snapshot = InventorySnapshot::rebuild(
            capacity,
            linked_orders,
            extractor,
            Some(order.order.order_id.as_str()),
        );
        let scan_order = eligible_in_scan_order(containers);

        match self.allocator.place(&demand, &scan_order, &mut snapshot) {
            Ok(assignment) => SingleAllocationOutcome::Allocated(assignment),
            Err(reason) => SingleAllocationOutcome::Skipped(self.allocator.create_skip(&demand, reason)),
        }
    }

    /// 写事务内复核：订单能否放入指定集装箱
    ///
    /// `linked_orders` 为该集装箱当前的全部关联订单
    pub fn fits(
        &self,
        order: &OrderWithItems,
        container_id: &str,
        capacity: &[CapacityEntry],
        linked_orders: &[OrderWithItems],
        extractor: &RequirementExtractor,
    ) -> bool {
        let requirements = extractor.extract(&order.line_items);
        if requirements.is_empty() {
            return false;
        }
        let snapshot = InventorySnapshot::rebuild(
            capacity,
            linked_orders,
            extractor,
            Some(order.order.order_id.as_str()),
        );
        snapshot.can_satisfy(container_id, &requirements)
    }
}

impl Default for IncrementalAllocator {
    fn default() -> Self {
        Self::new()
    }
}
