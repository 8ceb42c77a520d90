// ==========================================
// 集装箱分配系统 - 级联重分配引擎
// ==========================================
// 触发: 删除订单 / 全额退款 / 部分退款后不再含占位明细
// 规则:
// 1) 找出仍关联在原集装箱、FIFO 次序晚于被移除订单的订单
// 2) 解绑这些订单，回到未分配池
// 3) 以反映移除后的快照，按原创建次序对这一集合重放 FIFO 规则
// 4) 未能重新分配的订单保持未分配并显式输出
// ==========================================
// 红线: 工作列表显式迭代，不递归
// ==========================================

use crate::domain::allocation::{Assignment, SkippedOrder};
use crate::domain::container::{eligible_in_scan_order, CapacityEntry, Container};
use crate::domain::order::{sort_fifo, Order, OrderWithItems};
use crate::domain::types::SkipReason;
use crate::engine::fifo_allocator::FifoAllocator;
use crate::engine::inventory::InventorySnapshot;
use crate::engine::requirement::RequirementExtractor;
use std::collections::VecDeque;
use tracing::{debug, instrument};

/// 重放结果
#[derive(Debug, Clone, Default)]
pub struct ReplayResult {
    pub reallocated: Vec<Assignment>,
    pub unplaced: Vec<SkippedOrder>,
}

pub struct ReallocationCoordinator {
    allocator: FifoAllocator,
}

impl ReallocationCoordinator {
    pub fn new() -> Self {
        Self {
            allocator: FifoAllocator::new(),
        }
    }

    /// 计算需重放的工作列表
    ///
    /// # 参数
    /// - `removed`: 被移除的订单（移除前的状态）
    /// - `linked_orders`: 当前已关联集装箱的订单
    ///
    /// # 返回
    /// 同集装箱内晚于 removed 的订单，按 FIFO 次序；removed 未关联时为空
    pub fn cascade_worklist(
        &self,
        removed: &Order,
        linked_orders: &[OrderWithItems],
    ) -> VecDeque<OrderWithItems> {
        let container_id = match removed.container_id.as_deref() {
            Some(c) => c,
            None => return VecDeque::new(),
        };

        let mut affected: Vec<OrderWithItems> = linked_orders
            .iter()
            .filter(|o| {
                o.order.order_id != removed.order_id
                    && o.order.is_active()
                    && o.order.container_id.as_deref() == Some(container_id)
                    && o.order.is_later_than(removed)
            })
            .cloned()
            .collect();
        sort_fifo(&mut affected);
        affected.into()
    }

    /// 重放工作列表
    ///
    /// 调用方保证 `snapshot` 已反映被移除订单与工作列表订单的解绑
    pub fn replay(
        &self,
        worklist: VecDeque<OrderWithItems>,
        containers: &[Container],
        snapshot: &mut InventorySnapshot,
        extractor: &RequirementExtractor,
    ) -> ReplayResult {
        self.replay_with(worklist, containers, snapshot, extractor, |_| Ok(()))
    }

    /// 重放工作列表，每个重新分配的决定交给 `commit` 落库
    #[instrument(skip_all, fields(worklist_len = worklist.len()))]
    pub fn replay_with<F>(
        &self,
        mut worklist: VecDeque<OrderWithItems>,
        containers: &[Container],
        snapshot: &mut InventorySnapshot,
        extractor: &RequirementExtractor,
        mut commit: F,
    ) -> ReplayResult
    where
        F: FnMut(&Assignment) -> Result<(), SkipReason>,
    {
        let scan_order = eligible_in_scan_order(containers);
        let mut result = ReplayResult::default();

        while let Some(mut next) = worklist.pop_front() {
            next.order.container_id = None;
            next.order.delivery_eta = None;

            let demand = match extractor.demand_for(&next) {
                Ok(d) => d,
                Err(skipped) => {
                    result.unplaced.push(skipped);
                    continue;
                }
            };

            match self
                .allocator
                .place_and_commit(&demand, &scan_order, snapshot, &mut commit)
            {
                Ok(assignment) => {
                    debug!(order_id = %assignment.order_id, container_id = %assignment.container_id, "重放分配成功");
                    result.reallocated.push(assignment);
                }
                Err(reason) => result.unplaced.push(self.allocator.create_skip(&demand, reason)),
            }
        }

        result
    }

    /// 纯内存推演：移除订单并级联重放
    ///
    /// # 参数
    /// - `removed_order_id`: 被移除订单
    /// - `orders`: 全部订单（含当前关联状态）
    ///
    /// # 返回
    /// (工作列表订单ID, 重放结果)；订单不存在时返回 None
    pub fn plan_removal(
        &self,
        removed_order_id: &str,
        orders: &[OrderWithItems],
        containers: &[Container],
        capacity: &[CapacityEntry],
        extractor: &RequirementExtractor,
    ) -> Option<(Vec<String>, ReplayResult)> {
        let removed = orders.iter().find(|o| o.order.order_id == removed_order_id)?;
        let linked: Vec<OrderWithItems> = orders
            .iter()
            .filter(|o| o.order.is_allocated() && o.order.is_active())
            .cloned()
            .collect();

        let worklist = self.cascade_worklist(&removed.order, &linked);
        let unlinked_ids: Vec<String> = worklist.iter().map(|o| o.order.order_id.clone()).collect();

        // 快照排除被移除订单与工作列表订单
        let remaining_linked: Vec<OrderWithItems> = linked
            .into_iter()
            .filter(|o| o.order.order_id != removed_order_id && !unlinked_ids.contains(&o.order.order_id))
            .collect();
        let mut snapshot = InventorySnapshot::rebuild(capacity, &remaining_linked, extractor, None);

        let result = self.replay(worklist, containers, &mut snapshot, extractor);
        Some((unlinked_ids, result))
    }
}

impl Default for ReallocationCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
