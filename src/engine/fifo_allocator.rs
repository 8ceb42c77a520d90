// ==========================================
// 集装箱分配系统 - FIFO 分配引擎
// ==========================================
// 红线: 订单严格按创建次序处理，不为更优匹配而调整次序
// 红线: 全有或全无，一个订单只进一个集装箱
// ==========================================
// 职责: 订单 → 最早 ETA 且容量足够的集装箱
// 输入: 未分配订单 + 集装箱 + 库存快照
// 输出: 分配差异 + 跳过原因 + 运行后剩余容量
// ==========================================

use crate::domain::allocation::{Assignment, BatchAllocationReport, SkippedOrder};
use crate::domain::container::{eligible_in_scan_order, Container};
use crate::domain::order::{sort_fifo, OrderWithItems};
use crate::domain::types::SkipReason;
use crate::engine::inventory::InventorySnapshot;
use crate::engine::requirement::{OrderDemand, RequirementExtractor};
use std::collections::HashMap;
use tracing::{debug, instrument};

// ==========================================
// FifoAllocator - FIFO 分配引擎
// ==========================================
pub struct FifoAllocator {
    // 无状态引擎，不需要注入依赖
}

impl FifoAllocator {
    pub fn new() -> Self {
        Self {}
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 选择第一个能满足全部需求的集装箱
    ///
    /// # 参数
    /// - `demand`: 订单需求
    /// - `scan_order`: 可用集装箱（已按 ETA 排序）
    /// - `snapshot`: 库存快照
    pub fn select_container<'a>(
        &self,
        demand: &OrderDemand,
        scan_order: &'a [Container],
        snapshot: &InventorySnapshot,
    ) -> Option<&'a Container> {
        scan_order
            .iter()
            .find(|c| snapshot.can_satisfy(&c.container_id, &demand.requirements))
    }

    /// 为单个订单做决定并扣减快照
    ///
    /// # 返回
    /// - Ok(Assignment): 选中的集装箱
    /// - Err(SkipReason): 无可用集装箱 / 容量不足
    pub fn place(
        &self,
        demand: &OrderDemand,
        scan_order: &[Container],
        snapshot: &mut InventorySnapshot,
    ) -> Result<Assignment, SkipReason> {
        if scan_order.is_empty() {
            return Err(SkipReason::ContainerUnavailable);
        }

        let container = self
            .select_container(demand, scan_order, snapshot)
            .ok_or(SkipReason::InsufficientStock)?;

        snapshot.deduct(&container.container_id, &demand.requirements);
        Ok(self.create_assignment(demand, container))
    }

    /// 批量分配（纯计算，不落库）
    ///
    /// 规则：
    /// 1) 只处理未分配的有效订单，按 created_at 升序（同时间按入库序号）
    /// 2) 无有效需求的订单直接跳过 (no_items)
    /// 3) 集装箱按 ETA 升序扫描，空 ETA 最后，DELIVERED 不参与
    /// 4) 选中后扣减快照，后续订单看到扣减后的剩余量
    ///
    /// 相同输入必然产生相同结果
    #[instrument(skip_all, fields(
        orders_count = orders.len(),
        containers_count = containers.len()
    ))]
    pub fn allocate(
        &self,
        orders: &[OrderWithItems],
        containers: &[Container],
        snapshot: &mut InventorySnapshot,
        extractor: &RequirementExtractor,
    ) -> BatchAllocationReport {
        self.allocate_with(orders, containers, snapshot, extractor, |_| Ok(()))
    }

    /// 批量分配，每个决定立即交给 `commit` 落库
    ///
    /// `commit` 返回 Err 时回滚该订单在快照上的扣减，订单以对应原因跳过，
    /// 后续订单继续处理
    pub fn allocate_with<F>(
        &self,
        orders: &[OrderWithItems],
        containers: &[Container],
        snapshot: &mut InventorySnapshot,
        extractor: &RequirementExtractor,
        mut commit: F,
    ) -> BatchAllocationReport
    where
        F: FnMut(&Assignment) -> Result<(), SkipReason>,
    {
        let mut pending: Vec<OrderWithItems> = orders
            .iter()
            .filter(|o| o.order.is_active() && !o.order.is_allocated())
            .cloned()
            .collect();
        sort_fifo(&mut pending);

        let scan_order = eligible_in_scan_order(containers);
        let (demands, mut skipped) = extractor.partition(&pending);

        let mut report = BatchAllocationReport {
            considered_count: pending.len(),
            ..Default::default()
        };

        for demand in &demands {
            match self.place_and_commit(demand, &scan_order, snapshot, &mut commit) {
                Ok(assignment) => {
                    debug!(
                        order_id = %assignment.order_id,
                        container_id = %assignment.container_id,
                        "订单已分配"
                    );
                    report.allocated.push(assignment);
                }
                Err(reason) => skipped.push(self.create_skip(demand, reason)),
            }
        }

        // 跳过列表按 FIFO 次序输出
        let fifo_index: HashMap<&str, usize> = pending
            .iter()
            .enumerate()
            .map(|(i, o)| (o.order.order_id.as_str(), i))
            .collect();
        skipped.sort_by_key(|s| {
            fifo_index
                .get(s.order_id.as_str())
                .copied()
                .unwrap_or(usize::MAX)
        });
        report.skipped = skipped;
        report.remaining = snapshot.entries();
        report
    }

    /// 决定 + 落库；落库失败时恢复快照
    pub fn place_and_commit<F>(
        &self,
        demand: &OrderDemand,
        scan_order: &[Container],
        snapshot: &mut InventorySnapshot,
        commit: &mut F,
    ) -> Result<Assignment, SkipReason>
    where
        F: FnMut(&Assignment) -> Result<(), SkipReason>,
    {
        let assignment = self.place(demand, scan_order, snapshot)?;
        if let Err(reason) = commit(&assignment) {
            snapshot.restore(&assignment.container_id, &demand.requirements);
            return Err(reason);
        }
        Ok(assignment)
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    fn create_assignment(&self, demand: &OrderDemand, container: &Container) -> Assignment {
        Assignment {
            order_id: demand.order.order_id.clone(),
            external_number: demand.order.external_number.clone(),
            container_id: container.container_id.clone(),
            delivery_eta: container.eta,
        }
    }

    pub(crate) fn create_skip(&self, demand: &OrderDemand, reason: SkipReason) -> SkippedOrder {
        SkippedOrder {
            order_id: demand.order.order_id.clone(),
            external_number: demand.order.external_number.clone(),
            reason,
        }
    }
}

impl Default for FifoAllocator {
    fn default() -> Self {
        Self::new()
    }
}
