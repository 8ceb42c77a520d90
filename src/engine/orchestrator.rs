// ==========================================
// 集装箱分配系统 - 分配编排器
// ==========================================
// 用途: 协调 需求提取 → 快照 → FIFO 决策 → 落库 → 审计
// 入口:
// - run_batch: 批量分配
// - allocate_single: 单订单（增量）分配
// - remove_order_and_cascade: 删除/全额退款 + 级联重分配
// - refund_line_items: 部分退款（清空占位明细时级联）
// - unlink_order: 人工解绑（不级联）
// - validate / capacity_overview: 只读
// ==========================================
// 红线: 配置与台账每次运行重新读取，不跨运行缓存
// 红线: 审计日志写入失败只告警，不影响分配结果
// ==========================================

use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::allocation::{
    Assignment, BatchAllocationReport, ReallocationReport, RefundOutcome, RemainingCapacity,
    SingleAllocationOutcome, UnlinkOutcome,
};
use crate::domain::container::{eligible_in_scan_order, Container};
use crate::domain::order::{LineItemRefund, OrderWithItems};
use crate::domain::types::{RemovalKind, SkipReason};
use crate::engine::container_locks::{ContainerLockRegistry, ContainerLockSet};
use crate::engine::fifo_allocator::FifoAllocator;
use crate::engine::incremental::IncrementalAllocator;
use crate::engine::inventory::InventorySnapshot;
use crate::engine::reallocation::ReallocationCoordinator;
use crate::engine::repositories::AllocationRepositories;
use crate::engine::requirement::RequirementExtractor;
use crate::engine::validator::{AllocationValidator, ValidationReport};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::LinkOutcome;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

// ==========================================
// AllocationOrchestrator - 分配编排器
// ==========================================
pub struct AllocationOrchestrator {
    repos: AllocationRepositories,
    locks: Arc<ContainerLockRegistry>,
    allocator: FifoAllocator,
    incremental: IncrementalAllocator,
    coordinator: ReallocationCoordinator,
}

impl AllocationOrchestrator {
    /// 创建新的编排器实例
    ///
    /// # 参数
    /// - repos: 仓储集合
    /// - locks: 集装箱锁注册表（同一数据库的所有编排器必须共享）
    pub fn new(repos: AllocationRepositories, locks: Arc<ContainerLockRegistry>) -> Self {
        Self {
            repos,
            locks,
            allocator: FifoAllocator::new(),
            incremental: IncrementalAllocator::new(),
            coordinator: ReallocationCoordinator::new(),
        }
    }

    pub fn repositories(&self) -> &AllocationRepositories {
        &self.repos
    }

    // ==========================================
    // 批量分配
    // ==========================================

    /// 对全部未分配订单执行一次 FIFO 分配
    ///
    /// 幂等：无新订单/容量变化时重复运行不产生新分配
    #[instrument(skip(self))]
    pub fn run_batch(&self, actor: Option<&str>) -> RepositoryResult<BatchAllocationReport> {
        let start = Instant::now();
        let config = self.repos.config_manager.load_allocation_config()?;
        let extractor = RequirementExtractor::from_config(&config);

        let lock_set = self.lock_eligible(None)?;
        let containers = self.locked_containers(&lock_set)?;
        let capacity = self.repos.container_repo.capacity_all()?;
        let linked = self.repos.order_repo.find_linked()?;
        let pending = self.repos.order_repo.find_unallocated_active()?;

        info!(
            pending = pending.len(),
            linked = linked.len(),
            containers = containers.len(),
            "开始批量分配"
        );

        let mut snapshot = InventorySnapshot::rebuild(&capacity, &linked, &extractor, None);
        let mut report = self.allocator.allocate_with(
            &pending,
            &containers,
            &mut snapshot,
            &extractor,
            |assignment| self.commit_link(assignment, &extractor),
        );
        drop(lock_set);

        report.elapsed_ms = start.elapsed().as_millis() as i64;
        info!(
            allocated = report.allocated_count(),
            skipped = report.skipped_count(),
            elapsed_ms = report.elapsed_ms,
            "批量分配完成"
        );

        let skip_counts: Vec<_> = report
            .skip_reason_counts()
            .into_iter()
            .map(|(reason, count)| json!({"reason": reason, "count": count}))
            .collect();
        self.record(
            ActionLog::new(ActionType::BatchAllocate, config.actor_or_default(actor))
                .with_payload(json!({
                    "considered": report.considered_count,
                    "allocated": report.allocated,
                    "skipped": report.skipped,
                    "skip_counts": skip_counts,
                    "config": self.config_snapshot(),
                }))
                .with_detail(format!(
                    "批量分配: 分配{}个, 跳过{}个",
                    report.allocated_count(),
                    report.skipped_count()
                )),
        );

        Ok(report)
    }

    // ==========================================
    // 单订单分配
    // ==========================================

    /// 为新到订单分配集装箱
    ///
    /// 按扫描顺序逐个集装箱加锁判断，同一时刻只持有一个集装箱锁
    #[instrument(skip(self))]
    pub fn allocate_single(
        &self,
        order_id: &str,
        actor: Option<&str>,
    ) -> RepositoryResult<SingleAllocationOutcome> {
        let config = self.repos.config_manager.load_allocation_config()?;
        let extractor = RequirementExtractor::from_config(&config);
        let actor = config.actor_or_default(actor);
        let order = self.require_order(order_id)?;

        if !order.order.is_active() {
            return Err(RepositoryError::OrderNotActive {
                order_id: order_id.to_string(),
                state: order.order.state,
            });
        }
        if let Some(container_id) = order.order.container_id.clone() {
            return Ok(SingleAllocationOutcome::AlreadyAllocated {
                order_id: order_id.to_string(),
                container_id,
            });
        }

        let demand = match extractor.demand_for(&order) {
            Ok(d) => d,
            Err(skipped) => return Ok(self.finish_single(SingleAllocationOutcome::Skipped(skipped), actor)),
        };

        let scan_order = eligible_in_scan_order(&self.repos.container_repo.find_all()?);
        let mut saw_eligible = false;
        let mut allocated = None;

        for candidate in &scan_order {
            let _guard = self.locks.lock(&candidate.container_id);

            // 加锁后重新读取，集装箱状态可能已变化
            let container = match self.repos.container_repo.find_by_id(&candidate.container_id)? {
                Some(c) if c.is_eligible() => c,
                _ => continue,
            };
            let capacity = self.repos.container_repo.capacity_for(&container.container_id)?;
            let linked = self.repos.order_repo.find_linked_to(&container.container_id)?;

            let decision = self.incremental.allocate_one(
                &order,
                std::slice::from_ref(&container),
                &capacity,
                &linked,
                &extractor,
            );
            let assignment = match decision {
                SingleAllocationOutcome::Allocated(a) => a,
                _ => {
                    saw_eligible = true;
                    continue;
                }
            };

            // 进程锁只约束本进程；写事务内按数据库现状再判一次
            match self.link_checked(&assignment, &extractor)? {
                LinkOutcome::Linked => {
                    allocated = Some(SingleAllocationOutcome::Allocated(assignment));
                    break;
                }
                LinkOutcome::AlreadyLinked { container_id } => {
                    allocated = Some(SingleAllocationOutcome::AlreadyAllocated {
                        order_id: order_id.to_string(),
                        container_id,
                    });
                    break;
                }
                LinkOutcome::OrderMissing | LinkOutcome::NotActive => {
                    let current = self.require_order(order_id)?;
                    return Err(RepositoryError::OrderNotActive {
                        order_id: order_id.to_string(),
                        state: current.order.state,
                    });
                }
                LinkOutcome::CapacityExhausted => {
                    saw_eligible = true;
                    debug!(container_id = %assignment.container_id, "写入前复核容量不足，尝试下一个集装箱");
                }
                LinkOutcome::ContainerUnavailable => {
                    debug!(container_id = %assignment.container_id, "写入前集装箱已不可分配");
                }
            }
        }

        let outcome = allocated.unwrap_or_else(|| {
            let reason = if saw_eligible {
                SkipReason::InsufficientStock
            } else {
                SkipReason::ContainerUnavailable
            };
            SingleAllocationOutcome::Skipped(self.allocator.create_skip(&demand, reason))
        });

        Ok(self.finish_single(outcome, actor))
    }

    fn finish_single(&self, outcome: SingleAllocationOutcome, actor: &str) -> SingleAllocationOutcome {
        let (order_id, container_id, detail) = match &outcome {
            SingleAllocationOutcome::Allocated(a) => (
                a.order_id.clone(),
                Some(a.container_id.clone()),
                format!("订单{}分配至{}", a.order_id, a.container_id),
            ),
            SingleAllocationOutcome::AlreadyAllocated { order_id, container_id } => (
                order_id.clone(),
                Some(container_id.clone()),
                format!("订单{}已分配至{}", order_id, container_id),
            ),
            SingleAllocationOutcome::Skipped(s) => (
                s.order_id.clone(),
                None,
                format!("订单{}未分配: {}", s.order_id, s.reason),
            ),
        };
        debug!(order_id = %order_id, detail = %detail, "单订单分配结束");

        self.record(
            ActionLog::new(ActionType::AllocateSingle, actor)
                .with_order(&order_id)
                .with_container(container_id.as_deref())
                .with_payload(json!(outcome))
                .with_detail(detail),
        );
        outcome
    }

    // ==========================================
    // 移除与级联重分配
    // ==========================================

    /// 删除订单或全额退款，并为同集装箱内较晚的订单重放分配
    #[instrument(skip(self))]
    pub fn remove_order_and_cascade(
        &self,
        order_id: &str,
        kind: RemovalKind,
        actor: Option<&str>,
    ) -> RepositoryResult<ReallocationReport> {
        if kind == RemovalKind::RefundedToEmpty {
            return Err(RepositoryError::BusinessRuleViolation(
                "部分退款请使用 refund_line_items".to_string(),
            ));
        }

        let config = self.repos.config_manager.load_allocation_config()?;
        let extractor = RequirementExtractor::from_config(&config);

        let first_read = self.require_order(order_id)?;
        let lock_set = self.lock_eligible(first_read.order.container_id.as_deref())?;
        // 加锁后重新读取
        let order = self.require_order(order_id)?;
        Self::ensure_covered(&order, &lock_set)?;

        let report = self.cascade_locked(&order, kind, &extractor, &lock_set)?;
        drop(lock_set);

        self.record(
            ActionLog::new(ActionType::RemoveOrder, config.actor_or_default(actor))
                .with_order(order_id)
                .with_container(report.former_container_id.as_deref())
                .with_payload(json!(report))
                .with_detail(format!(
                    "{}: 解绑{}个, 重新分配{}个, 未分配{}个",
                    kind,
                    report.unlinked.len(),
                    report.reallocated.len(),
                    report.unplaced.len()
                )),
        );
        Ok(report)
    }

    /// 部分退款
    ///
    /// 退款后仍有占位需求时保留原集装箱；否则按移除处理并级联
    #[instrument(skip(self, refunds), fields(refunds = refunds.len()))]
    pub fn refund_line_items(
        &self,
        order_id: &str,
        refunds: &[LineItemRefund],
        actor: Option<&str>,
    ) -> RepositoryResult<RefundOutcome> {
        if refunds.is_empty() {
            return Err(RepositoryError::FieldValueError {
                field: "refunds".to_string(),
                message: "退款明细不能为空".to_string(),
            });
        }

        let config = self.repos.config_manager.load_allocation_config()?;
        let extractor = RequirementExtractor::from_config(&config);

        let first_read = self.require_order(order_id)?;
        let lock_set = self.lock_eligible(first_read.order.container_id.as_deref())?;
        Self::ensure_covered(&self.require_order(order_id)?, &lock_set)?;

        let applied = self.repos.order_repo.apply_line_item_refunds(order_id, refunds)?;
        let order = self.require_order(order_id)?;
        let still_required = !extractor.extract(&order.line_items).is_empty();

        let cascade = match order.order.container_id.as_deref() {
            Some(container_id) if !still_required => {
                if !lock_set.covers(container_id) {
                    // 退款已落库，但订单在退款期间被改关联，不能在未加锁的集装箱上级联
                    warn!(order_id, container_id, "退款订单所在集装箱未加锁，未执行级联");
                    return Err(RepositoryError::ConcurrentModification(format!(
                        "订单{}退款已生效，但关联状态在处理中发生变化，请重新移除该订单",
                        order_id
                    )));
                }
                Some(self.cascade_locked(&order, RemovalKind::RefundedToEmpty, &extractor, &lock_set)?)
            }
            _ => None,
        };
        drop(lock_set);

        let outcome = RefundOutcome {
            order_id: order_id.to_string(),
            removed_line_items: applied.removed_line_items,
            reduced_line_items: applied.reduced_line_items,
            kept_container_id: if cascade.is_some() {
                None
            } else {
                order.order.container_id.clone()
            },
            cascade,
        };

        self.record(
            ActionLog::new(ActionType::PartialRefund, config.actor_or_default(actor))
                .with_order(order_id)
                .with_container(first_read.order.container_id.as_deref())
                .with_payload(json!(outcome))
                .with_detail(format!(
                    "部分退款: 移除明细{}条, 减少明细{}条",
                    outcome.removed_line_items.len(),
                    outcome.reduced_line_items.len()
                )),
        );
        Ok(outcome)
    }

    /// 在已持有锁的前提下移除订单并重放工作列表
    fn cascade_locked(
        &self,
        order: &OrderWithItems,
        kind: RemovalKind,
        extractor: &RequirementExtractor,
        lock_set: &ContainerLockSet,
    ) -> RepositoryResult<ReallocationReport> {
        let order_id = order.order.order_id.as_str();
        let former_container_id = order.order.container_id.clone();

        let linked = self.repos.order_repo.find_linked()?;
        let worklist = self.coordinator.cascade_worklist(&order.order, &linked);
        let unlinked: Vec<String> = worklist.iter().map(|o| o.order.order_id.clone()).collect();

        // 移除 + 解绑工作列表在同一事务中落库
        self.repos
            .order_repo
            .remove_and_unlink(order_id, kind, &unlinked)?;

        let mut report = ReallocationReport {
            removed_order_id: order_id.to_string(),
            removal_kind: kind,
            former_container_id,
            unlinked,
            reallocated: Vec::new(),
            unplaced: Vec::new(),
        };
        if worklist.is_empty() {
            debug!(order_id, "无需级联重放");
            return Ok(report);
        }

        let containers = self.locked_containers(lock_set)?;
        let capacity = self.repos.container_repo.capacity_all()?;
        let remaining_linked = self.repos.order_repo.find_linked()?;
        let mut snapshot = InventorySnapshot::rebuild(&capacity, &remaining_linked, extractor, None);

        let result = self.coordinator.replay_with(
            worklist,
            &containers,
            &mut snapshot,
            extractor,
            |assignment| self.commit_link(assignment, extractor),
        );
        if !result.unplaced.is_empty() {
            warn!(
                order_id,
                unplaced = result.unplaced.len(),
                "级联重放后部分订单未能重新分配"
            );
        }

        report.reallocated = result.reallocated;
        report.unplaced = result.unplaced;
        Ok(report)
    }

    // ==========================================
    // 人工解绑
    // ==========================================

    /// 将单个订单退回未分配池（不级联）
    #[instrument(skip(self))]
    pub fn unlink_order(&self, order_id: &str, actor: Option<&str>) -> RepositoryResult<UnlinkOutcome> {
        let config = self.repos.config_manager.load_allocation_config()?;

        let order = match self.repos.order_repo.find_by_id(order_id)? {
            Some(o) => o,
            None => {
                return Ok(UnlinkOutcome::UnknownOrder {
                    order_id: order_id.to_string(),
                })
            }
        };
        let container_id = match order.order.container_id {
            Some(c) => c,
            None => {
                return Ok(UnlinkOutcome::NotAllocated {
                    order_id: order_id.to_string(),
                })
            }
        };

        let guard = self.locks.lock(&container_id);
        let unlinked = self.repos.order_repo.unlink_order(order_id, &container_id)?;
        drop(guard);

        if !unlinked {
            return Ok(UnlinkOutcome::NotAllocated {
                order_id: order_id.to_string(),
            });
        }

        self.record(
            ActionLog::new(ActionType::ManualUnlink, config.actor_or_default(actor))
                .with_order(order_id)
                .with_container(Some(&container_id))
                .with_detail(format!("订单{}从{}解绑", order_id, container_id)),
        );
        Ok(UnlinkOutcome::Unlinked {
            order_id: order_id.to_string(),
            container_id,
        })
    }

    // ==========================================
    // 只读查询
    // ==========================================

    /// 校验台账一致性（只读，不做任何修正）
    #[instrument(skip(self))]
    pub fn validate(&self) -> RepositoryResult<ValidationReport> {
        let config = self.repos.config_manager.load_allocation_config()?;
        let extractor = RequirementExtractor::from_config(&config);
        let validator = AllocationValidator::from_config(&config);

        let containers = self.repos.container_repo.find_all()?;
        let capacity = self.repos.container_repo.capacity_all()?;
        let linked = self.repos.order_repo.find_linked()?;

        Ok(validator.validate(&containers, &capacity, &linked, &extractor))
    }

    /// 当前每个 (集装箱, 产品) 的总量/占用/剩余
    pub fn capacity_overview(&self) -> RepositoryResult<Vec<RemainingCapacity>> {
        let config = self.repos.config_manager.load_allocation_config()?;
        let extractor = RequirementExtractor::from_config(&config);

        let capacity = self.repos.container_repo.capacity_all()?;
        let linked = self.repos.order_repo.find_linked()?;
        Ok(InventorySnapshot::rebuild(&capacity, &linked, &extractor, None).entries())
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    fn require_order(&self, order_id: &str) -> RepositoryResult<OrderWithItems> {
        self.repos
            .order_repo
            .find_by_id(order_id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "Order".to_string(),
                id: order_id.to_string(),
            })
    }

    /// 订单当前关联的集装箱必须在已持有的锁集合内
    ///
    /// 读取与加锁之间订单可能被改关联到未加锁的集装箱
    fn ensure_covered(order: &OrderWithItems, lock_set: &ContainerLockSet) -> RepositoryResult<()> {
        match order.order.container_id.as_deref() {
            Some(container_id) if !lock_set.covers(container_id) => {
                Err(RepositoryError::ConcurrentModification(format!(
                    "订单{}关联状态在处理中发生变化，请重试",
                    order.order.order_id
                )))
            }
            _ => Ok(()),
        }
    }

    /// 按ID升序锁定全部可分配集装箱（以及 extra 指定的集装箱）
    fn lock_eligible(&self, extra: Option<&str>) -> RepositoryResult<ContainerLockSet> {
        let mut ids = self.repos.container_repo.find_eligible_ids()?;
        if let Some(id) = extra {
            ids.push(id.to_string());
        }
        Ok(self.locks.lock_all(ids.iter().map(String::as_str)))
    }

    /// 读取集装箱，丢弃加锁后新出现的可分配集装箱
    fn locked_containers(&self, lock_set: &ContainerLockSet) -> RepositoryResult<Vec<Container>> {
        let mut containers = self.repos.container_repo.find_all()?;
        containers.retain(|c| !c.is_eligible() || lock_set.covers(&c.container_id));
        Ok(containers)
    }

    /// 在 IMMEDIATE 写事务内复核容量并写入关联
    fn link_checked(
        &self,
        assignment: &Assignment,
        extractor: &RequirementExtractor,
    ) -> RepositoryResult<LinkOutcome> {
        self.repos.order_repo.link_order_if_fits(
            &assignment.order_id,
            &assignment.container_id,
            assignment.delivery_eta,
            |order, capacity, linked| {
                self.incremental
                    .fits(order, &assignment.container_id, capacity, linked, extractor)
            },
        )
    }

    /// 单个分配决定落库
    fn commit_link(
        &self,
        assignment: &Assignment,
        extractor: &RequirementExtractor,
    ) -> Result<(), SkipReason> {
        let order_id = assignment.order_id.as_str();
        let container_id = assignment.container_id.as_str();
        match self.link_checked(assignment, extractor) {
            Ok(LinkOutcome::Linked) => Ok(()),
            Ok(LinkOutcome::AlreadyLinked { .. }) => {
                warn!(order_id, "订单已被其他运行关联，跳过");
                Err(SkipReason::AlreadyAllocated)
            }
            Ok(LinkOutcome::OrderMissing) | Ok(LinkOutcome::NotActive) => {
                warn!(order_id, "订单在写入前已被删除或退款");
                Err(SkipReason::OrderRemoved)
            }
            Ok(LinkOutcome::ContainerUnavailable) => {
                warn!(order_id, container_id, "集装箱在写入前已不可分配");
                Err(SkipReason::ContainerUnavailable)
            }
            Ok(LinkOutcome::CapacityExhausted) => {
                // 其他进程已占用该容量；下一次批量运行会重新考虑此订单
                warn!(order_id, container_id, "写入前复核容量不足");
                Err(SkipReason::InsufficientStock)
            }
            Err(e) => {
                warn!(order_id, error = %e, "分配写入失败");
                Err(SkipReason::WriteFailed)
            }
        }
    }

    fn config_snapshot(&self) -> serde_json::Value {
        self.repos
            .config_manager
            .get_config_snapshot()
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or(serde_json::Value::Null)
    }

    /// 审计日志写入（失败只告警）
    fn record(&self, log: ActionLog) {
        if let Err(e) = self.repos.action_log_repo.insert(&log) {
            warn!(action_type = %log.action_type, error = %e, "审计日志写入失败");
        }
    }
}
