// ==========================================
// 集装箱分配系统 - 分配 API
// ==========================================
// 职责: 分配触发入口（批量/单订单/移除/退款/解绑/校验）
// 红线: 输入校验在 API 层完成，引擎只接收合法参数
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::api::error::{require_id, ApiError, ApiResult};
use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::action_log::ActionLog;
use crate::domain::allocation::{
    BatchAllocationReport, ReallocationReport, RefundOutcome, RemainingCapacity,
    SingleAllocationOutcome, UnlinkOutcome,
};
use crate::domain::order::LineItemRefund;
use crate::domain::types::RemovalKind;
use crate::engine::container_locks::ContainerLockRegistry;
use crate::engine::orchestrator::AllocationOrchestrator;
use crate::engine::repositories::AllocationRepositories;
use crate::engine::validator::ValidationReport;
use crate::repository::error::RepositoryError;

/// 审计日志查询条数上限
const MAX_LOG_LIMIT: usize = 500;

// ==========================================
// AllocationApi - 分配 API
// ==========================================

/// 分配API
///
/// 职责：
/// 1. 参数校验（空ID、非正退款数量）
/// 2. 调用编排器执行分配/移除/校验
/// 3. 仓储错误转换为 ApiError
pub struct AllocationApi {
    orchestrator: Arc<AllocationOrchestrator>,
}

impl AllocationApi {
    pub fn new(orchestrator: Arc<AllocationOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// 基于共享连接创建（新建锁注册表）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        let repos = AllocationRepositories::from_connection(conn);
        let locks = Arc::new(ContainerLockRegistry::new());
        Self::new(Arc::new(AllocationOrchestrator::new(repos, locks)))
    }

    /// 打开数据库文件并初始化 schema
    pub fn open(db_path: &str) -> ApiResult<Self> {
        let conn = open_sqlite_connection(db_path).map_err(RepositoryError::from)?;
        init_schema(&conn).map_err(RepositoryError::from)?;
        info!(db_path, "分配数据库已打开");
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    pub fn orchestrator(&self) -> &Arc<AllocationOrchestrator> {
        &self.orchestrator
    }

    // ==========================================
    // 分配触发
    // ==========================================

    /// 批量分配
    pub fn run_batch_allocation(&self, actor: Option<&str>) -> ApiResult<BatchAllocationReport> {
        Ok(self.orchestrator.run_batch(actor)?)
    }

    /// 单订单分配
    pub fn allocate_single_order(
        &self,
        order_id: &str,
        actor: Option<&str>,
    ) -> ApiResult<SingleAllocationOutcome> {
        let order_id = require_id("订单ID", order_id)?;
        Ok(self.orchestrator.allocate_single(order_id, actor)?)
    }

    // ==========================================
    // 移除与退款
    // ==========================================

    /// 移除订单并级联重分配
    pub fn remove_order_and_cascade(
        &self,
        order_id: &str,
        kind: RemovalKind,
        actor: Option<&str>,
    ) -> ApiResult<ReallocationReport> {
        let order_id = require_id("订单ID", order_id)?;
        if kind == RemovalKind::RefundedToEmpty {
            return Err(ApiError::InvalidInput(
                "refunded_to_empty 只能由部分退款触发".to_string(),
            ));
        }
        Ok(self.orchestrator.remove_order_and_cascade(order_id, kind, actor)?)
    }

    /// 删除订单
    pub fn delete_order(&self, order_id: &str, actor: Option<&str>) -> ApiResult<ReallocationReport> {
        self.remove_order_and_cascade(order_id, RemovalKind::Deleted, actor)
    }

    /// 全额退款
    pub fn refund_order(&self, order_id: &str, actor: Option<&str>) -> ApiResult<ReallocationReport> {
        self.remove_order_and_cascade(order_id, RemovalKind::FullRefund, actor)
    }

    /// 部分退款
    pub fn refund_line_items(
        &self,
        order_id: &str,
        refunds: &[LineItemRefund],
        actor: Option<&str>,
    ) -> ApiResult<RefundOutcome> {
        let order_id = require_id("订单ID", order_id)?;
        if refunds.is_empty() {
            return Err(ApiError::InvalidInput("退款明细不能为空".to_string()));
        }
        if let Some(bad) = refunds.iter().find(|r| r.quantity <= 0) {
            return Err(ApiError::InvalidInput(format!(
                "明细{}的退款数量必须为正: {}",
                bad.line_item_id, bad.quantity
            )));
        }
        debug!(order_id, refunds = refunds.len(), "部分退款请求");
        Ok(self.orchestrator.refund_line_items(order_id, refunds, actor)?)
    }

    /// 人工解绑（不级联）
    pub fn unlink_order(&self, order_id: &str, actor: Option<&str>) -> ApiResult<UnlinkOutcome> {
        let order_id = require_id("订单ID", order_id)?;
        Ok(self.orchestrator.unlink_order(order_id, actor)?)
    }

    // ==========================================
    // 查询接口
    // ==========================================

    /// 校验分配台账
    pub fn validate_allocation(&self) -> ApiResult<ValidationReport> {
        Ok(self.orchestrator.validate()?)
    }

    /// 容量概况
    pub fn capacity_overview(&self) -> ApiResult<Vec<RemainingCapacity>> {
        Ok(self.orchestrator.capacity_overview()?)
    }

    /// 最近的分配审计日志
    pub fn recent_allocation_logs(&self, limit: usize) -> ApiResult<Vec<ActionLog>> {
        if limit == 0 || limit > MAX_LOG_LIMIT {
            return Err(ApiError::InvalidInput(format!(
                "limit必须在1到{}之间: {}",
                MAX_LOG_LIMIT, limit
            )));
        }
        Ok(self
            .orchestrator
            .repositories()
            .action_log_repo
            .find_recent(limit)?)
    }

    /// 指定订单的分配审计日志
    pub fn allocation_logs_for_order(&self, order_id: &str) -> ApiResult<Vec<ActionLog>> {
        let order_id = require_id("订单ID", order_id)?;
        Ok(self
            .orchestrator
            .repositories()
            .action_log_repo
            .find_by_order(order_id)?)
    }
}
