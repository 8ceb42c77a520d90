// ==========================================
// 集装箱分配系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、分配结果
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod allocation;
pub mod container;
pub mod order;
pub mod product;
pub mod types;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use allocation::{
    Assignment, BatchAllocationReport, ReallocationReport, RefundOutcome, RemainingCapacity,
    SingleAllocationOutcome, SkippedOrder, UnlinkOutcome,
};
pub use container::{eligible_in_scan_order, CapacityEntry, Container};
pub use order::{sort_fifo, LineItemRefund, Order, OrderLineItem, OrderWithItems};
pub use product::{normalize_product_name, ProductKey};
pub use types::{ContainerStatus, OrderState, RemovalKind, SkipReason};
