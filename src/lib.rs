// ==========================================
// 集装箱分配系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 订单 → 集装箱 的库存约束 FIFO 分配核心
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 分配规则
pub mod engine;

// 配置层 - 分配配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 分配接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ContainerStatus, OrderState, RemovalKind, SkipReason};

// 领域实体
pub use domain::{
    ActionLog, ActionType, Assignment, BatchAllocationReport, CapacityEntry, Container,
    LineItemRefund, Order, OrderLineItem, OrderWithItems, ProductKey, ReallocationReport,
    RefundOutcome, RemainingCapacity, SingleAllocationOutcome, SkippedOrder, UnlinkOutcome,
};

// 引擎
pub use engine::{
    AllocationOrchestrator, AllocationValidator, FifoAllocator, IncrementalAllocator,
    InventorySnapshot, ReallocationCoordinator, RequirementExtractor, ValidationReport,
};

// API
pub use api::{AllocationApi, ApiError, ApiResult};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "集装箱分配系统";
