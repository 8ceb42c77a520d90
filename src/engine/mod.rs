// ==========================================
// 集装箱分配系统 - 引擎层
// ==========================================
// 职责: 实现分配规则引擎,不拼 SQL
// 红线: Engine 不拼 SQL, 每个未分配订单必须输出 reason
// ==========================================

pub mod container_locks;
pub mod fifo_allocator;
pub mod incremental;
pub mod inventory;
pub mod orchestrator;
pub mod reallocation;
pub mod repositories;
pub mod requirement;
pub mod validator;

// 重导出核心引擎
pub use container_locks::{ContainerGuard, ContainerLockRegistry, ContainerLockSet};
pub use fifo_allocator::FifoAllocator;
pub use incremental::IncrementalAllocator;
pub use inventory::InventorySnapshot;
pub use orchestrator::AllocationOrchestrator;
pub use reallocation::{ReallocationCoordinator, ReplayResult};
pub use repositories::AllocationRepositories;
pub use requirement::{OrderDemand, RequirementExtractor, Requirements};
pub use validator::{AllocationValidator, CapacityViolation, DanglingLink, ValidationReport};
