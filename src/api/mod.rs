// ==========================================
// 集装箱分配系统 - API 层
// ==========================================
// 职责: 对外暴露分配触发与查询接口
// ==========================================

pub mod allocation_api;
pub mod error;

// 重导出
pub use allocation_api::AllocationApi;
pub use error::{ApiError, ApiResult};
