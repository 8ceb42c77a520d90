// ==========================================
// 集装箱分配系统 - 配置层
// ==========================================
// 职责: 分配配置管理（排除集合、校验报告上限、默认操作人）
// 存储: config_kv 表
// ==========================================

pub mod allocation_config;
pub mod config_manager;

// 重导出核心配置
pub use allocation_config::AllocationConfig;
pub use config_manager::{config_keys, ConfigManager};
