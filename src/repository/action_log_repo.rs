// ==========================================
// 集装箱分配系统 - 分配操作日志数据仓储
// ==========================================
// 对齐: allocation_log 表
// 红线: 所有分配写入必须记录
// ==========================================

mod core;
mod queries;


pub use self::core::ActionLogRepository;
