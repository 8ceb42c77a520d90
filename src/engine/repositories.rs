// ==========================================
// 集装箱分配系统 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合分配编排所需的所有 Repository
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::ConfigManager;
use crate::repository::{ActionLogRepository, ContainerRepository, OrderRepository};

/// 分配编排仓储集合
///
/// # 包含的仓储
/// - `container_repo`: 集装箱与容量（只读）
/// - `order_repo`: 订单、明细与关联写入
/// - `action_log_repo`: 分配审计日志
/// - `config_manager`: config_kv 配置
#[derive(Clone)]
pub struct AllocationRepositories {
    pub container_repo: Arc<ContainerRepository>,
    pub order_repo: Arc<OrderRepository>,
    pub action_log_repo: Arc<ActionLogRepository>,
    pub config_manager: Arc<ConfigManager>,
}

impl AllocationRepositories {
    /// 创建新的仓储集合
    pub fn new(
        container_repo: Arc<ContainerRepository>,
        order_repo: Arc<OrderRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        config_manager: Arc<ConfigManager>,
    ) -> Self {
        Self {
            container_repo,
            order_repo,
            action_log_repo,
            config_manager,
        }
    }

    /// 所有仓储共享同一连接
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self::new(
            Arc::new(ContainerRepository::new(conn.clone())),
            Arc::new(OrderRepository::new(conn.clone())),
            Arc::new(ActionLogRepository::new(conn.clone())),
            Arc::new(ConfigManager::from_connection(conn)),
        )
    }
}
