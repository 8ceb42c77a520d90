// ==========================================
// 集装箱分配系统 - 分配操作日志领域模型
// ==========================================
// 红线: 所有分配写入必须记录
// 对齐: allocation_log 表
// ==========================================

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

// ==========================================
// ActionLog - 操作日志
// ==========================================
// 用途: 审计追踪，分配变更回溯
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    // ===== 主键 =====
    pub action_id: String,        // 日志ID (uuid)
    pub action_type: String,      // 操作类型 (存储为字符串)
    pub action_ts: NaiveDateTime, // 操作时间戳
    pub actor: String,            // 操作人

    // ===== 关联对象 =====
    pub order_id: Option<String>,     // 关联订单（批量操作为None）
    pub container_id: Option<String>, // 关联集装箱

    // ===== 操作负载 =====
    pub payload_json: Option<JsonValue>, // 分配差异/跳过汇总 (JSON)
    pub detail: Option<String>,          // 详细描述
}

impl ActionLog {
    /// 以当前时间创建一条日志
    pub fn new(action_type: ActionType, actor: &str) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            action_type: action_type.to_string(),
            action_ts: Utc::now().naive_utc(),
            actor: actor.to_string(),
            order_id: None,
            container_id: None,
            payload_json: None,
            detail: None,
        }
    }

    pub fn with_order(mut self, order_id: &str) -> Self {
        self.order_id = Some(order_id.to_string());
        self
    }

    pub fn with_container(mut self, container_id: Option<&str>) -> Self {
        self.container_id = container_id.map(|c| c.to_string());
        self
    }

    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload_json = Some(payload);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ==========================================
// ActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    BatchAllocate,  // 批量分配
    AllocateSingle, // 单订单分配
    RemoveOrder,    // 删除/退款移除 + 级联重分配
    PartialRefund,  // 部分退款
    ManualUnlink,   // 人工解绑
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::BatchAllocate => write!(f, "BATCH_ALLOCATE"),
            ActionType::AllocateSingle => write!(f, "ALLOCATE_SINGLE"),
            ActionType::RemoveOrder => write!(f, "REMOVE_ORDER"),
            ActionType::PartialRefund => write!(f, "PARTIAL_REFUND"),
            ActionType::ManualUnlink => write!(f, "MANUAL_UNLINK"),
        }
    }
}
