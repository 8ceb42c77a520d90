// ==========================================
// 集装箱分配系统 - 集装箱与容量领域模型
// ==========================================
// 红线: 集装箱与容量条目由外部维护，分配核心只读
// ==========================================

use crate::domain::product::ProductKey;
use crate::domain::types::ContainerStatus;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ==========================================
// Container - 集装箱
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub container_id: String,    // 集装箱ID
    pub external_code: String,   // 外部箱号
    pub eta: Option<NaiveDate>,  // 预计到港日期（可为空）
    pub status: ContainerStatus, // 状态
}

impl Container {
    /// 是否可参与分配
    pub fn is_eligible(&self) -> bool {
        self.status.accepts_allocations()
    }

    /// 分配扫描顺序：ETA 升序，空 ETA 视为无穷大排在最后，同 ETA 按ID
    pub fn scan_order(&self, other: &Container) -> Ordering {
        match (self.eta, other.eta) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| self.container_id.cmp(&other.container_id))
    }
}

/// 筛选可用集装箱并按扫描顺序排序
pub fn eligible_in_scan_order(containers: &[Container]) -> Vec<Container> {
    let mut eligible: Vec<Container> = containers
        .iter()
        .filter(|c| c.is_eligible())
        .cloned()
        .collect();
    eligible.sort_by(|a, b| a.scan_order(b));
    eligible
}

// ==========================================
// CapacityEntry - 容量条目
// ==========================================
// (container_id, product_key) → total_quantity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityEntry {
    pub container_id: String,
    pub product_name: String,   // 原始产品名称
    pub product_key: ProductKey, // 规范化产品键
    pub total_quantity: i64,    // 申报容量
}

impl CapacityEntry {
    pub fn new(container_id: &str, product_name: &str, total_quantity: i64) -> Self {
        Self {
            container_id: container_id.to_string(),
            product_name: product_name.to_string(),
            product_key: ProductKey::new(product_name),
            total_quantity,
        }
    }
}
