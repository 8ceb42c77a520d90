// ==========================================
// 集装箱分配系统 - 领域类型定义
// ==========================================
// 序列化格式: snake_case (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 集装箱状态 (Container Status)
// ==========================================
// 红线: DELIVERED 的集装箱不再接受新分配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    Pending,   // 待发运
    InTransit, // 运输中
    Arrived,   // 已到港
    Delayed,   // 延误
    Delivered, // 已交付（关闭）
}

impl ContainerStatus {
    /// 是否仍可接受新的订单分配
    pub fn accepts_allocations(&self) -> bool {
        !matches!(self, ContainerStatus::Delivered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Pending => "pending",
            ContainerStatus::InTransit => "in_transit",
            ContainerStatus::Arrived => "arrived",
            ContainerStatus::Delayed => "delayed",
            ContainerStatus::Delivered => "delivered",
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ContainerStatus::Pending),
            "in_transit" => Ok(ContainerStatus::InTransit),
            "arrived" => Ok(ContainerStatus::Arrived),
            "delayed" => Ok(ContainerStatus::Delayed),
            "delivered" => Ok(ContainerStatus::Delivered),
            other => Err(format!("未知的集装箱状态: {}", other)),
        }
    }
}

// ==========================================
// 订单状态 (Order State)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Active,   // 有效订单
    Refunded, // 已全额退款（不再参与分配）
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Active => "active",
            OrderState::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(OrderState::Active),
            "refunded" => Ok(OrderState::Refunded),
            other => Err(format!("未知的订单状态: {}", other)),
        }
    }
}

// ==========================================
// 跳过原因 (Skip Reason)
// ==========================================
// 红线: 每个未分配订单都必须输出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// 订单没有占用集装箱空间的明细
    NoItems,
    /// 没有任何可用集装箱能同时满足全部需求
    InsufficientStock,
    /// 没有可用集装箱（全部已交付或不存在）
    ContainerUnavailable,
    /// 写入时发现订单已被其他分配占用
    AlreadyAllocated,
    /// 分配结果写入失败
    WriteFailed,
    /// 决策与写入之间订单被删除或退款
    OrderRemoved,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoItems => "no_items",
            SkipReason::InsufficientStock => "insufficient_stock",
            SkipReason::ContainerUnavailable => "container_unavailable",
            SkipReason::AlreadyAllocated => "already_allocated",
            SkipReason::WriteFailed => "write_failed",
            SkipReason::OrderRemoved => "order_removed",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 订单移除方式 (Removal Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalKind {
    /// 人工删除：订单及明细物理删除
    Deleted,
    /// 全额退款：订单保留，标记为 refunded
    FullRefund,
    /// 部分退款后不再含有占用空间的明细：订单保留，仅解绑
    RefundedToEmpty,
}

impl RemovalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalKind::Deleted => "deleted",
            RemovalKind::FullRefund => "full_refund",
            RemovalKind::RefundedToEmpty => "refunded_to_empty",
        }
    }
}

impl fmt::Display for RemovalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
