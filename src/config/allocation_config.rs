// ==========================================
// 集装箱分配系统 - 分配配置
// ==========================================

use crate::domain::product::ProductKey;
use serde::{Deserialize, Serialize};

/// 默认：校验报告中每条超配最多列出的订单数
pub const DEFAULT_VALIDATOR_MAX_ORDER_IDS: usize = 20;

/// 默认操作人
pub const DEFAULT_ACTOR: &str = "system";

/// 分配运行配置（每次运行开始时从 config_kv 读取）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// 不占用集装箱空间的产品（已规范化）
    pub excluded_product_keys: Vec<ProductKey>,
    pub validator_max_order_ids: usize,
    pub default_actor: String,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            excluded_product_keys: Vec::new(),
            validator_max_order_ids: DEFAULT_VALIDATOR_MAX_ORDER_IDS,
            default_actor: DEFAULT_ACTOR.to_string(),
        }
    }
}

impl AllocationConfig {
    /// 调用方未指定操作人时使用默认值
    pub fn actor_or_default<'a>(&'a self, actor: Option<&'a str>) -> &'a str {
        actor
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(self.default_actor.as_str())
    }
}
