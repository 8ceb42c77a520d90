// ==========================================
// 集装箱分配系统 - 产品键
// ==========================================
// 产品键 = 规范化后的产品名称（去首尾空白 + 小写）
// 不同导入渠道的产品标识不一致，统一按名称匹配容量与需求
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// 规范化产品名称
///
/// 纯函数，所有 join 点（订单明细、容量条目、排除集合）统一使用
pub fn normalize_product_name(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// 规范化后的产品键
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductKey(String);

impl ProductKey {
    /// 从原始产品名称构造（自动规范化）
    pub fn new(raw: &str) -> Self {
        Self(normalize_product_name(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}
