// ==========================================
// 集装箱分配系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::allocation_config::AllocationConfig;
use crate::db::open_sqlite_connection;
use crate::domain::product::ProductKey;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// 配置键
pub mod config_keys {
    /// JSON 数组: 不占箱位的产品名称
    pub const EXCLUDED_PRODUCT_KEYS: &str = "allocation/excluded_product_keys";
    /// 整数: 校验报告每条超配最多列出的订单数
    pub const VALIDATOR_MAX_ORDER_IDS: &str = "allocation/validator_max_order_ids";
    /// 字符串: 默认操作人
    pub const DEFAULT_ACTOR: &str = "allocation/default_actor";
}

const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![GLOBAL_SCOPE, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![GLOBAL_SCOPE, key, value],
        )?;
        Ok(())
    }

    /// 设置不占箱位的产品集合
    pub fn set_excluded_products(&self, product_names: &[&str]) -> RepositoryResult<()> {
        let value = serde_json::to_string(product_names)
            .map_err(|e| anyhow::Error::new(e).context("排除产品列表序列化失败"))?;
        self.set_global_config_value(config_keys::EXCLUDED_PRODUCT_KEYS, &value)
    }

    /// 加载分配配置
    ///
    /// 配置缺失或格式错误时回退默认值（格式错误记录告警）
    pub fn load_allocation_config(&self) -> RepositoryResult<AllocationConfig> {
        let mut config = AllocationConfig::default();

        if let Some(raw) = self.get_global_config_value(config_keys::EXCLUDED_PRODUCT_KEYS)? {
            match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(names) => {
                    let mut keys: Vec<ProductKey> = names
                        .iter()
                        .map(|n| ProductKey::new(n))
                        .filter(|k| !k.is_empty())
                        .collect();
                    keys.sort();
                    keys.dedup();
                    config.excluded_product_keys = keys;
                }
                Err(e) => warn!(key = config_keys::EXCLUDED_PRODUCT_KEYS, error = %e, "配置格式错误，使用默认值"),
            }
        }

        if let Some(raw) = self.get_global_config_value(config_keys::VALIDATOR_MAX_ORDER_IDS)? {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.validator_max_order_ids = n,
                _ => warn!(key = config_keys::VALIDATOR_MAX_ORDER_IDS, value = %raw, "配置格式错误，使用默认值"),
            }
        }

        if let Some(raw) = self.get_global_config_value(config_keys::DEFAULT_ACTOR)? {
            let actor = raw.trim();
            if !actor.is_empty() {
                config.default_actor = actor.to_string();
            }
        }

        Ok(config)
    }

    /// 获取所有配置的快照（JSON格式），随审计日志记录
    pub fn get_config_snapshot(&self) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map(params![GLOBAL_SCOPE], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(json!(config_map).to_string())
    }
}
