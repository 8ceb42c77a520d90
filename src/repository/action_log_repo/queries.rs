use super::core::ActionLogRepository;
use crate::db::TIMESTAMP_FORMAT;
use crate::domain::action_log::ActionLog;
use crate::repository::error::{conversion_error, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Result as SqliteResult, Row};

impl ActionLogRepository {
    // ==========================================
    // 查询操作
    // ==========================================

    /// 查询最近的操作日志（时间倒序）
    pub fn find_recent(&self, limit: usize) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT action_id, action_type, action_ts, actor,
                   order_id, container_id, payload_json, detail
            FROM allocation_log
            ORDER BY action_ts DESC, rowid DESC
            LIMIT ?1
            "#,
        )?;

        let logs = stmt
            .query_map(params![limit as i64], |row| self.map_row(row))?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(logs)
    }

    /// 查询指定订单的操作日志（时间正序）
    ///
    /// 批量运行的日志不带 order_id，按 payload 中的订单ID匹配
    pub fn find_by_order(&self, order_id: &str) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;
        let json_token = format!("\"{}\"", order_id);

        let mut stmt = conn.prepare(
            r#"
            SELECT action_id, action_type, action_ts, actor,
                   order_id, container_id, payload_json, detail
            FROM allocation_log
            WHERE order_id = ?1
               OR (order_id IS NULL AND instr(COALESCE(payload_json, ''), ?2) > 0)
            ORDER BY action_ts ASC, rowid ASC
            "#,
        )?;

        let logs = stmt
            .query_map(params![order_id, json_token], |row| self.map_row(row))?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(logs)
    }

    /// 日志总数
    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM allocation_log", [], |row| row.get(0))?;
        Ok(count)
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    /// 映射数据库行到 ActionLog
    fn map_row(&self, row: &Row) -> SqliteResult<ActionLog> {
        let action_ts_str: String = row.get(2)?;
        let payload_json_str: Option<String> = row.get(6)?;

        let action_ts = NaiveDateTime::parse_from_str(&action_ts_str, TIMESTAMP_FORMAT)
            .map_err(|e| conversion_error(2, e))?;
        let payload_json = payload_json_str.and_then(|s| serde_json::from_str(&s).ok());

        Ok(ActionLog {
            action_id: row.get(0)?,
            action_type: row.get(1)?,
            action_ts,
            actor: row.get(3)?,
            order_id: row.get(4)?,
            container_id: row.get(5)?,
            payload_json,
            detail: row.get(7)?,
        })
    }
}
