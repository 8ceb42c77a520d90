// ==========================================
// 集装箱分配系统 - 集装箱/容量数据仓储
// ==========================================
// 红线: 集装箱与容量条目由外部维护，本仓储只读
// ==========================================

use crate::db::DATE_FORMAT;
use crate::domain::container::{CapacityEntry, Container};
use crate::domain::types::ContainerStatus;
use crate::repository::error::{conversion_error, RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// ContainerRepository - 集装箱仓储
// ==========================================
pub struct ContainerRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ContainerRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 集装箱查询
    // ==========================================

    /// 查询全部集装箱（按ID排序，扫描顺序由引擎决定）
    pub fn find_all(&self) -> RepositoryResult<Vec<Container>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT container_id, external_code, eta, status FROM container ORDER BY container_id",
        )?;
        let containers = stmt
            .query_map([], map_container)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(containers)
    }

    /// 按ID查询集装箱
    pub fn find_by_id(&self, container_id: &str) -> RepositoryResult<Option<Container>> {
        let conn = self.get_conn()?;
        Ok(load_container(&conn, container_id)?)
    }

    /// 查询可接受分配的集装箱ID（未交付）
    pub fn find_eligible_ids(&self) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT container_id FROM container WHERE status <> ?1 ORDER BY container_id",
        )?;
        let ids = stmt
            .query_map(params![ContainerStatus::Delivered.as_str()], |row| row.get(0))?
            .collect::<SqliteResult<Vec<String>>>()?;
        Ok(ids)
    }

    // ==========================================
    // 容量查询
    // ==========================================

    /// 查询全部容量条目
    pub fn capacity_all(&self) -> RepositoryResult<Vec<CapacityEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT container_id, product_name, total_quantity
            FROM capacity_entry
            ORDER BY container_id, product_name
            "#,
        )?;
        let entries = stmt
            .query_map([], map_capacity)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }

    /// 查询单个集装箱的容量条目
    pub fn capacity_for(&self, container_id: &str) -> RepositoryResult<Vec<CapacityEntry>> {
        let conn = self.get_conn()?;
        Ok(load_capacity_for(&conn, container_id)?)
    }
}

// ==========================================
// 连接级查询（供订单仓储在写事务内复用）
// ==========================================

pub(crate) fn load_container(conn: &Connection, container_id: &str) -> SqliteResult<Option<Container>> {
    conn.query_row(
        "SELECT container_id, external_code, eta, status FROM container WHERE container_id = ?1",
        params![container_id],
        map_container,
    )
    .optional()
}

pub(crate) fn load_capacity_for(conn: &Connection, container_id: &str) -> SqliteResult<Vec<CapacityEntry>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT container_id, product_name, total_quantity
        FROM capacity_entry
        WHERE container_id = ?1
        ORDER BY product_name
        "#,
    )?;
    let entries = stmt
        .query_map(params![container_id], map_capacity)?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(entries)
}

fn map_container(row: &Row) -> SqliteResult<Container> {
    let eta_str: Option<String> = row.get(2)?;
    let status_str: String = row.get(3)?;

    let eta = eta_str
        .map(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_error(2, e)))
        .transpose()?;
    let status = status_str
        .parse::<ContainerStatus>()
        .map_err(|e| conversion_error(3, e))?;

    Ok(Container {
        container_id: row.get(0)?,
        external_code: row.get(1)?,
        eta,
        status,
    })
}

fn map_capacity(row: &Row) -> SqliteResult<CapacityEntry> {
    let container_id: String = row.get(0)?;
    let product_name: String = row.get(1)?;
    let total_quantity: i64 = row.get(2)?;
    Ok(CapacityEntry::new(&container_id, &product_name, total_quantity))
}

// ==========================================
// 测试模块
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::ProductKey;

    fn setup() -> ContainerRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO container VALUES ('C1', 'MSKU001', '2026-01-10', 'in_transit');
            INSERT INTO container VALUES ('C2', 'MSKU002', NULL, 'pending');
            INSERT INTO container VALUES ('C3', 'MSKU003', '2026-01-01', 'delivered');
            INSERT INTO capacity_entry VALUES ('C1', 'Sofa', 5);
            INSERT INTO capacity_entry VALUES ('C1', 'Chair', 2);
            INSERT INTO capacity_entry VALUES ('C2', 'sofa', 10);
            "#,
        )
        .unwrap();
        ContainerRepository::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_find_all_parses_columns() {
        let repo = setup();
        let containers = repo.find_all().unwrap();
        assert_eq!(containers.len(), 3);
        assert_eq!(containers[0].eta, NaiveDate::from_ymd_opt(2026, 1, 10));
        assert_eq!(containers[0].status, ContainerStatus::InTransit);
        assert_eq!(containers[1].eta, None);

        let c3 = repo.find_by_id("C3").unwrap().unwrap();
        assert_eq!(c3.status, ContainerStatus::Delivered);
        assert!(repo.find_by_id("C9").unwrap().is_none());
    }

    #[test]
    fn test_eligible_ids_exclude_delivered() {
        let repo = setup();
        assert_eq!(repo.find_eligible_ids().unwrap(), vec!["C1", "C2"]);
    }

    #[test]
    fn test_capacity_keys_are_normalized() {
        let repo = setup();
        let c1 = repo.capacity_for("C1").unwrap();
        assert_eq!(c1.len(), 2);
        assert!(c1.iter().any(|e| e.product_key == ProductKey::new("sofa") && e.total_quantity == 5));
        assert_eq!(repo.capacity_all().unwrap().len(), 3);
    }
}
