// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、测试数据生成等功能
// ==========================================
#![allow(dead_code)]

use chrono::NaiveDate;
use container_alloc::db::{configure_sqlite_connection, init_schema};
use container_alloc::domain::order::Order;
use container_alloc::domain::types::OrderState;
use container_alloc::repository::OrderRepository;
use container_alloc::AllocationApi;
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = Connection::open(&db_path)?;
    configure_sqlite_connection(&conn)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 打开共享连接
pub fn open_shared(db_path: &str) -> Arc<Mutex<Connection>> {
    let conn = Connection::open(db_path).unwrap();
    configure_sqlite_connection(&conn).unwrap();
    Arc::new(Mutex::new(conn))
}

/// 创建测试环境：临时库 + 共享连接 + API
pub fn setup_api() -> (NamedTempFile, Arc<Mutex<Connection>>, AllocationApi) {
    let (temp_file, db_path) = create_test_db().unwrap();
    let conn = open_shared(&db_path);
    let api = AllocationApi::from_connection(conn.clone());
    (temp_file, conn, api)
}

// ==========================================
// 测试数据
// ==========================================

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// 插入集装箱（eta 形如 "2026-01-10"）
pub fn insert_container(conn: &Arc<Mutex<Connection>>, container_id: &str, eta: Option<&str>, status: &str) {
    conn.lock()
        .unwrap()
        .execute(
            "INSERT INTO container (container_id, external_code, eta, status) VALUES (?1, ?2, ?3, ?4)",
            params![container_id, format!("BOX-{}", container_id), eta, status],
        )
        .unwrap();
}

/// 插入容量条目
pub fn insert_capacity(conn: &Arc<Mutex<Connection>>, container_id: &str, product_name: &str, qty: i64) {
    conn.lock()
        .unwrap()
        .execute(
            "INSERT INTO capacity_entry (container_id, product_name, total_quantity) VALUES (?1, ?2, ?3)",
            params![container_id, product_name, qty],
        )
        .unwrap();
}

/// 插入未分配订单（created_at = 2026-01-01 08:00 + minute 分钟）
///
/// # 返回
/// 明细ID
pub fn insert_order(
    conn: &Arc<Mutex<Connection>>,
    order_id: &str,
    minute: u32,
    items: &[(&str, i64)],
) -> Vec<i64> {
    let repo = OrderRepository::new(conn.clone());
    let seq = repo.next_arrival_seq().unwrap();
    let created_at = date(2026, 1, 1).and_hms_opt(8, 0, 0).unwrap()
        + chrono::Duration::minutes(minute as i64);
    let order = Order {
        order_id: order_id.to_string(),
        external_number: format!("#{}", order_id),
        created_at,
        arrival_seq: seq,
        container_id: None,
        delivery_eta: None,
        state: OrderState::Active,
    };
    repo.insert_order(&order, items).unwrap()
}

/// 查询订单当前关联的集装箱
pub fn container_of(conn: &Arc<Mutex<Connection>>, order_id: &str) -> Option<String> {
    conn.lock()
        .unwrap()
        .query_row(
            "SELECT container_id FROM customer_order WHERE order_id = ?1",
            params![order_id],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()
        .unwrap()
        .flatten()
}

/// 人工修改（绕过分配核心）
pub fn execute_sql(conn: &Arc<Mutex<Connection>>, sql: &str) {
    conn.lock().unwrap().execute_batch(sql).unwrap();
}
