// ==========================================
// 集装箱分配系统 - 订单数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑,只做数据映射
// 红线: container_id 写入带条件（WHERE container_id IS NULL），一个订单不会被重复关联
// 红线: 关联写入在 IMMEDIATE 事务内复核容量，跨进程也不会超配
// ==========================================

use crate::db::{DATE_FORMAT, TIMESTAMP_FORMAT};
use crate::domain::order::{LineItemRefund, Order, OrderLineItem, OrderWithItems};
use crate::domain::types::{OrderState, RemovalKind};
use crate::domain::container::CapacityEntry;
use crate::repository::container_repo::{load_capacity_for, load_container};
use crate::repository::error::{conversion_error, RepositoryError, RepositoryResult};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{
    params, Connection, OptionalExtension, Result as SqliteResult, Row, ToSql, TransactionBehavior,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const ORDER_COLUMNS: &str =
    "order_id, external_number, created_at, arrival_seq, container_id, delivery_eta, state";

/// 条件关联的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    /// 订单已关联（可能是其他运行写入的）
    AlreadyLinked { container_id: String },
    /// 订单已退款
    NotActive,
    /// 订单已被删除
    OrderMissing,
    /// 集装箱不存在或已交付
    ContainerUnavailable,
    /// 复核时容量已不足
    CapacityExhausted,
}

/// 部分退款落库结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedRefund {
    pub removed_line_items: Vec<i64>,
    pub reduced_line_items: Vec<i64>,
}

// ==========================================
// OrderRepository - 订单仓储
// ==========================================
pub struct OrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OrderRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作（上游导入）
    // ==========================================

    /// 下一个入库序号
    pub fn next_arrival_seq(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let seq: i64 = conn.query_row(
            "SELECT COALESCE(MAX(arrival_seq), 0) + 1 FROM customer_order",
            [],
            |row| row.get(0),
        )?;
        Ok(seq)
    }

    /// 插入订单及明细（单事务）
    ///
    /// # 返回
    /// 明细ID（与 `line_items` 次序一致）
    pub fn insert_order(&self, order: &Order, line_items: &[(&str, i64)]) -> RepositoryResult<Vec<i64>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            &format!("INSERT INTO customer_order ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)", ORDER_COLUMNS),
            params![
                order.order_id,
                order.external_number,
                order.created_at.format(TIMESTAMP_FORMAT).to_string(),
                order.arrival_seq,
                order.container_id,
                order.delivery_eta.map(|d| d.format(DATE_FORMAT).to_string()),
                order.state.as_str(),
            ],
        )?;

        let mut ids = Vec::with_capacity(line_items.len());
        for (product_name, quantity) in line_items {
            tx.execute(
                "INSERT INTO order_line_item (order_id, product_name, quantity) VALUES (?1, ?2, ?3)",
                params![order.order_id, product_name, quantity],
            )?;
            ids.push(tx.last_insert_rowid());
        }

        tx.commit()?;
        Ok(ids)
    }

    // ==========================================
    // 查询操作
    // ==========================================

    /// 按ID查询订单及明细
    pub fn find_by_id(&self, order_id: &str) -> RepositoryResult<Option<OrderWithItems>> {
        let conn = self.get_conn()?;
        let mut orders = load_orders(&conn, "order_id = ?1", &[&order_id as &dyn ToSql])?;
        Ok(orders.pop())
    }

    /// 查询全部订单
    pub fn find_all(&self) -> RepositoryResult<Vec<OrderWithItems>> {
        let conn = self.get_conn()?;
        Ok(load_orders(&conn, "1 = 1", &[])?)
    }

    /// 查询待分配订单（有效且未关联集装箱）
    pub fn find_unallocated_active(&self) -> RepositoryResult<Vec<OrderWithItems>> {
        let conn = self.get_conn()?;
        Ok(load_orders(
            &conn,
            "state = ?1 AND container_id IS NULL",
            &[&OrderState::Active.as_str() as &dyn ToSql],
        )?)
    }

    /// 查询全部已关联集装箱的订单（不区分状态，台账按实际关联计算占用）
    pub fn find_linked(&self) -> RepositoryResult<Vec<OrderWithItems>> {
        let conn = self.get_conn()?;
        Ok(load_orders(&conn, "container_id IS NOT NULL", &[])?)
    }

    /// 查询关联到指定集装箱的订单
    pub fn find_linked_to(&self, container_id: &str) -> RepositoryResult<Vec<OrderWithItems>> {
        let conn = self.get_conn()?;
        Ok(load_orders(&conn, "container_id = ?1", &[&container_id as &dyn ToSql])?)
    }

    // ==========================================
    // 分配写入
    // ==========================================

    /// 在写事务内复核容量后关联订单到集装箱
    ///
    /// `BEGIN IMMEDIATE` 先取得库级写锁，再读取订单、集装箱、容量和该集装箱的已关联订单，
    /// 交给 `fits` 判断后写入。共享同一数据库文件的多个进程由此串行，
    /// 任何一方都只能看到其他方已提交的关联。
    ///
    /// # 参数
    /// - `fits(order, capacity, linked)`: 容量判断（由引擎提供），`linked` 不含本订单
    pub fn link_order_if_fits<F>(
        &self,
        order_id: &str,
        container_id: &str,
        delivery_eta: Option<NaiveDate>,
        fits: F,
    ) -> RepositoryResult<LinkOutcome>
    where
        F: FnOnce(&OrderWithItems, &[CapacityEntry], &[OrderWithItems]) -> bool,
    {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let order = match load_orders(&tx, "order_id = ?1", &[&order_id as &dyn ToSql])?.pop() {
            Some(o) => o,
            None => return Ok(LinkOutcome::OrderMissing),
        };
        if let Some(current) = order.order.container_id.clone() {
            return Ok(LinkOutcome::AlreadyLinked { container_id: current });
        }
        if !order.order.is_active() {
            return Ok(LinkOutcome::NotActive);
        }
        match load_container(&tx, container_id)? {
            Some(c) if c.is_eligible() => {}
            _ => return Ok(LinkOutcome::ContainerUnavailable),
        }

        let capacity = load_capacity_for(&tx, container_id)?;
        let linked = load_orders(&tx, "container_id = ?1", &[&container_id as &dyn ToSql])?;
        if !fits(&order, &capacity, &linked) {
            return Ok(LinkOutcome::CapacityExhausted);
        }

        tx.execute(
            r#"
            UPDATE customer_order
            SET container_id = ?2, delivery_eta = ?3
            WHERE order_id = ?1 AND container_id IS NULL AND state = ?4
            "#,
            params![
                order_id,
                container_id,
                delivery_eta.map(|d| d.format(DATE_FORMAT).to_string()),
                OrderState::Active.as_str(),
            ],
        )?;
        tx.commit()?;
        Ok(LinkOutcome::Linked)
    }

    /// 解绑订单（仅当仍关联在 `container_id`）
    pub fn unlink_order(&self, order_id: &str, container_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE customer_order
            SET container_id = NULL, delivery_eta = NULL
            WHERE order_id = ?1 AND container_id = ?2
            "#,
            params![order_id, container_id],
        )?;
        Ok(rows == 1)
    }

    /// 移除订单并解绑级联工作列表（单事务）
    ///
    /// - Deleted: 删除订单及明细
    /// - FullRefund: 标记 refunded 并解绑
    /// - RefundedToEmpty: 仅解绑（明细已由退款移除）
    pub fn remove_and_unlink(
        &self,
        order_id: &str,
        kind: RemovalKind,
        unlink_order_ids: &[String],
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let rows = match kind {
            RemovalKind::Deleted => {
                tx.execute("DELETE FROM order_line_item WHERE order_id = ?1", params![order_id])?;
                tx.execute("DELETE FROM customer_order WHERE order_id = ?1", params![order_id])?
            }
            RemovalKind::FullRefund => tx.execute(
                r#"
                UPDATE customer_order
                SET state = ?2, container_id = NULL, delivery_eta = NULL
                WHERE order_id = ?1
                "#,
                params![order_id, OrderState::Refunded.as_str()],
            )?,
            RemovalKind::RefundedToEmpty => tx.execute(
                "UPDATE customer_order SET container_id = NULL, delivery_eta = NULL WHERE order_id = ?1",
                params![order_id],
            )?,
        };
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Order".to_string(),
                id: order_id.to_string(),
            });
        }

        for id in unlink_order_ids {
            tx.execute(
                "UPDATE customer_order SET container_id = NULL, delivery_eta = NULL WHERE order_id = ?1",
                params![id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// 按明细退款（单事务）
    ///
    /// 退款数量 ≥ 当前数量的明细被删除，其余减少数量
    pub fn apply_line_item_refunds(
        &self,
        order_id: &str,
        refunds: &[LineItemRefund],
    ) -> RepositoryResult<AppliedRefund> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut applied = AppliedRefund::default();

        for refund in refunds {
            if refund.quantity <= 0 {
                return Err(RepositoryError::FieldValueError {
                    field: "quantity".to_string(),
                    message: format!("line_item_id={} 退款数量必须为正: {}", refund.line_item_id, refund.quantity),
                });
            }

            let current: Option<i64> = tx
                .query_row(
                    "SELECT quantity FROM order_line_item WHERE line_item_id = ?1 AND order_id = ?2",
                    params![refund.line_item_id, order_id],
                    |row| row.get(0),
                )
                .optional()?;
            let current = current.ok_or_else(|| RepositoryError::NotFound {
                entity: "OrderLineItem".to_string(),
                id: refund.line_item_id.to_string(),
            })?;

            if refund.quantity >= current {
                tx.execute(
                    "DELETE FROM order_line_item WHERE line_item_id = ?1",
                    params![refund.line_item_id],
                )?;
                applied.removed_line_items.push(refund.line_item_id);
            } else {
                tx.execute(
                    "UPDATE order_line_item SET quantity = quantity - ?2 WHERE line_item_id = ?1",
                    params![refund.line_item_id, refund.quantity],
                )?;
                applied.reduced_line_items.push(refund.line_item_id);
            }
        }

        tx.commit()?;
        Ok(applied)
    }
}

// ==========================================
// 行映射
// ==========================================

/// 按条件加载订单及明细
///
/// `filter` 只接受本模块内的常量条件，参数通过 `params` 绑定
fn load_orders(
    conn: &Connection,
    filter: &str,
    params: &[&dyn ToSql],
) -> SqliteResult<Vec<OrderWithItems>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM customer_order WHERE {} ORDER BY created_at, arrival_seq, order_id",
        ORDER_COLUMNS, filter
    ))?;
    let orders = stmt
        .query_map(params, map_order)?
        .collect::<SqliteResult<Vec<_>>>()?;

    let mut item_stmt = conn.prepare(&format!(
        r#"
        SELECT line_item_id, order_id, product_name, quantity
        FROM order_line_item
        WHERE order_id IN (SELECT order_id FROM customer_order WHERE {})
        ORDER BY order_id, line_item_id
        "#,
        filter
    ))?;
    let mut items_by_order: HashMap<String, Vec<OrderLineItem>> = HashMap::new();
    let items = item_stmt.query_map(params, map_line_item)?;
    for item in items {
        let item = item?;
        items_by_order.entry(item.order_id.clone()).or_default().push(item);
    }

    Ok(orders
        .into_iter()
        .map(|order| {
            let line_items = items_by_order.remove(&order.order_id).unwrap_or_default();
            OrderWithItems { order, line_items }
        })
        .collect())
}

fn map_order(row: &Row) -> SqliteResult<Order> {
    let created_at_str: String = row.get(2)?;
    let delivery_eta_str: Option<String> = row.get(5)?;
    let state_str: String = row.get(6)?;

    let created_at = NaiveDateTime::parse_from_str(&created_at_str, TIMESTAMP_FORMAT)
        .map_err(|e| conversion_error(2, e))?;
    let delivery_eta = delivery_eta_str
        .map(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_error(5, e)))
        .transpose()?;
    let state = state_str.parse::<OrderState>().map_err(|e| conversion_error(6, e))?;

    Ok(Order {
        order_id: row.get(0)?,
        external_number: row.get(1)?,
        created_at,
        arrival_seq: row.get(3)?,
        container_id: row.get(4)?,
        delivery_eta,
        state,
    })
}

fn map_line_item(row: &Row) -> SqliteResult<OrderLineItem> {
    let line_item_id: i64 = row.get(0)?;
    let order_id: String = row.get(1)?;
    let product_name: String = row.get(2)?;
    let quantity: i64 = row.get(3)?;
    Ok(OrderLineItem::new(line_item_id, &order_id, &product_name, quantity))
}

// ==========================================
// 测试模块
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> OrderRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO container VALUES ('C1', 'BOX-1', '2026-02-01', 'pending');
            INSERT INTO container VALUES ('C2', 'BOX-2', NULL, 'pending');
            INSERT INTO container VALUES ('D1', 'BOX-D', '2025-12-01', 'delivered');
            INSERT INTO capacity_entry VALUES ('C1', 'sofa', 2);
            "#,
        )
        .unwrap();
        OrderRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn always(_: &OrderWithItems, _: &[CapacityEntry], _: &[OrderWithItems]) -> bool {
        true
    }

    fn make_order(id: &str, seq: i64) -> Order {
        Order {
            order_id: id.to_string(),
            external_number: format!("#{}", id),
            created_at: NaiveDate::from_ymd_opt(2026, 1, 1)
                .unwrap()
                .and_hms_milli_opt(9, 30, 0, 250)
                .unwrap(),
            arrival_seq: seq,
            container_id: None,
            delivery_eta: None,
            state: OrderState::Active,
        }
    }

    #[test]
    fn test_insert_and_find_by_id() {
        let repo = setup();
        let ids = repo
            .insert_order(&make_order("O1", 1), &[("Sofa", 2), ("Assembly", 1)])
            .unwrap();
        assert_eq!(ids.len(), 2);

        let loaded = repo.find_by_id("O1").unwrap().unwrap();
        assert_eq!(loaded.order, make_order("O1", 1));
        assert_eq!(loaded.line_items.len(), 2);
        assert_eq!(loaded.line_items[0].product_key.as_str(), "sofa");
        assert!(repo.find_by_id("missing").unwrap().is_none());
        assert_eq!(repo.next_arrival_seq().unwrap(), 2);
    }

    #[test]
    fn test_link_is_guarded_against_double_allocation() {
        let repo = setup();
        repo.insert_order(&make_order("O1", 1), &[("sofa", 1)]).unwrap();
        let eta = NaiveDate::from_ymd_opt(2026, 2, 1);

        assert_eq!(
            repo.link_order_if_fits("O1", "C1", eta, always).unwrap(),
            LinkOutcome::Linked
        );
        assert_eq!(
            repo.link_order_if_fits("O1", "C2", None, always).unwrap(),
            LinkOutcome::AlreadyLinked {
                container_id: "C1".to_string()
            }
        );

        let loaded = repo.find_by_id("O1").unwrap().unwrap();
        assert_eq!(loaded.order.container_id.as_deref(), Some("C1"));
        assert_eq!(loaded.order.delivery_eta, eta);
        assert_eq!(repo.find_linked_to("C1").unwrap().len(), 1);
        assert!(repo.find_unallocated_active().unwrap().is_empty());

        assert!(!repo.unlink_order("O1", "C2").unwrap());
        assert!(repo.unlink_order("O1", "C1").unwrap());
        assert_eq!(repo.find_unallocated_active().unwrap().len(), 1);
    }

    #[test]
    fn test_link_rechecks_inside_write_transaction() {
        let repo = setup();
        repo.insert_order(&make_order("O1", 1), &[("sofa", 2)]).unwrap();
        repo.insert_order(&make_order("O2", 2), &[("sofa", 1)]).unwrap();
        assert_eq!(
            repo.link_order_if_fits("O1", "C1", None, always).unwrap(),
            LinkOutcome::Linked
        );

        // 判断函数看到的是事务内的最新台账
        let outcome = repo
            .link_order_if_fits("O2", "C1", None, |order, capacity, linked| {
                assert_eq!(order.order.order_id, "O2");
                assert_eq!(capacity.len(), 1);
                assert_eq!(linked.len(), 1);
                let used: i64 = linked.iter().flat_map(|o| &o.line_items).map(|i| i.quantity).sum();
                capacity[0].total_quantity - used >= order.line_items[0].quantity
            })
            .unwrap();
        assert_eq!(outcome, LinkOutcome::CapacityExhausted);
        assert_eq!(repo.find_by_id("O2").unwrap().unwrap().order.container_id, None);

        assert_eq!(
            repo.link_order_if_fits("O2", "D1", None, always).unwrap(),
            LinkOutcome::ContainerUnavailable
        );
        assert_eq!(
            repo.link_order_if_fits("O2", "NOPE", None, always).unwrap(),
            LinkOutcome::ContainerUnavailable
        );
        assert_eq!(
            repo.link_order_if_fits("GONE", "C1", None, always).unwrap(),
            LinkOutcome::OrderMissing
        );

        repo.remove_and_unlink("O2", RemovalKind::FullRefund, &[]).unwrap();
        assert_eq!(
            repo.link_order_if_fits("O2", "C2", None, always).unwrap(),
            LinkOutcome::NotActive
        );
    }

    #[test]
    fn test_remove_and_unlink_variants() {
        let repo = setup();
        for (i, id) in ["O1", "O2", "O3"].iter().enumerate() {
            repo.insert_order(&make_order(id, i as i64), &[("sofa", 1)]).unwrap();
            repo.link_order_if_fits(id, "C1", None, always).unwrap();
        }

        repo.remove_and_unlink("O1", RemovalKind::FullRefund, &["O3".to_string()])
            .unwrap();
        let o1 = repo.find_by_id("O1").unwrap().unwrap();
        assert_eq!(o1.order.state, OrderState::Refunded);
        assert_eq!(o1.order.container_id, None);
        assert_eq!(repo.find_by_id("O3").unwrap().unwrap().order.container_id, None);
        // 退款订单不回到待分配池
        let pool: Vec<String> = repo
            .find_unallocated_active()
            .unwrap()
            .into_iter()
            .map(|o| o.order.order_id)
            .collect();
        assert_eq!(pool, vec!["O3"]);

        repo.remove_and_unlink("O2", RemovalKind::Deleted, &[]).unwrap();
        assert!(repo.find_by_id("O2").unwrap().is_none());

        let err = repo.remove_and_unlink("O2", RemovalKind::Deleted, &[]).unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[test]
    fn test_line_item_refunds() {
        let repo = setup();
        let ids = repo
            .insert_order(&make_order("O1", 1), &[("sofa", 3), ("chair", 2)])
            .unwrap();

        let applied = repo
            .apply_line_item_refunds(
                "O1",
                &[
                    LineItemRefund { line_item_id: ids[0], quantity: 1 },
                    LineItemRefund { line_item_id: ids[1], quantity: 5 },
                ],
            )
            .unwrap();
        assert_eq!(applied.reduced_line_items, vec![ids[0]]);
        assert_eq!(applied.removed_line_items, vec![ids[1]]);

        let loaded = repo.find_by_id("O1").unwrap().unwrap();
        assert_eq!(loaded.line_items.len(), 1);
        assert_eq!(loaded.line_items[0].quantity, 2);

        // 失败的退款整体回滚
        let err = repo
            .apply_line_item_refunds(
                "O1",
                &[
                    LineItemRefund { line_item_id: ids[0], quantity: 1 },
                    LineItemRefund { line_item_id: 999, quantity: 1 },
                ],
            )
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
        assert_eq!(repo.find_by_id("O1").unwrap().unwrap().line_items[0].quantity, 2);
    }
}
