// ==========================================
// 增量分配与批量分配一致性测试
// ==========================================
// 场景: 两个内容相同的台账，一个执行批量分配，
//       另一个按创建次序逐单分配，结果应完全一致
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod incremental_equivalence_test {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use rusqlite::Connection;

    use container_alloc::config::ConfigManager;
    use container_alloc::{AllocationApi, SingleAllocationOutcome};

    use crate::test_helpers::{container_of, insert_capacity, insert_container, insert_order, setup_api};

    const ORDER_IDS: [&str; 7] = ["A", "B", "C", "D", "E", "F", "G"];

    fn seed(conn: &Arc<Mutex<Connection>>) {
        ConfigManager::from_connection(conn.clone())
            .set_excluded_products(&["gift card"])
            .unwrap();
        insert_container(conn, "EARLY", Some("2026-01-05"), "in_transit");
        insert_container(conn, "LATE", Some("2026-02-01"), "pending");
        insert_container(conn, "NOETA", None, "delayed");
        insert_container(conn, "DONE", Some("2025-12-01"), "delivered");
        insert_capacity(conn, "EARLY", "sofa", 3);
        insert_capacity(conn, "EARLY", "chair", 4);
        insert_capacity(conn, "LATE", "sofa", 4);
        insert_capacity(conn, "LATE", "table", 1);
        insert_capacity(conn, "NOETA", "chair", 10);
        insert_capacity(conn, "NOETA", "table", 2);
        insert_capacity(conn, "DONE", "sofa", 100);

        // D 与 C 同一分钟创建，按入库序号排序
        insert_order(conn, "A", 0, &[("sofa", 2), ("chair", 2)]);
        insert_order(conn, "B", 5, &[("sofa", 2)]);
        insert_order(conn, "C", 7, &[("chair", 3), ("gift card", 1)]);
        insert_order(conn, "D", 7, &[("table", 2)]);
        insert_order(conn, "E", 9, &[("gift card", 1)]);
        insert_order(conn, "F", 12, &[("sofa", 1), ("table", 1)]);
        insert_order(conn, "G", 15, &[("sofa", 9)]);
    }

    fn mapping(conn: &Arc<Mutex<Connection>>) -> BTreeMap<&'static str, Option<String>> {
        ORDER_IDS.iter().map(|id| (*id, container_of(conn, id))).collect()
    }

    #[test]
    fn test_incremental_matches_batch() {
        let (_tmp_a, conn_a, batch_api) = setup_api();
        let (_tmp_b, conn_b, single_api) = setup_api();
        seed(&conn_a);
        seed(&conn_b);

        batch_api.run_batch_allocation(None).unwrap();
        for id in ORDER_IDS {
            single_api.allocate_single_order(id, None).unwrap();
        }

        let batch_mapping = mapping(&conn_a);
        assert_eq!(batch_mapping, mapping(&conn_b));

        assert_eq!(batch_mapping["A"].as_deref(), Some("EARLY"));
        assert_eq!(batch_mapping["B"].as_deref(), Some("LATE"));
        assert_eq!(batch_mapping["C"].as_deref(), Some("NOETA"));
        assert_eq!(batch_mapping["D"].as_deref(), Some("NOETA"));
        assert_eq!(batch_mapping["E"], None);
        assert_eq!(batch_mapping["F"].as_deref(), Some("LATE"));
        assert_eq!(batch_mapping["G"], None);

        assert_eq!(
            batch_api.capacity_overview().unwrap(),
            single_api.capacity_overview().unwrap()
        );
    }

    #[test]
    fn test_single_allocation_is_stable_once_allocated() {
        let (_tmp, conn, api) = setup_api();
        seed(&conn);

        let first = api.allocate_single_order("A", None).unwrap();
        let second = api.allocate_single_order("A", None).unwrap();

        match (first, second) {
            (
                SingleAllocationOutcome::Allocated(a),
                SingleAllocationOutcome::AlreadyAllocated { container_id, .. },
            ) => assert_eq!(a.container_id, container_id),
            other => panic!("unexpected outcomes: {:?}", other),
        }
    }

    #[test]
    fn test_api_opened_from_file_sees_same_ledger() {
        let (tmp, conn, _api) = setup_api();
        seed(&conn);

        let api = AllocationApi::open(tmp.path().to_str().unwrap()).unwrap();
        let report = api.run_batch_allocation(None).unwrap();
        assert_eq!(report.considered_count, ORDER_IDS.len());
    }
}
