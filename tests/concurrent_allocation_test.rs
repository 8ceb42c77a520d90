// ==========================================
// 并发分配测试
// ==========================================
// 场景: 批量分配、单订单分配、删除在多线程下交错执行
//       两个独立打开的 API（各自的锁注册表）操作同一数据库文件
// 目标: 任意交错下都不超配，关联写入不丢失
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod concurrent_allocation_test {
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use container_alloc::{AllocationApi, SingleAllocationOutcome};

    use crate::test_helpers::{
        container_of, create_test_db, insert_capacity, insert_container, insert_order, open_shared,
        setup_api,
    };

    // ==========================================
    // 测试1: 批量与单订单分配并发
    // ==========================================
    #[test]
    fn test_concurrent_batch_and_single_never_over_allocate() {
        let (_tmp, conn, api) = setup_api();
        insert_container(&conn, "C1", Some("2026-01-10"), "pending");
        insert_container(&conn, "C2", Some("2026-01-20"), "in_transit");
        insert_capacity(&conn, "C1", "chair", 5);
        insert_capacity(&conn, "C2", "chair", 7);
        let order_ids: Vec<String> = (0..20).map(|i| format!("O{:02}", i)).collect();
        for (i, id) in order_ids.iter().enumerate() {
            insert_order(&conn, id, i as u32, &[("chair", 1)]);
        }

        let api = Arc::new(api);
        let mut handles = vec![];

        for t in 0..4 {
            let api = api.clone();
            let ids: Vec<String> = order_ids.iter().skip(t).step_by(4).cloned().collect();
            handles.push(thread::spawn(move || -> Result<(), String> {
                for id in ids {
                    api.allocate_single_order(&id, Some("worker"))
                        .map_err(|e| e.to_string())?;
                }
                Ok(())
            }));
        }
        for _ in 0..2 {
            let api = api.clone();
            handles.push(thread::spawn(move || -> Result<(), String> {
                thread::sleep(Duration::from_millis(5));
                api.run_batch_allocation(Some("batch"))
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }));
        }

        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        // 补一轮批量分配，容量应恰好用满
        api.run_batch_allocation(None).unwrap();

        let allocated = order_ids
            .iter()
            .filter(|id| container_of(&conn, id).is_some())
            .count();
        assert_eq!(allocated, 12);

        let overview = api.capacity_overview().unwrap();
        assert!(overview.iter().all(|r| r.remaining_quantity == 0));
        assert!(api.validate_allocation().unwrap().is_consistent());
    }

    // ==========================================
    // 测试2: 删除级联与新订单分配并发
    // ==========================================
    #[test]
    fn test_concurrent_removal_and_allocation_keep_ledger_consistent() {
        let (_tmp, conn, api) = setup_api();
        insert_container(&conn, "C1", Some("2026-01-10"), "pending");
        insert_container(&conn, "C2", Some("2026-01-20"), "pending");
        insert_capacity(&conn, "C1", "sofa", 6);
        insert_capacity(&conn, "C2", "sofa", 6);
        for i in 0..8 {
            insert_order(&conn, &format!("E{}", i), i, &[("sofa", 1)]);
        }
        api.run_batch_allocation(None).unwrap();
        for i in 0..8 {
            insert_order(&conn, &format!("N{}", i), 100 + i, &[("sofa", 1)]);
        }

        let api = Arc::new(api);
        let mut handles = vec![];
        for i in 0..4 {
            let api = api.clone();
            handles.push(thread::spawn(move || -> Result<(), String> {
                api.delete_order(&format!("E{}", i * 2), None)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }));
        }
        for i in 0..8 {
            let api = api.clone();
            handles.push(thread::spawn(move || -> Result<(), String> {
                api.allocate_single_order(&format!("N{}", i), None)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }));
        }

        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let report = api.validate_allocation().unwrap();
        assert!(report.is_consistent(), "台账不一致: {:?}", report);
        // 4 个剩余旧订单 + 8 个新订单 = 12 = 总容量
        api.run_batch_allocation(None).unwrap();
        assert_eq!(api.validate_allocation().unwrap().linked_orders, 12);
        let overview = api.capacity_overview().unwrap();
        assert!(overview.iter().all(|r| r.remaining_quantity == 0));
    }

    // ==========================================
    // 测试3: 两个独立 API 争抢最后一个单位
    // ==========================================
    #[test]
    fn test_two_independent_apis_never_overcommit_last_unit() {
        for round in 0..40 {
            let (_tmp, db_path) = create_test_db().unwrap();
            let conn = open_shared(&db_path);
            insert_container(&conn, "C1", Some("2026-01-10"), "pending");
            insert_capacity(&conn, "C1", "chair", 1);
            insert_order(&conn, "X", 0, &[("chair", 1)]);
            insert_order(&conn, "Y", 1, &[("chair", 1)]);

            let first = AllocationApi::open(&db_path).unwrap();
            let second = AllocationApi::open(&db_path).unwrap();
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = [(first, "X"), (second, "Y")]
                .into_iter()
                .map(|(api, order_id)| {
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        api.allocate_single_order(order_id, None).unwrap()
                    })
                })
                .collect();
            let outcomes: Vec<SingleAllocationOutcome> =
                handles.into_iter().map(|h| h.join().unwrap()).collect();

            let allocated = outcomes
                .iter()
                .filter(|o| matches!(o, SingleAllocationOutcome::Allocated(_)))
                .count();
            assert_eq!(allocated, 1, "round={} outcomes={:?}", round, outcomes);
            let linked = ["X", "Y"]
                .iter()
                .filter(|id| container_of(&conn, id).is_some())
                .count();
            assert_eq!(linked, 1, "round={}", round);

            let report = AllocationApi::open(&db_path).unwrap().validate_allocation().unwrap();
            assert!(report.is_consistent(), "round={} report={:?}", round, report);
        }
    }

    // ==========================================
    // 测试4: 两个独立 API 同时批量分配
    // ==========================================
    #[test]
    fn test_two_independent_batch_runs_never_overcommit() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        insert_container(&conn, "C1", Some("2026-01-10"), "pending");
        insert_container(&conn, "C2", Some("2026-01-20"), "pending");
        insert_capacity(&conn, "C1", "chair", 3);
        insert_capacity(&conn, "C2", "chair", 2);
        for i in 0..10 {
            insert_order(&conn, &format!("O{}", i), i, &[("chair", 1)]);
        }

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let api = AllocationApi::open(&db_path).unwrap();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    api.run_batch_allocation(None).unwrap()
                })
            })
            .collect();
        let total_allocated: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap().allocated_count())
            .sum();

        assert!(total_allocated <= 5, "total_allocated={}", total_allocated);
        let api = AllocationApi::open(&db_path).unwrap();
        let report = api.validate_allocation().unwrap();
        assert!(report.is_consistent(), "台账不一致: {:?}", report);
        assert_eq!(report.linked_orders, total_allocated);

        // 快照过期而被拒的订单由下一次批量运行补上
        api.run_batch_allocation(None).unwrap();
        assert_eq!(api.validate_allocation().unwrap().linked_orders, 5);
        assert!(api.capacity_overview().unwrap().iter().all(|r| r.remaining_quantity == 0));
    }
}
