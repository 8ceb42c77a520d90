// ==========================================
// 集装箱分配系统 - 集装箱级互斥锁
// ==========================================
// 职责: 读库存 → 决策 → 写分配 三步在同一集装箱上串行
// 约定:
// - 单订单分配同一时刻只持有一个集装箱锁
// - 批量/级联按集装箱ID升序一次性获取全部锁（无死锁）
// - 持有集装箱锁期间可获取数据库连接锁，反之不可
// - 仅在本进程内互斥；跨进程的容量复核由关联写入的 IMMEDIATE 事务负责
// ==========================================

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::trace;

/// 单个集装箱的锁守卫，drop 时释放
pub struct ContainerGuard {
    container_id: String,
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl ContainerGuard {
    pub fn container_id(&self) -> &str {
        &self.container_id
    }
}

/// 一组集装箱锁（按ID升序获取）
pub struct ContainerLockSet {
    guards: Vec<ContainerGuard>,
}

impl ContainerLockSet {
    pub fn covers(&self, container_id: &str) -> bool {
        self.guards.iter().any(|g| g.container_id == container_id)
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

// ==========================================
// ContainerLockRegistry - 集装箱锁注册表
// ==========================================
// 条目按需创建；lock_all 时清理无人持有的条目，避免表随集装箱数只增不减
#[derive(Default)]
pub struct ContainerLockRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ContainerLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, container_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(container_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 丢弃只剩注册表自身引用的条目
    ///
    /// 句柄只在表锁内克隆，引用计数为 1 时不存在持有者或等待者
    fn prune(&self) {
        let mut locks = self.locks.lock();
        let before = locks.len();
        locks.retain(|_, handle| Arc::strong_count(handle) > 1);
        if locks.len() < before {
            trace!(pruned = before - locks.len(), "清理空闲集装箱锁");
        }
    }

    /// 当前登记的集装箱锁条目数
    pub fn tracked(&self) -> usize {
        self.locks.lock().len()
    }

    /// 获取单个集装箱锁（阻塞）
    pub fn lock(&self, container_id: &str) -> ContainerGuard {
        let handle = self.handle(container_id);
        let guard = handle.lock_arc();
        trace!(container_id, "集装箱锁已获取");
        ContainerGuard {
            container_id: container_id.to_string(),
            _guard: guard,
        }
    }

    /// 按ID升序获取一组集装箱锁（自动去重）
    pub fn lock_all<'a, I>(&self, container_ids: I) -> ContainerLockSet
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.prune();
        let ordered: BTreeSet<&str> = container_ids.into_iter().collect();
        let guards = ordered.into_iter().map(|id| self.lock(id)).collect();
        ContainerLockSet { guards }
    }
}
