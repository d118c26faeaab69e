use alloc::{boxed::Box, collections::VecDeque, sync::Arc};
use core::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use spin::Mutex;

/// 空闲实例的出队顺序。
///
/// - `Lifo`：优先复用最近归还的实例，突发流量下缓存局部性更好；
/// - `Fifo`：按归还顺序轮转复用。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PoolAccessMode {
    #[default]
    Lifo,
    Fifo,
}

/// `Pool<T>` 是线程安全的通用对象池，用于在编解码热路径上复用对象。
///
/// # 核心机制（How）
/// - 内部维护 `spin::Mutex<VecDeque<T>>` 作为空闲队列，`rent` 按 [`PoolAccessMode`] 从队尾或队首取出；
/// - 队列为空时调用构造时注入的工厂函数创建新实例；
/// - `reclaim` 总是压入队尾，配合出队方向实现 LIFO/FIFO 语义；
/// - `PoolCounters` 以原子计数记录创建、租借、归还次数，供 [`Pool::statistics`] 生成快照。
///
/// # 契约说明（What）
/// - **线程安全**：`rent`/`reclaim` 可在收发两个线程上并发调用，临界区仅覆盖一次队列操作；
/// - **无上限**：池不限制容量，未归还的实例直接被释放，不影响正确性；
/// - **前置条件**：调用方不得假设租到的实例是“干净”的，重置逻辑由调用方显式执行。
pub struct Pool<T: Send + 'static> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Send + 'static> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("mode", &self.inner.mode)
            .field("stats", &self.statistics())
            .finish()
    }
}

struct PoolInner<T> {
    idle: Mutex<VecDeque<T>>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    mode: PoolAccessMode,
    counters: PoolCounters,
}

impl<T: Send + 'static> Pool<T> {
    /// 以工厂函数与出队顺序构建空池。
    pub fn new<F>(factory: F, mode: PoolAccessMode) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(VecDeque::new()),
                factory: Box::new(factory),
                mode,
                counters: PoolCounters::default(),
            }),
        }
    }

    /// 返回池的出队顺序。
    pub fn access_mode(&self) -> PoolAccessMode {
        self.inner.mode
    }

    /// 租借一个实例：优先复用空闲实例，否则通过工厂新建。
    pub fn rent(&self) -> T {
        let reused = {
            let mut idle = self.inner.idle.lock();
            match self.inner.mode {
                PoolAccessMode::Lifo => idle.pop_back(),
                PoolAccessMode::Fifo => idle.pop_front(),
            }
        };
        self.inner.counters.rented.fetch_add(1, Ordering::Relaxed);
        match reused {
            Some(instance) => instance,
            None => {
                self.inner.counters.created.fetch_add(1, Ordering::Relaxed);
                (self.inner.factory)()
            }
        }
    }

    /// 归还实例，使其可被后续 `rent` 复用。
    pub fn reclaim(&self, instance: T) {
        self.inner.counters.reclaimed.fetch_add(1, Ordering::Relaxed);
        self.inner.idle.lock().push_back(instance);
    }

    /// 清空空闲队列，返回被丢弃的实例数量。
    pub fn shrink_to_fit(&self) -> usize {
        let mut idle = self.inner.idle.lock();
        let dropped = idle.len();
        idle.clear();
        dropped
    }

    /// 生成当前统计快照。
    pub fn statistics(&self) -> PoolStats {
        PoolStats {
            idle: self.inner.idle.lock().len(),
            created: self.inner.counters.created.load(Ordering::Relaxed),
            rented: self.inner.counters.rented.load(Ordering::Relaxed),
            reclaimed: self.inner.counters.reclaimed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Default)]
struct PoolCounters {
    created: AtomicU64,
    rented: AtomicU64,
    reclaimed: AtomicU64,
}

/// 池统计快照，字段均为单调累计值（`idle` 除外）。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// 当前空闲、可直接复用的实例数。
    pub idle: usize,
    /// 工厂累计创建的实例数，即未命中空闲队列的次数。
    pub created: u64,
    /// 累计租借次数。
    pub rented: u64,
    /// 累计归还次数。
    pub reclaimed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn lifo_reuses_most_recent_instance() {
        let pool = Pool::new(|| 0u32, PoolAccessMode::Lifo);
        pool.reclaim(1);
        pool.reclaim(2);
        pool.reclaim(3);
        assert_eq!(pool.rent(), 3);
        assert_eq!(pool.rent(), 2);
    }

    #[test]
    fn fifo_reuses_oldest_instance() {
        let pool = Pool::new(|| 0u32, PoolAccessMode::Fifo);
        pool.reclaim(1);
        pool.reclaim(2);
        pool.reclaim(3);
        assert_eq!(pool.rent(), 1);
        assert_eq!(pool.rent(), 2);
    }

    #[test]
    fn empty_pool_falls_back_to_factory() {
        let pool = Pool::new(|| Vec::<u8>::with_capacity(8), PoolAccessMode::Lifo);
        let first = pool.rent();
        assert!(first.capacity() >= 8);
        let stats = pool.statistics();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.rented, 1);
        assert_eq!(stats.idle, 0);
    }

    #[test]
    fn shrink_drops_idle_instances() {
        let pool = Pool::new(|| 0u8, PoolAccessMode::Lifo);
        pool.reclaim(7);
        pool.reclaim(9);
        assert_eq!(pool.shrink_to_fit(), 2);
        assert_eq!(pool.statistics().idle, 0);
        assert_eq!(pool.rent(), 0, "收缩后应重新走工厂路径");
    }
}
