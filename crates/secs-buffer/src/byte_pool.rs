use alloc::{sync::Arc, vec::Vec};
use core::{
    fmt,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

use bytes::{Bytes, BytesMut};
use spin::Mutex;

/// `BytePool` 基于自由链表复用 `BytesMut`，为条目编码提供输出缓冲。
///
/// # 模块角色（Why）
/// - 发送路径上每个条目都会产生一段编码结果，逐段堆分配在高消息速率下代价明显；
/// - 编码结果以冻结的 `Bytes` 交给分散写（scatter write），写出后可通过
///   [`BytePool::reclaim_frozen`] 取回独占所有权并放回链表。
///
/// # 核心机制（How）
/// - `spin::Mutex<Vec<BytesMut>>` 作为自由链表，租借时选取首个容量足够的块；
/// - `ByteCounters` 原子记录分配字节、闲置字节、活跃租约与回收失败次数。
///
/// # 契约说明（What）
/// - `acquire(min)` 返回 `len == 0 && capacity >= min` 的缓冲；
/// - `reclaim_frozen` 仅在 `Bytes` 为唯一引用时才能回收，否则计入 `lost` 并直接释放。
#[derive(Clone, Default)]
pub struct BytePool {
    inner: Arc<BytePoolInner>,
}

impl fmt::Debug for BytePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BytePool")
            .field("stats", &self.statistics())
            .finish()
    }
}

#[derive(Default)]
struct BytePoolInner {
    free_list: Mutex<Vec<BytesMut>>,
    counters: ByteCounters,
}

impl BytePool {
    /// 创建空池。
    pub fn new() -> Self {
        Self::default()
    }

    /// 租借一个至少 `min_capacity` 字节的空缓冲。
    pub fn acquire(&self, min_capacity: usize) -> BytesMut {
        let reused = {
            let mut list = self.inner.free_list.lock();
            list.iter()
                .position(|buf| buf.capacity() >= min_capacity)
                .map(|index| list.swap_remove(index))
        };

        let counters = &self.inner.counters;
        let mut buffer = match reused {
            Some(buf) => {
                saturating_sub(&counters.available_bytes, buf.capacity());
                buf
            }
            None => {
                let buf = BytesMut::with_capacity(min_capacity);
                counters
                    .allocated_bytes
                    .fetch_add(buf.capacity(), Ordering::Relaxed);
                buf
            }
        };
        buffer.clear();
        counters.active_leases.fetch_add(1, Ordering::Relaxed);
        buffer
    }

    /// 归还可写缓冲。
    pub fn reclaim(&self, mut buffer: BytesMut) {
        let counters = &self.inner.counters;
        saturating_sub(&counters.active_leases, 1);
        buffer.clear();
        counters
            .available_bytes
            .fetch_add(buffer.capacity(), Ordering::Relaxed);
        self.inner.free_list.lock().push(buffer);
    }

    /// 尝试回收已冻结的编码段；仍存在其他引用时放弃回收。
    pub fn reclaim_frozen(&self, segment: Bytes) {
        match segment.try_into_mut() {
            Ok(buffer) => self.reclaim(buffer),
            Err(shared) => {
                let counters = &self.inner.counters;
                saturating_sub(&counters.active_leases, 1);
                counters.lost.fetch_add(1, Ordering::Relaxed);
                drop(shared);
            }
        }
    }

    /// 清空自由链表，返回释放的字节容量。
    pub fn shrink_to_fit(&self) -> usize {
        let mut list = self.inner.free_list.lock();
        let reclaimed: usize = list.iter().map(BytesMut::capacity).sum();
        list.clear();
        saturating_sub(&self.inner.counters.available_bytes, reclaimed);
        reclaimed
    }

    /// 生成统计快照。
    pub fn statistics(&self) -> BytePoolStats {
        let counters = &self.inner.counters;
        BytePoolStats {
            free_slots: self.inner.free_list.lock().len(),
            allocated_bytes: counters.allocated_bytes.load(Ordering::Relaxed),
            available_bytes: counters.available_bytes.load(Ordering::Relaxed),
            active_leases: counters.active_leases.load(Ordering::Relaxed),
            lost: counters.lost.load(Ordering::Relaxed),
        }
    }
}

#[derive(Default)]
struct ByteCounters {
    allocated_bytes: AtomicUsize,
    available_bytes: AtomicUsize,
    active_leases: AtomicUsize,
    lost: AtomicU64,
}

/// [`BytePool`] 统计快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BytePoolStats {
    pub free_slots: usize,
    pub allocated_bytes: usize,
    pub available_bytes: usize,
    pub active_leases: usize,
    /// 冻结段仍被共享、无法取回的次数。
    pub lost: u64,
}

fn saturating_sub(target: &AtomicUsize, value: usize) {
    let _ = target.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_sub(value))
    });
}
