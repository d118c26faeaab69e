use std::sync::{Arc, LazyLock};

use secs_buffer::{ArrayPool, BytePool, PoolAccessMode, PoolStats};

use crate::config::PoolConfig;
use crate::item::{Item, SecsValue};

static SHARED: LazyLock<Arc<ItemPools>> =
    LazyLock::new(|| Arc::new(ItemPools::new(&PoolConfig::default())));

/// 条目底层数组与编码缓冲的池集合，按元素类型划分。
///
/// # 契约说明（What）
/// - 收发两条路径共享同一实例，所有池均可并发租借/归还；
/// - 无池参数的条目构造函数使用 [`ItemPools::shared`]，`*_in` 构造函数与解码器使用调用方注入的实例；
/// - 条目总是把数组归还到租借时的来源池，与当前使用哪个集合无关。
#[derive(Debug)]
pub struct ItemPools {
    pub(crate) lists: ArrayPool<Item>,
    pub(crate) bools: ArrayPool<bool>,
    pub(crate) u8s: ArrayPool<u8>,
    pub(crate) u16s: ArrayPool<u16>,
    pub(crate) u32s: ArrayPool<u32>,
    pub(crate) u64s: ArrayPool<u64>,
    pub(crate) i8s: ArrayPool<i8>,
    pub(crate) i16s: ArrayPool<i16>,
    pub(crate) i32s: ArrayPool<i32>,
    pub(crate) i64s: ArrayPool<i64>,
    pub(crate) f32s: ArrayPool<f32>,
    pub(crate) f64s: ArrayPool<f64>,
    bytes: BytePool,
}

impl ItemPools {
    pub fn new(config: &PoolConfig) -> Self {
        let mode: PoolAccessMode = config.access_mode.into();
        Self {
            lists: ArrayPool::new(mode),
            bools: ArrayPool::new(mode),
            u8s: ArrayPool::new(mode),
            u16s: ArrayPool::new(mode),
            u32s: ArrayPool::new(mode),
            u64s: ArrayPool::new(mode),
            i8s: ArrayPool::new(mode),
            i16s: ArrayPool::new(mode),
            i32s: ArrayPool::new(mode),
            i64s: ArrayPool::new(mode),
            f32s: ArrayPool::new(mode),
            f64s: ArrayPool::new(mode),
            bytes: BytePool::new(),
        }
    }

    /// 进程级共享池。
    pub fn shared() -> Arc<ItemPools> {
        Arc::clone(&SHARED)
    }

    /// 编码输出缓冲池。
    pub fn bytes(&self) -> &BytePool {
        &self.bytes
    }

    /// 列表子项数组池的统计快照。
    pub fn list_statistics(&self) -> PoolStats {
        self.lists.statistics()
    }

    /// 元素类型为 `T` 的数值数组池统计快照。
    pub fn value_statistics<T: SecsValue>(&self) -> PoolStats {
        T::array_pool(self).statistics()
    }

    /// 丢弃全部缓存实例，返回被丢弃的数组数量。
    pub fn shrink_to_fit(&self) -> usize {
        self.bytes.shrink_to_fit();
        [
            self.lists.shrink_to_fit(),
            self.bools.shrink_to_fit(),
            self.u8s.shrink_to_fit(),
            self.u16s.shrink_to_fit(),
            self.u32s.shrink_to_fit(),
            self.u64s.shrink_to_fit(),
            self.i8s.shrink_to_fit(),
            self.i16s.shrink_to_fit(),
            self.i32s.shrink_to_fit(),
            self.i64s.shrink_to_fit(),
            self.f32s.shrink_to_fit(),
            self.f64s.shrink_to_fit(),
        ]
        .into_iter()
        .sum()
    }
}
