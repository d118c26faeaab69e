use alloc::vec::{self, Vec};
use core::{
    fmt,
    mem,
    ops::{Deref, DerefMut},
};

use crate::pool::{Pool, PoolAccessMode, PoolStats};

/// `ArrayPool<T>` 复用 `Vec<T>` 作为条目的底层数组（数值数组、列表子项数组）。
///
/// # 设计概要（How）
/// - 基于 [`Pool<Vec<T>>`] 实现，租借时清空旧内容并按需 `reserve`；
/// - 租借结果包装为 [`PooledArray<T>`]，其 `Drop` 负责把数组归还到来源池，
///   因此“恰好归还一次”由所有权保证，而非依赖调用方记忆。
pub struct ArrayPool<T: Send + 'static> {
    arrays: Pool<Vec<T>>,
}

impl<T: Send + 'static> Clone for ArrayPool<T> {
    fn clone(&self) -> Self {
        Self {
            arrays: self.arrays.clone(),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for ArrayPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayPool")
            .field("stats", &self.arrays.statistics())
            .finish()
    }
}

impl<T: Send + 'static> ArrayPool<T> {
    /// 创建空数组池。
    pub fn new(mode: PoolAccessMode) -> Self {
        Self {
            arrays: Pool::new(Vec::new, mode),
        }
    }

    /// 租借一个空数组，容量至少为 `capacity`。
    pub fn rent(&self, capacity: usize) -> PooledArray<T> {
        let mut values = self.arrays.rent();
        values.clear();
        values.reserve(capacity);
        PooledArray {
            values,
            origin: Some(self.arrays.clone()),
        }
    }

    /// 租借数组并拷贝 `src` 的全部元素。
    pub fn rent_from_slice(&self, src: &[T]) -> PooledArray<T>
    where
        T: Clone,
    {
        let mut array = self.rent(src.len());
        array.values.extend_from_slice(src);
        array
    }

    /// 池统计快照。
    pub fn statistics(&self) -> PoolStats {
        self.arrays.statistics()
    }

    /// 丢弃所有缓存数组，返回丢弃数量。
    pub fn shrink_to_fit(&self) -> usize {
        self.arrays.shrink_to_fit()
    }
}

/// 一段可能来自 [`ArrayPool`] 的数组。
///
/// # 契约说明（What）
/// - `origin` 为 `Some` 时，`Drop` 会清空元素并把数组归还来源池；
/// - 通过 [`PooledArray::unpooled`] 包装的普通 `Vec` 在 `Drop` 时直接释放；
/// - [`PooledArray::into_vec`] 解除与池的关联，数组之后不再归还。
pub struct PooledArray<T: Send + 'static> {
    values: Vec<T>,
    origin: Option<Pool<Vec<T>>>,
}

impl<T: Send + 'static> PooledArray<T> {
    /// 包装一个不属于任何池的数组。
    pub fn unpooled(values: Vec<T>) -> Self {
        Self {
            values,
            origin: None,
        }
    }

    /// 追加一个元素。
    pub fn push(&mut self, value: T) {
        self.values.push(value);
    }

    /// 移出全部元素，数组本身仍归属来源池。
    pub fn drain(&mut self) -> vec::Drain<'_, T> {
        self.values.drain(..)
    }

    /// 底层数组当前容量。
    pub fn capacity(&self) -> usize {
        self.values.capacity()
    }

    /// 数组是否来自池。
    pub fn is_pooled(&self) -> bool {
        self.origin.is_some()
    }

    /// 取出底层 `Vec`，数组不再归还池。
    pub fn into_vec(mut self) -> Vec<T> {
        self.origin = None;
        mem::take(&mut self.values)
    }
}

impl<T: Send + 'static> Deref for PooledArray<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.values
    }
}

impl<T: Send + 'static> DerefMut for PooledArray<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.values
    }
}

impl<T: Send + fmt::Debug + 'static> fmt::Debug for PooledArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.values.iter()).finish()
    }
}

impl<T: Send + 'static> From<Vec<T>> for PooledArray<T> {
    fn from(values: Vec<T>) -> Self {
        Self::unpooled(values)
    }
}

impl<T: Send + 'static> Drop for PooledArray<T> {
    fn drop(&mut self) {
        if let Some(pool) = self.origin.take() {
            let mut values = mem::take(&mut self.values);
            values.clear();
            pool.reclaim(values);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn dropped_array_returns_to_origin() {
        let pool = ArrayPool::<u16>::new(PoolAccessMode::Lifo);
        {
            let mut array = pool.rent(4);
            array.push(1);
            array.push(2);
            assert_eq!(&*array, &[1, 2]);
        }
        let stats = pool.statistics();
        assert_eq!(stats.reclaimed, 1);
        assert_eq!(stats.idle, 1);

        let reused = pool.rent(2);
        assert!(reused.is_empty(), "复用的数组必须先被清空");
        assert!(reused.capacity() >= 4);
        assert_eq!(pool.statistics().created, 1);
    }

    #[test]
    fn unpooled_and_detached_arrays_never_return() {
        let pool = ArrayPool::<u8>::new(PoolAccessMode::Lifo);
        drop(PooledArray::unpooled(vec![1u8, 2, 3]));
        let detached = pool.rent_from_slice(&[4, 5]).into_vec();
        assert_eq!(detached, vec![4, 5]);
        assert_eq!(pool.statistics().reclaimed, 0);
    }

    #[test]
    fn drained_array_still_returns_to_origin() {
        let pool = ArrayPool::<u32>::new(PoolAccessMode::Lifo);
        let mut array = pool.rent_from_slice(&[7, 8, 9]);
        let moved: alloc::vec::Vec<u32> = array.drain().collect();
        assert_eq!(moved, vec![7, 8, 9]);
        assert!(array.is_empty());
        drop(array);
        assert_eq!(pool.statistics().reclaimed, 1);
    }
}
