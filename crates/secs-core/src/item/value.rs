use core::fmt;

use bytes::{BufMut, BytesMut};
use secs_buffer::{ArrayPool, PooledArray};

use crate::item::Item;
use crate::pools::ItemPools;

mod sealed {
    pub trait Sealed {}
}

/// 可作为数值数组元素的定宽类型。
///
/// # 契约说明（What）
/// - `WIDTH` 为单元素的线路字节数；
/// - `put_be`/`from_be` 以网络字节序（大端）逐元素写入/读取，等价于“原生写入后逐元素反转字节”；
/// - `same_bits` 按原始字节比较，浮点数的 `NaN`、`-0.0` 也按位判等；
/// - 该 trait 已封闭，仅为线路标准定义的元素类型实现。
pub trait SecsValue:
    Copy + fmt::Debug + fmt::Display + Send + Sync + 'static + sealed::Sealed
{
    const WIDTH: usize;

    fn put_be(self, buf: &mut BytesMut);

    /// `bytes.len()` 必须等于 `WIDTH`。
    fn from_be(bytes: &[u8]) -> Self;

    fn same_bits(self, other: Self) -> bool;

    #[doc(hidden)]
    fn array_pool(pools: &ItemPools) -> &ArrayPool<Self>;

    #[doc(hidden)]
    fn view(item: &Item) -> Option<&[Self]>;
}

macro_rules! impl_secs_value {
    ($ty:ty, $put:ident, $pool:ident, [$($variant:ident),+]) => {
        impl sealed::Sealed for $ty {}

        impl SecsValue for $ty {
            const WIDTH: usize = core::mem::size_of::<$ty>();

            fn put_be(self, buf: &mut BytesMut) {
                buf.$put(self);
            }

            fn from_be(bytes: &[u8]) -> Self {
                let mut raw = [0u8; core::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_be_bytes(raw)
            }

            fn same_bits(self, other: Self) -> bool {
                self.to_be_bytes() == other.to_be_bytes()
            }

            fn array_pool(pools: &ItemPools) -> &ArrayPool<Self> {
                &pools.$pool
            }

            fn view(item: &Item) -> Option<&[Self]> {
                match item {
                    $(Item::$variant(values) => Some(values.values()),)+
                    _ => None,
                }
            }
        }
    };
}

impl_secs_value!(u8, put_u8, u8s, [Binary, U1]);
impl_secs_value!(u16, put_u16, u16s, [U2]);
impl_secs_value!(u32, put_u32, u32s, [U4]);
impl_secs_value!(u64, put_u64, u64s, [U8]);
impl_secs_value!(i8, put_i8, i8s, [I1]);
impl_secs_value!(i16, put_i16, i16s, [I2]);
impl_secs_value!(i32, put_i32, i32s, [I4]);
impl_secs_value!(i64, put_i64, i64s, [I8]);
impl_secs_value!(f32, put_f32, f32s, [F4]);
impl_secs_value!(f64, put_f64, f64s, [F8]);

impl sealed::Sealed for bool {}

impl SecsValue for bool {
    const WIDTH: usize = 1;

    fn put_be(self, buf: &mut BytesMut) {
        buf.put_u8(u8::from(self));
    }

    fn from_be(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    fn same_bits(self, other: Self) -> bool {
        self == other
    }

    fn array_pool(pools: &ItemPools) -> &ArrayPool<Self> {
        &pools.bools
    }

    fn view(item: &Item) -> Option<&[Self]> {
        match item {
            Item::Boolean(values) => Some(values.values()),
            _ => None,
        }
    }
}

/// 数值数组条目：拥有一段定宽元素数组，数组可能租借自池并在 `Drop` 时归还。
pub struct ValueItem<T: SecsValue> {
    values: PooledArray<T>,
}

impl<T: SecsValue> ValueItem<T> {
    pub(crate) fn new(values: PooledArray<T>) -> Self {
        Self { values }
    }

    pub(crate) fn from_slice(values: &[T], pools: &ItemPools) -> Self {
        Self::new(T::array_pool(pools).rent_from_slice(values))
    }

    /// 逐元素按大端读取 `payload`；调用方保证长度是 `WIDTH` 的整数倍。
    pub(crate) fn decode(payload: &[u8], pools: &ItemPools) -> Self {
        let mut values = T::array_pool(pools).rent(payload.len() / T::WIDTH);
        for chunk in payload.chunks_exact(T::WIDTH) {
            values.push(T::from_be(chunk));
        }
        Self::new(values)
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn payload_len(&self) -> usize {
        self.values.len() * T::WIDTH
    }

    pub(crate) fn write_payload(&self, buf: &mut BytesMut) {
        for value in self.values.iter() {
            value.put_be(buf);
        }
    }

    pub(crate) fn same_bits(&self, other: &Self) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(a, b)| a.same_bits(*b))
    }
}

impl<T: SecsValue> fmt::Debug for ValueItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.values.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elements_are_written_big_endian() {
        let pools = ItemPools::shared();
        let item = ValueItem::from_slice(&[0x0102u16, 0xA0B0], &pools);
        let mut buf = BytesMut::new();
        item.write_payload(&mut buf);
        assert_eq!(&buf[..], &[0x01, 0x02, 0xA0, 0xB0]);
    }

    #[test]
    fn decode_reverses_each_element() {
        let pools = ItemPools::shared();
        let item = ValueItem::<i32>::decode(&[0xFF, 0xFF, 0xFF, 0xFE, 0, 0, 0, 7], &pools);
        assert_eq!(item.values(), &[-2, 7]);
    }

    #[test]
    fn float_comparison_is_bitwise() {
        let pools = ItemPools::shared();
        let nan = ValueItem::from_slice(&[f64::NAN], &pools);
        let other_nan = ValueItem::from_slice(&[f64::NAN], &pools);
        assert!(nan.same_bits(&other_nan));
        let zero = ValueItem::from_slice(&[0.0f32], &pools);
        let negative_zero = ValueItem::from_slice(&[-0.0f32], &pools);
        assert!(!zero.same_bits(&negative_zero));
    }
}
