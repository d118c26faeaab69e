//! SECS-II 条目模型。
//!
//! # 模块定位（Why）
//! - 条目是自描述的二进制值：1 字节格式/长度字节数 + 1..=3 字节大端长度 + 负载；
//! - 变体集合由线路标准固定，使用封闭的 [`Item`] 枚举表达，编码、解码与匹配均为穷尽匹配。
//!
//! # 所有权（What）
//! - 条目独占其底层数组；数组可能租借自 [`ItemPools`]，在条目 `Drop` 时归还；
//! - 列表拥有子项，加入列表即转移所有权；
//! - 任意嵌套深度下的释放、匹配、编码与文本渲染都以显式栈完成，不占用与深度成正比的调用栈；
//! - 往返过程中不做深拷贝。

mod list;
mod string;
mod value;

use core::{fmt, ptr};

use bytes::{BufMut, Bytes, BytesMut};
use secs_buffer::{BytePool, PooledArray};

use crate::error::{Result, SecsError};
use crate::format::{LENGTH_BITS_MASK, SecsFormat};
use crate::pools::ItemPools;

pub(crate) use list::ListAssembler;
pub use list::{ListItem, MAX_LIST_LEN};
pub use string::StringItem;
pub use value::{SecsValue, ValueItem};

/// 3 字节长度字段能表达的最大负载。
pub const MAX_PAYLOAD_LEN: usize = 0x00FF_FFFF;

/// 条目头最大字节数（格式字节 + 3 字节长度）。
pub const MAX_ITEM_HEADER_LEN: usize = 4;

/// SECS-II 条目。
pub enum Item {
    List(ListItem),
    Ascii(StringItem),
    Jis8(StringItem),
    Binary(ValueItem<u8>),
    Boolean(ValueItem<bool>),
    I1(ValueItem<i8>),
    I2(ValueItem<i16>),
    I4(ValueItem<i32>),
    I8(ValueItem<i64>),
    U1(ValueItem<u8>),
    U2(ValueItem<u16>),
    U4(ValueItem<u32>),
    U8(ValueItem<u64>),
    F4(ValueItem<f32>),
    F8(ValueItem<f64>),
}

macro_rules! value_constructors {
    ($($name:ident, $name_in:ident => $variant:ident($ty:ty);)+) => {
        $(
            #[doc = concat!("以共享池构建 `", stringify!($variant), "` 条目。")]
            pub fn $name(values: &[$ty]) -> Item {
                Item::$name_in(&ItemPools::shared(), values)
            }

            #[doc = concat!("以 `pools` 中的数组池构建 `", stringify!($variant), "` 条目。")]
            pub fn $name_in(pools: &ItemPools, values: &[$ty]) -> Item {
                Item::$variant(ValueItem::from_slice(values, pools))
            }
        )+
    };
}

impl Item {
    /// 以子项构建列表；子项数超过 255 时返回 `ProtocolViolation`。
    pub fn list(children: Vec<Item>) -> Result<Item> {
        Ok(Item::List(ListItem::new(PooledArray::unpooled(children))?))
    }

    /// 子项数组租借自 `pools`；子项数超过 255 时返回 `ProtocolViolation`。
    pub fn list_in(pools: &ItemPools, children: Vec<Item>) -> Result<Item> {
        let mut array = pools.lists.rent(children.len());
        for child in children {
            array.push(child);
        }
        Item::list_from_array(array)
    }

    /// 以租借的子项数组构建列表。
    pub fn list_from_array(children: PooledArray<Item>) -> Result<Item> {
        Ok(Item::List(ListItem::new(children)?))
    }

    pub fn empty_list() -> Item {
        Item::List(ListItem::empty())
    }

    pub fn ascii(text: impl Into<String>) -> Item {
        Item::Ascii(StringItem::new(text.into()))
    }

    pub fn jis8(text: impl Into<String>) -> Item {
        Item::Jis8(StringItem::new(text.into()))
    }

    value_constructors! {
        binary, binary_in => Binary(u8);
        boolean, boolean_in => Boolean(bool);
        i1, i1_in => I1(i8);
        i2, i2_in => I2(i16);
        i4, i4_in => I4(i32);
        i8, i8_in => I8(i64);
        u1, u1_in => U1(u8);
        u2, u2_in => U2(u16);
        u4, u4_in => U4(u32);
        u8, u8_in => U8(u64);
        f4, f4_in => F4(f32);
        f8, f8_in => F8(f64);
    }

    /// 格式码，构造后不再改变。
    pub fn format(&self) -> SecsFormat {
        match self {
            Item::List(_) => SecsFormat::List,
            Item::Ascii(_) => SecsFormat::Ascii,
            Item::Jis8(_) => SecsFormat::Jis8,
            Item::Binary(_) => SecsFormat::Binary,
            Item::Boolean(_) => SecsFormat::Boolean,
            Item::I1(_) => SecsFormat::I1,
            Item::I2(_) => SecsFormat::I2,
            Item::I4(_) => SecsFormat::I4,
            Item::I8(_) => SecsFormat::I8,
            Item::U1(_) => SecsFormat::U1,
            Item::U2(_) => SecsFormat::U2,
            Item::U4(_) => SecsFormat::U4,
            Item::U8(_) => SecsFormat::U8,
            Item::F4(_) => SecsFormat::F4,
            Item::F8(_) => SecsFormat::F8,
        }
    }

    /// 元素数：列表子项数、字符数或数组元素数。
    pub fn count(&self) -> usize {
        match self {
            Item::List(list) => list.len(),
            Item::Ascii(text) | Item::Jis8(text) => text.len(),
            Item::Binary(values) | Item::U1(values) => values.len(),
            Item::Boolean(values) => values.len(),
            Item::I1(values) => values.len(),
            Item::I2(values) => values.len(),
            Item::I4(values) => values.len(),
            Item::I8(values) => values.len(),
            Item::U2(values) => values.len(),
            Item::U4(values) => values.len(),
            Item::U8(values) => values.len(),
            Item::F4(values) => values.len(),
            Item::F8(values) => values.len(),
        }
    }

    /// 列表子项。
    pub fn items(&self) -> Result<&[Item]> {
        match self {
            Item::List(list) => Ok(list.items()),
            other => Err(SecsError::unsupported("items", other.format())),
        }
    }

    /// 取出列表子项，子项所有权转移给调用方。
    pub fn into_items(self) -> Result<Vec<Item>> {
        match self {
            Item::List(list) => Ok(list.into_items()),
            other => Err(SecsError::unsupported("into_items", other.format())),
        }
    }

    /// 文本值。
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Item::Ascii(text) | Item::Jis8(text) => Ok(text.as_str()),
            other => Err(SecsError::unsupported("as_str", other.format())),
        }
    }

    pub fn into_string(self) -> Result<String> {
        match self {
            Item::Ascii(text) | Item::Jis8(text) => Ok(text.into_string()),
            other => Err(SecsError::unsupported("into_string", other.format())),
        }
    }

    /// 按元素类型读取数值数组；`u8` 同时适用于 `Binary` 与 `U1`。
    pub fn values<T: SecsValue>(&self) -> Result<&[T]> {
        T::view(self).ok_or_else(|| SecsError::unsupported("values", self.format()))
    }

    /// 数组首元素，空数组返回 `None`。
    pub fn first_value<T: SecsValue>(&self) -> Result<Option<T>> {
        Ok(self.values::<T>()?.first().copied())
    }

    /// 带通配的结构匹配。
    ///
    /// - 同一引用必然匹配，格式不同必然不匹配；
    /// - `target` 为空（`count() == 0`）时匹配任意同格式条目，用于只断言形状的模板；
    /// - 否则要求元素数相同且内容逐项相等：列表按序逐项比较，文本比较字符串，数组比较原始字节。
    pub fn is_match(&self, target: &Item) -> bool {
        let mut pending = vec![(self, target)];
        while let Some((item, target)) = pending.pop() {
            if ptr::eq(item, target) {
                continue;
            }
            if item.format() != target.format() {
                return false;
            }
            if target.count() == 0 {
                continue;
            }
            if item.count() != target.count() {
                return false;
            }
            let same = match (item, target) {
                (Item::List(a), Item::List(b)) => {
                    pending.extend(a.items().iter().zip(b.items()).rev());
                    true
                }
                (Item::Ascii(a), Item::Ascii(b)) | (Item::Jis8(a), Item::Jis8(b)) => {
                    a.as_str() == b.as_str()
                }
                (Item::Binary(a), Item::Binary(b)) | (Item::U1(a), Item::U1(b)) => a.same_bits(b),
                (Item::Boolean(a), Item::Boolean(b)) => a.same_bits(b),
                (Item::I1(a), Item::I1(b)) => a.same_bits(b),
                (Item::I2(a), Item::I2(b)) => a.same_bits(b),
                (Item::I4(a), Item::I4(b)) => a.same_bits(b),
                (Item::I8(a), Item::I8(b)) => a.same_bits(b),
                (Item::U2(a), Item::U2(b)) => a.same_bits(b),
                (Item::U4(a), Item::U4(b)) => a.same_bits(b),
                (Item::U8(a), Item::U8(b)) => a.same_bits(b),
                (Item::F4(a), Item::F4(b)) => a.same_bits(b),
                (Item::F8(a), Item::F8(b)) => a.same_bits(b),
                _ => false,
            };
            if !same {
                return false;
            }
        }
        true
    }

    /// 深度优先（先序）遍历本条目及全部后代。
    pub fn depth_first(&self) -> DepthFirst<'_> {
        DepthFirst {
            pending: vec![self],
        }
    }

    /// 本条目自身负载的字节数；列表返回子项数（列表长度字段的含义）。
    fn own_length(&self) -> usize {
        match self {
            Item::List(list) => list.len(),
            Item::Ascii(text) | Item::Jis8(text) => text.len(),
            Item::Binary(values) | Item::U1(values) => values.payload_len(),
            Item::Boolean(values) => values.payload_len(),
            Item::I1(values) => values.payload_len(),
            Item::I2(values) => values.payload_len(),
            Item::I4(values) => values.payload_len(),
            Item::I8(values) => values.payload_len(),
            Item::U2(values) => values.payload_len(),
            Item::U4(values) => values.payload_len(),
            Item::U8(values) => values.payload_len(),
            Item::F4(values) => values.payload_len(),
            Item::F8(values) => values.payload_len(),
        }
    }

    /// 写入本条目的头与负载；列表只写头，子项由调用方继续深度优先写出。
    fn write_own(&self, buf: &mut BytesMut) -> Result<()> {
        let length = self.own_length();
        put_item_header(buf, self.format(), length)?;
        match self {
            Item::List(_) => {}
            Item::Ascii(text) => text.write_ascii(buf),
            Item::Jis8(text) => text.write_jis8(buf),
            Item::Binary(values) | Item::U1(values) => values.write_payload(buf),
            Item::Boolean(values) => values.write_payload(buf),
            Item::I1(values) => values.write_payload(buf),
            Item::I2(values) => values.write_payload(buf),
            Item::I4(values) => values.write_payload(buf),
            Item::I8(values) => values.write_payload(buf),
            Item::U2(values) => values.write_payload(buf),
            Item::U4(values) => values.write_payload(buf),
            Item::U8(values) => values.write_payload(buf),
            Item::F4(values) => values.write_payload(buf),
            Item::F8(values) => values.write_payload(buf),
        }
        Ok(())
    }

    /// 把完整编码追加到 `buf`。
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        for item in self.depth_first() {
            item.write_own(buf)?;
        }
        Ok(())
    }

    /// 返回连续的完整编码。
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf)?;
        Ok(buf.to_vec())
    }

    /// 深度优先地为每个条目追加一段编码（缓冲租借自 `pool`），返回追加的总字节数。
    pub fn encode_to(&self, pool: &BytePool, segments: &mut Vec<Bytes>) -> Result<usize> {
        let mut total = 0;
        for item in self.depth_first() {
            let own = item.own_length();
            let mut buf = pool.acquire(MAX_ITEM_HEADER_LEN + if item.is_list() { 0 } else { own });
            if let Err(err) = item.write_own(&mut buf) {
                pool.reclaim(buf);
                return Err(err);
            }
            total += buf.len();
            segments.push(buf.freeze());
        }
        Ok(total)
    }

    /// 从 `bytes` 开头解码一棵完整的条目树，返回条目与消耗的字节数。
    pub fn decode(bytes: &[u8]) -> Result<(Item, usize)> {
        decode_item_tree(bytes, &ItemPools::shared())
    }

    fn is_list(&self) -> bool {
        matches!(self, Item::List(_))
    }

    /// 单个条目的 SML 片段；列表只写开头的 `<L [n]`。
    fn fmt_own(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::List(list) => write!(f, "<L [{}]", list.len()),
            Item::Ascii(text) => write!(f, "<A [{}] {} >", text.len(), text.as_str()),
            Item::Jis8(text) => write!(f, "<J [{}] {} >", text.len(), text.as_str()),
            Item::Binary(values) => {
                write!(f, "<B [{}]", values.len())?;
                for byte in values.values() {
                    write!(f, " {:02X}", byte)?;
                }
                write!(f, " >")
            }
            Item::Boolean(values) => write_values(f, "Boolean", values.values()),
            Item::I1(values) => write_values(f, "I1", values.values()),
            Item::I2(values) => write_values(f, "I2", values.values()),
            Item::I4(values) => write_values(f, "I4", values.values()),
            Item::I8(values) => write_values(f, "I8", values.values()),
            Item::U1(values) => write_values(f, "U1", values.values()),
            Item::U2(values) => write_values(f, "U2", values.values()),
            Item::U4(values) => write_values(f, "U4", values.values()),
            Item::U8(values) => write_values(f, "U8", values.values()),
            Item::F4(values) => write_values(f, "F4", values.values()),
            Item::F8(values) => write_values(f, "F8", values.values()),
        }
    }
}

/// [`Item::depth_first`] 返回的先序遍历器，以显式栈代替递归。
pub struct DepthFirst<'a> {
    pending: Vec<&'a Item>,
}

impl<'a> Iterator for DepthFirst<'a> {
    type Item = &'a Item;

    fn next(&mut self) -> Option<&'a Item> {
        let item = self.pending.pop()?;
        if let Item::List(list) = item {
            self.pending.extend(list.items().iter().rev());
        }
        Some(item)
    }
}

fn write_values<T: fmt::Display>(f: &mut fmt::Formatter<'_>, name: &str, values: &[T]) -> fmt::Result {
    write!(f, "<{} [{}]", name, values.len())?;
    for value in values {
        write!(f, " {}", value)?;
    }
    write!(f, " >")
}

enum SmlStep<'a> {
    Open(&'a Item, usize),
    Close(usize),
}

/// SML 文本：每层缩进 2 个空格，列表子项各占一行。
impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pending = vec![SmlStep::Open(self, 0)];
        while let Some(step) = pending.pop() {
            match step {
                SmlStep::Open(item, depth) => {
                    let indent = depth * 2;
                    write!(f, "{:indent$}", "")?;
                    item.fmt_own(f)?;
                    if let Item::List(list) = item {
                        writeln!(f)?;
                        pending.push(SmlStep::Close(depth));
                        pending.extend(
                            list.items()
                                .iter()
                                .rev()
                                .map(|child| SmlStep::Open(child, depth + 1)),
                        );
                    } else if depth > 0 {
                        writeln!(f)?;
                    }
                }
                SmlStep::Close(depth) => {
                    let indent = depth * 2;
                    write!(f, "{:indent$}>", "")?;
                    if depth > 0 {
                        writeln!(f)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Ascii(text) => f.debug_tuple("Ascii").field(&text.as_str()).finish(),
            Item::Jis8(text) => f.debug_tuple("Jis8").field(&text.as_str()).finish(),
            other => write!(f, "{}", other),
        }
    }
}

/// 写入条目头：格式字节低 2 位为长度字节数，随后是大端长度。
///
/// 长度 ≤ 255 用 1 字节，≤ 65535 用 2 字节，≤ 16777215 用 3 字节；再大则 `PayloadTooLarge`。
pub(crate) fn put_item_header(buf: &mut BytesMut, format: SecsFormat, length: usize) -> Result<()> {
    let length_bytes = length_bytes_for(length)?;
    buf.put_u8(format.code() | length_bytes as u8);
    buf.put_uint(length as u64, length_bytes);
    Ok(())
}

pub(crate) fn length_bytes_for(length: usize) -> Result<usize> {
    match length {
        0..=0xFF => Ok(1),
        0x100..=0xFFFF => Ok(2),
        0x1_0000..=MAX_PAYLOAD_LEN => Ok(3),
        _ => Err(SecsError::PayloadTooLarge { length }),
    }
}

/// 拆分格式字节，长度字节数为 0 视为协议违规。
pub(crate) fn split_tag(tag: u8) -> Result<(SecsFormat, usize)> {
    let format = SecsFormat::from_tag(tag)?;
    let length_bytes = usize::from(tag & LENGTH_BITS_MASK);
    if length_bytes == 0 {
        return Err(SecsError::protocol(format!(
            "item {} declares zero length bytes",
            format
        )));
    }
    Ok((format, length_bytes))
}

/// 把 1..=3 字节大端长度读入每次都从 0 开始的整数。
pub(crate) fn read_length(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .fold(0usize, |acc, byte| (acc << 8) | usize::from(*byte))
}

/// 按格式解码标量负载；数组负载必须是元素宽度的整数倍。
pub(crate) fn decode_scalar(format: SecsFormat, payload: &[u8], pools: &ItemPools) -> Result<Item> {
    if let Some(width) = format.element_width()
        && payload.len() % width != 0
    {
        return Err(SecsError::protocol(format!(
            "{} payload of {} bytes is not a multiple of element width {}",
            format,
            payload.len(),
            width
        )));
    }
    let item = match format {
        SecsFormat::List => {
            return Err(SecsError::protocol("list item has no scalar payload"));
        }
        SecsFormat::Ascii => Item::Ascii(StringItem::decode_ascii(payload)),
        SecsFormat::Jis8 => Item::Jis8(StringItem::decode_jis8(payload)),
        SecsFormat::Binary => Item::Binary(ValueItem::decode(payload, pools)),
        SecsFormat::Boolean => Item::Boolean(ValueItem::decode(payload, pools)),
        SecsFormat::I1 => Item::I1(ValueItem::decode(payload, pools)),
        SecsFormat::I2 => Item::I2(ValueItem::decode(payload, pools)),
        SecsFormat::I4 => Item::I4(ValueItem::decode(payload, pools)),
        SecsFormat::I8 => Item::I8(ValueItem::decode(payload, pools)),
        SecsFormat::U1 => Item::U1(ValueItem::decode(payload, pools)),
        SecsFormat::U2 => Item::U2(ValueItem::decode(payload, pools)),
        SecsFormat::U4 => Item::U4(ValueItem::decode(payload, pools)),
        SecsFormat::U8 => Item::U8(ValueItem::decode(payload, pools)),
        SecsFormat::F4 => Item::F4(ValueItem::decode(payload, pools)),
        SecsFormat::F8 => Item::F8(ValueItem::decode(payload, pools)),
    };
    Ok(item)
}

/// 一次性解码完整的条目树（字节已全部到达时的快速路径）。
///
/// 深度优先遍历，但嵌套列表同样交给 [`ListAssembler`] 的显式栈，深层嵌套不会耗尽调用栈。
pub(crate) fn decode_item_tree(bytes: &[u8], pools: &ItemPools) -> Result<(Item, usize)> {
    let mut assembler = ListAssembler::default();
    let mut index = 0usize;
    loop {
        let tag = *bytes
            .get(index)
            .ok_or_else(|| SecsError::protocol("item tree truncated before format byte"))?;
        let (format, length_bytes) = split_tag(tag)?;
        index += 1;
        let length_field = bytes
            .get(index..index + length_bytes)
            .ok_or_else(|| SecsError::protocol("item tree truncated inside length field"))?;
        let length = read_length(length_field);
        index += length_bytes;

        let item = if format == SecsFormat::List {
            if length > 0 {
                assembler.open(length, pools)?;
                continue;
            }
            Item::empty_list()
        } else {
            let payload = bytes.get(index..index + length).ok_or_else(|| {
                SecsError::protocol(format!(
                    "{} item declares {} bytes but only {} remain",
                    format,
                    length,
                    bytes.len() - index
                ))
            })?;
            index += length;
            decode_scalar(format, payload, pools)?
        };

        if let Some(root) = assembler.complete(item)? {
            return Ok((root, index));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_items_encode_as_header_and_zero_length() {
        assert_eq!(Item::ascii("").encode().unwrap(), vec![0x41, 0x00]);
        assert_eq!(Item::u4(&[]).encode().unwrap(), vec![0xB1, 0x00]);
        assert_eq!(Item::empty_list().encode().unwrap(), vec![0x01, 0x00]);
    }

    #[test]
    fn list_header_counts_children_not_bytes() {
        let item = Item::list(vec![Item::ascii("ab"), Item::u2(&[1])]).unwrap();
        assert_eq!(
            item.encode().unwrap(),
            vec![0x01, 0x02, 0x41, 0x02, b'a', b'b', 0xA9, 0x02, 0x00, 0x01]
        );
    }

    #[test]
    fn length_bytes_follow_boundaries() {
        assert_eq!(length_bytes_for(255), Ok(1));
        assert_eq!(length_bytes_for(256), Ok(2));
        assert_eq!(length_bytes_for(65535), Ok(2));
        assert_eq!(length_bytes_for(65536), Ok(3));
        assert_eq!(length_bytes_for(MAX_PAYLOAD_LEN), Ok(3));
        assert_eq!(
            length_bytes_for(MAX_PAYLOAD_LEN + 1),
            Err(SecsError::PayloadTooLarge {
                length: MAX_PAYLOAD_LEN + 1
            })
        );
    }

    #[test]
    fn three_byte_length_is_read_big_endian() {
        assert_eq!(read_length(&[0x01, 0x00, 0x00]), 65536);
        assert_eq!(read_length(&[0x12, 0x34]), 0x1234);
        assert_eq!(read_length(&[0x07]), 7);
    }

    #[test]
    fn accessors_reject_wrong_variant() {
        let item = Item::u1(&[1, 2]);
        assert!(matches!(
            item.items(),
            Err(SecsError::UnsupportedOperation { operation: "items", format: SecsFormat::U1 })
        ));
        assert!(item.as_str().is_err());
        assert!(item.values::<u16>().is_err());
        assert_eq!(item.first_value::<u8>(), Ok(Some(1)));
        assert_eq!(Item::binary(&[0xAA]).values::<u8>().unwrap(), &[0xAA]);
    }

    #[test]
    fn zero_length_bits_are_rejected() {
        let err = Item::decode(&[0x40, 0x00]).unwrap_err();
        assert_eq!(err.code(), crate::error::codes::PROTOCOL_VIOLATION);
    }

    #[test]
    fn misaligned_numeric_payload_is_rejected() {
        let err = Item::decode(&[0xA9, 0x03, 0, 1, 2]).unwrap_err();
        assert!(matches!(err, SecsError::ProtocolViolation { .. }));
    }

    #[test]
    fn display_renders_nested_tree() {
        let item = Item::list(vec![Item::ascii("OK"), Item::binary(&[0x0A, 0xFF])]).unwrap();
        assert_eq!(
            item.to_string(),
            "<L [2]\n  <A [2] OK >\n  <B [2] 0A FF >\n>"
        );
    }

    #[test]
    fn segments_follow_depth_first_order() {
        let pools = ItemPools::shared();
        let item = Item::list(vec![Item::u1(&[1]), Item::list(vec![Item::ascii("x")]).unwrap()])
            .unwrap();
        let mut segments = Vec::new();
        let total = item.encode_to(pools.bytes(), &mut segments).unwrap();
        assert_eq!(segments.len(), 4);
        assert_eq!(&segments[0][..], &[0x01, 0x02]);
        assert_eq!(&segments[1][..], &[0xA5, 0x01, 0x01]);
        assert_eq!(&segments[2][..], &[0x01, 0x01]);
        assert_eq!(&segments[3][..], &[0x41, 0x01, b'x']);
        assert_eq!(total, item.encode().unwrap().len());
    }
}
