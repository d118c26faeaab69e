use core::fmt;

use secs_buffer::PooledArray;
use tracing::trace;

use crate::error::{Result, SecsError};
use crate::item::Item;
use crate::pools::ItemPools;

/// 列表长度字段只有 1 字节，子项数不得超过该值。
pub const MAX_LIST_LEN: usize = u8::MAX as usize;

/// 列表条目：独占子项数组，释放时子项经显式栈逐层拆解，数组归还来源池。
pub struct ListItem {
    items: PooledArray<Item>,
}

impl ListItem {
    pub(crate) fn new(items: PooledArray<Item>) -> Result<Self> {
        if items.len() > MAX_LIST_LEN {
            return Err(SecsError::protocol(format!(
                "list length {} out of range, max length: {}",
                items.len(),
                MAX_LIST_LEN
            )));
        }
        Ok(Self { items })
    }

    pub(crate) fn empty() -> Self {
        Self {
            items: PooledArray::unpooled(Vec::new()),
        }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn into_items(mut self) -> Vec<Item> {
        self.items.drain().collect()
    }
}

/// 子项经显式栈逐层拆解，释放占用的调用栈与嵌套深度无关。
impl Drop for ListItem {
    fn drop(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let mut pending: Vec<Item> = self.items.drain().collect();
        while let Some(mut item) = pending.pop() {
            if let Item::List(list) = &mut item {
                pending.extend(list.items.drain());
            }
        }
    }
}

impl fmt::Debug for ListItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListItem")
            .field("len", &self.items.len())
            .finish_non_exhaustive()
    }
}

/// 尚未收齐子项的列表帧。
struct ListFrame {
    expected: usize,
    children: PooledArray<Item>,
}

/// 以显式栈代替递归拼装嵌套列表。
///
/// # 执行逻辑（How）
/// - 遇到非空列表头时 [`ListAssembler::open`] 压入一帧，容量即声明的子项数；
/// - 每产出一个完整条目调用 [`ListAssembler::complete`]：追加到栈顶帧，栈顶收满则弹出并物化为
///   `List` 条目，再继续追加到新的栈顶，直至栈空；
/// - 栈为空时产出的条目即报文根条目。
///
/// 所有中间状态都保存在本结构中，解码可以在任意两个条目之间挂起并在下次收到字节时恢复。
#[derive(Default)]
pub(crate) struct ListAssembler {
    frames: Vec<ListFrame>,
}

impl ListAssembler {
    pub(crate) fn open(&mut self, expected: usize, pools: &ItemPools) -> Result<()> {
        if expected > MAX_LIST_LEN {
            return Err(SecsError::protocol(format!(
                "list header declares {} children, max length: {}",
                expected, MAX_LIST_LEN
            )));
        }
        self.frames.push(ListFrame {
            expected,
            children: pools.lists.rent(expected),
        });
        Ok(())
    }

    /// 提交一个完整条目；当它（或由它收尾的外层列表）成为根条目时返回 `Some`。
    pub(crate) fn complete(&mut self, item: Item) -> Result<Option<Item>> {
        let mut item = item;
        loop {
            let Some(top) = self.frames.last_mut() else {
                return Ok(Some(item));
            };
            top.children.push(item);
            let Some(frame) = self
                .frames
                .pop_if(|frame| frame.children.len() >= frame.expected)
            else {
                return Ok(None);
            };
            item = Item::List(ListItem::new(frame.children)?);
            trace!(count = item.count(), depth = self.frames.len(), "list completed");
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }
}
