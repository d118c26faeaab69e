use core::fmt;

use crate::item::Item;

/// SECS-II 数据报文：S/F、W-bit、可选名称与可选根条目。
///
/// 根条目为 `None` 表示仅含报文头的空体报文。释放报文即释放整棵条目树，
/// 子数组随之归还到各自的来源池。
#[derive(Debug)]
pub struct SecsMessage {
    pub stream: u8,
    pub function: u8,
    pub reply_expected: bool,
    pub name: Option<String>,
    item: Option<Item>,
}

impl SecsMessage {
    pub fn new(stream: u8, function: u8, reply_expected: bool) -> Self {
        Self {
            stream,
            function,
            reply_expected,
            name: None,
            item: None,
        }
    }

    pub fn with_item(mut self, item: Item) -> Self {
        self.item = Some(item);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn item(&self) -> Option<&Item> {
        self.item.as_ref()
    }

    /// 取走根条目，报文变为空体。
    pub fn take_item(&mut self) -> Option<Item> {
        self.item.take()
    }

    pub fn set_item(&mut self, item: Option<Item>) {
        self.item = item;
    }

    /// 模板匹配：S/F 必须相同；模板无条目时匹配任意报文体，否则按 [`Item::is_match`] 比较。
    pub fn is_match(&self, template: &SecsMessage) -> bool {
        if self.stream != template.stream || self.function != template.function {
            return false;
        }
        match (&self.item, &template.item) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(item), Some(target)) => item.is_match(target),
        }
    }
}

impl fmt::Display for SecsMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'S{}F{}'", self.stream, self.function)?;
        if self.reply_expected {
            f.write_str(" W")?;
        }
        if let Some(name) = &self.name {
            write!(f, " {}", name)?;
        }
        if let Some(item) = &self.item {
            write!(f, "\n{}", item)?;
        }
        f.write_str("\n.")
    }
}
