use bytes::{BufMut, BytesMut};

use crate::jis8;

/// 文本条目（ASCII 或 JIS8 共用同一形态）。
///
/// 两种字符集都是单字节编码，因此字符数即负载字节数，`len` 在构造时缓存。
#[derive(Clone, Debug, Default)]
pub struct StringItem {
    text: String,
    len: usize,
}

impl StringItem {
    pub(crate) fn new(text: String) -> Self {
        let len = text.chars().count();
        Self { text, len }
    }

    pub(crate) fn decode_ascii(payload: &[u8]) -> Self {
        Self {
            text: jis8::decode_ascii(payload),
            len: payload.len(),
        }
    }

    pub(crate) fn decode_jis8(payload: &[u8]) -> Self {
        Self {
            text: jis8::decode_jis8(payload),
            len: payload.len(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// 字符数（等于编码后的字节数）。
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn write_ascii(&self, buf: &mut BytesMut) {
        for ch in self.text.chars() {
            buf.put_u8(jis8::encode_ascii_char(ch));
        }
    }

    pub(crate) fn write_jis8(&self, buf: &mut BytesMut) {
        for ch in self.text.chars() {
            buf.put_u8(jis8::encode_jis8_char(ch));
        }
    }

    pub(crate) fn into_string(self) -> String {
        self.text
    }
}
