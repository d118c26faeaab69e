use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SecsError};

/// SECS-II 条目格式码。
///
/// 判别值即线路上格式字节的高 6 位（低 2 位为长度字节数，恒为 0）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SecsFormat {
    List = 0o00 << 2,
    Binary = 0o10 << 2,
    Boolean = 0o11 << 2,
    Ascii = 0o20 << 2,
    Jis8 = 0o21 << 2,
    I8 = 0o30 << 2,
    I1 = 0o31 << 2,
    I2 = 0o32 << 2,
    I4 = 0o34 << 2,
    F8 = 0o40 << 2,
    F4 = 0o44 << 2,
    U8 = 0o50 << 2,
    U1 = 0o51 << 2,
    U2 = 0o52 << 2,
    U4 = 0o54 << 2,
}

/// 格式字节低 2 位的掩码。
pub const LENGTH_BITS_MASK: u8 = 0b0000_0011;

impl SecsFormat {
    /// 从格式字节（忽略低 2 位）解析格式码。
    pub fn from_tag(tag: u8) -> Result<Self> {
        let format = match tag & !LENGTH_BITS_MASK {
            0x00 => SecsFormat::List,
            0x20 => SecsFormat::Binary,
            0x24 => SecsFormat::Boolean,
            0x40 => SecsFormat::Ascii,
            0x44 => SecsFormat::Jis8,
            0x60 => SecsFormat::I8,
            0x64 => SecsFormat::I1,
            0x68 => SecsFormat::I2,
            0x70 => SecsFormat::I4,
            0x80 => SecsFormat::F8,
            0x90 => SecsFormat::F4,
            0xA0 => SecsFormat::U8,
            0xA4 => SecsFormat::U1,
            0xA8 => SecsFormat::U2,
            0xB0 => SecsFormat::U4,
            other => {
                return Err(SecsError::protocol(format!(
                    "unrecognized item format code {:#04x}",
                    other
                )));
            }
        };
        Ok(format)
    }

    /// 格式码字节值。
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// 单个元素的字节宽度；列表返回 `None`，文本与二进制为 1。
    pub const fn element_width(self) -> Option<usize> {
        match self {
            SecsFormat::List => None,
            SecsFormat::Binary
            | SecsFormat::Boolean
            | SecsFormat::Ascii
            | SecsFormat::Jis8
            | SecsFormat::I1
            | SecsFormat::U1 => Some(1),
            SecsFormat::I2 | SecsFormat::U2 => Some(2),
            SecsFormat::I4 | SecsFormat::U4 | SecsFormat::F4 => Some(4),
            SecsFormat::I8 | SecsFormat::U8 | SecsFormat::F8 => Some(8),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SecsFormat::List => "List",
            SecsFormat::Binary => "Binary",
            SecsFormat::Boolean => "Boolean",
            SecsFormat::Ascii => "ASCII",
            SecsFormat::Jis8 => "JIS8",
            SecsFormat::I8 => "I8",
            SecsFormat::I1 => "I1",
            SecsFormat::I2 => "I2",
            SecsFormat::I4 => "I4",
            SecsFormat::F8 => "F8",
            SecsFormat::F4 => "F4",
            SecsFormat::U8 => "U8",
            SecsFormat::U1 => "U1",
            SecsFormat::U2 => "U2",
            SecsFormat::U4 => "U4",
        }
    }
}

impl fmt::Display for SecsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for SecsFormat {
    type Error = SecsError;

    fn try_from(tag: u8) -> Result<Self> {
        SecsFormat::from_tag(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SecsFormat; 15] = [
        SecsFormat::List,
        SecsFormat::Binary,
        SecsFormat::Boolean,
        SecsFormat::Ascii,
        SecsFormat::Jis8,
        SecsFormat::I8,
        SecsFormat::I1,
        SecsFormat::I2,
        SecsFormat::I4,
        SecsFormat::F8,
        SecsFormat::F4,
        SecsFormat::U8,
        SecsFormat::U1,
        SecsFormat::U2,
        SecsFormat::U4,
    ];

    #[test]
    fn tag_parsing_ignores_length_bits() {
        for format in ALL {
            for bits in 0..=3 {
                assert_eq!(SecsFormat::from_tag(format.code() | bits), Ok(format));
            }
        }
    }

    #[test]
    fn unknown_codes_are_protocol_violations() {
        let err = SecsFormat::from_tag(0x0C).unwrap_err();
        assert_eq!(err.code(), crate::error::codes::PROTOCOL_VIOLATION);
    }

    #[test]
    fn wire_codes_match_octal_table() {
        assert_eq!(SecsFormat::Ascii.code(), 0x40);
        assert_eq!(SecsFormat::U4.code(), 0xB0);
        assert_eq!(SecsFormat::F4.code(), 0x90);
    }
}
