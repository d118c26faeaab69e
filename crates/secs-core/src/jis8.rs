//! JIS8（JIS X 0201 8 位）与 ASCII 文本的字符集转换。
//!
//! - 0x00..=0x7F 与 ASCII 相同；
//! - 0xA1..=0xDF 映射到半角片假名 U+FF61..=U+FF9F；
//! - 其余字节无定义，解码为 U+FFFD；无法表示的字符编码为 `?`。

const KATAKANA_FIRST_BYTE: u8 = 0xA1;
const KATAKANA_LAST_BYTE: u8 = 0xDF;
const KATAKANA_FIRST_CHAR: u32 = 0xFF61;
const SUBSTITUTE: u8 = b'?';

pub(crate) fn decode_jis8(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&byte| match byte {
            0x00..=0x7F => char::from(byte),
            KATAKANA_FIRST_BYTE..=KATAKANA_LAST_BYTE => {
                char::from_u32(KATAKANA_FIRST_CHAR + u32::from(byte - KATAKANA_FIRST_BYTE))
                    .unwrap_or(char::REPLACEMENT_CHARACTER)
            }
            _ => char::REPLACEMENT_CHARACTER,
        })
        .collect()
}

pub(crate) fn encode_jis8_char(ch: char) -> u8 {
    let code = u32::from(ch);
    if code <= 0x7F {
        return code as u8;
    }
    let last = KATAKANA_FIRST_CHAR + u32::from(KATAKANA_LAST_BYTE - KATAKANA_FIRST_BYTE);
    if (KATAKANA_FIRST_CHAR..=last).contains(&code) {
        return KATAKANA_FIRST_BYTE + (code - KATAKANA_FIRST_CHAR) as u8;
    }
    SUBSTITUTE
}

pub(crate) fn decode_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&byte| if byte.is_ascii() { char::from(byte) } else { SUBSTITUTE as char })
        .collect()
}

pub(crate) fn encode_ascii_char(ch: char) -> u8 {
    if ch.is_ascii() { ch as u8 } else { SUBSTITUTE }
}
