//! HSMS 10 字节报文头。
//!
//! # 线路布局
//! ```text
//! 0..2   device id（大端 u16）
//! 2      stream | W-bit (0x80)
//! 3      function
//! 4      PType，恒为 0（SECS-II）
//! 5      SType
//! 6..10  system bytes（大端 u32）
//! ```

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Result, SecsError};

/// 报文头字节数。
pub const HEADER_LEN: usize = 10;

const REPLY_EXPECTED_BIT: u8 = 0b1000_0000;

/// HSMS 报文类型（SType）。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    #[default]
    Data = 0,
    SelectRequest = 1,
    SelectResponse = 2,
    LinkTestRequest = 5,
    LinkTestResponse = 6,
    SeparateRequest = 9,
}

impl MessageType {
    pub fn name(self) -> &'static str {
        match self {
            MessageType::Data => "data.message",
            MessageType::SelectRequest => "select.req",
            MessageType::SelectResponse => "select.rsp",
            MessageType::LinkTestRequest => "linktest.req",
            MessageType::LinkTestResponse => "linktest.rsp",
            MessageType::SeparateRequest => "separate.req",
        }
    }

    /// 除 `Data` 外均为控制报文，不携带条目体。
    pub fn is_control(self) -> bool {
        self != MessageType::Data
    }
}

impl TryFrom<u8> for MessageType {
    type Error = SecsError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(MessageType::Data),
            1 => Ok(MessageType::SelectRequest),
            2 => Ok(MessageType::SelectResponse),
            5 => Ok(MessageType::LinkTestRequest),
            6 => Ok(MessageType::LinkTestResponse),
            9 => Ok(MessageType::SeparateRequest),
            other => Err(SecsError::UnknownControlMessageType(other)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// HSMS 报文头。
///
/// 值类型；`stream` 只保留低 7 位，最高位由 `reply_expected` 表达。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MessageHeader {
    pub device_id: u16,
    pub reply_expected: bool,
    pub stream: u8,
    pub function: u8,
    pub message_type: MessageType,
    pub system_bytes: u32,
}

impl MessageHeader {
    /// 数据报文头。
    pub fn data(
        device_id: u16,
        stream: u8,
        function: u8,
        reply_expected: bool,
        system_bytes: u32,
    ) -> Self {
        Self {
            device_id,
            reply_expected,
            stream: stream & !REPLY_EXPECTED_BIT,
            function,
            message_type: MessageType::Data,
            system_bytes,
        }
    }

    /// 控制报文头：device id 取 0xFFFF，S/F 为 0。
    pub fn control(message_type: MessageType, system_bytes: u32) -> Self {
        Self {
            device_id: 0xFFFF,
            reply_expected: false,
            stream: 0,
            function: 0,
            message_type,
            system_bytes,
        }
    }

    pub fn is_control(&self) -> bool {
        self.message_type.is_control()
    }

    /// 从至少 10 字节的切片解析报文头。
    ///
    /// - 不足 10 字节或 PType 非 0 时返回 `ProtocolViolation`；
    /// - SType 不在支持集合内时返回 `UnknownControlMessageType`。
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let Some(raw) = bytes.first_chunk::<HEADER_LEN>() else {
            return Err(SecsError::protocol(format!(
                "message header requires {} bytes, got {}",
                HEADER_LEN,
                bytes.len()
            )));
        };
        if raw[4] != 0 {
            return Err(SecsError::protocol(format!(
                "unsupported presentation type {}",
                raw[4]
            )));
        }
        let message_type = MessageType::try_from(raw[5])?;
        Ok(Self {
            device_id: u16::from_be_bytes([raw[0], raw[1]]),
            reply_expected: raw[2] & REPLY_EXPECTED_BIT != 0,
            stream: raw[2] & !REPLY_EXPECTED_BIT,
            function: raw[3],
            message_type,
            system_bytes: u32::from_be_bytes([raw[6], raw[7], raw[8], raw[9]]),
        })
    }

    /// 编码为 10 字节；`decode(encode(h)) == h`。
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let device = self.device_id.to_be_bytes();
        let system = self.system_bytes.to_be_bytes();
        let stream = (self.stream & !REPLY_EXPECTED_BIT)
            | if self.reply_expected {
                REPLY_EXPECTED_BIT
            } else {
                0
            };
        [
            device[0],
            device[1],
            stream,
            self.function,
            0,
            self.message_type as u8,
            system[0],
            system[1],
            system[2],
            system[3],
        ]
    }
}

impl fmt::Display for MessageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_control() {
            return write!(f, "{} #{}", self.message_type, self.system_bytes);
        }
        write!(
            f,
            "S{}F{}{} dev={} #{}",
            self.stream,
            self.function,
            if self.reply_expected { " W" } else { "" },
            self.device_id,
            self.system_bytes
        )
    }
}

/// 单调递增（回绕）的 system bytes 生成器。
#[derive(Debug, Default)]
pub struct SystemBytesGenerator {
    next: AtomicU32,
}

impl SystemBytesGenerator {
    pub fn new(seed: u32) -> Self {
        Self {
            next: AtomicU32::new(seed),
        }
    }

    pub fn next_id(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn w_bit_is_split_from_stream() {
        let header = MessageHeader::decode(&[0, 1, 0x81, 13, 0, 0, 0, 0, 0, 42]).unwrap();
        assert_eq!(header.device_id, 1);
        assert!(header.reply_expected);
        assert_eq!(header.stream, 1);
        assert_eq!(header.function, 13);
        assert_eq!(header.message_type, MessageType::Data);
        assert_eq!(header.system_bytes, 42);
    }

    #[test]
    fn non_zero_ptype_is_a_violation() {
        let err = MessageHeader::decode(&[0, 0, 0, 0, 1, 0, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(err.code(), crate::error::codes::PROTOCOL_VIOLATION);
    }

    #[test]
    fn unknown_stype_is_reported_with_its_value() {
        let err = MessageHeader::decode(&[0, 0, 0, 0, 0, 3, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(err, SecsError::UnknownControlMessageType(3));
    }

    #[test]
    fn generator_wraps_around() {
        let generator = SystemBytesGenerator::new(u32::MAX);
        assert_eq!(generator.next_id(), u32::MAX);
        assert_eq!(generator.next_id(), 0);
    }
}
