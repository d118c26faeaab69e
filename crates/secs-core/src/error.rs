//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义编解码、报文头与回复路径上的错误语义；
//! - 区分“线路错误”（必须断开或重置连接）与“本地契约错误”（调用方编程错误）。
//!
//! ## 设计要求（What）
//! - 所有错误派生 `thiserror::Error`，可直接 `?` 传播；
//! - 每个变体映射到稳定的点分错误码（见 [`codes`]），便于日志与告警聚合。

use thiserror::Error;

use crate::format::SecsFormat;

/// 稳定错误码常量。
pub mod codes {
    pub const PROTOCOL_VIOLATION: &str = "secs.protocol.violation";
    pub const PAYLOAD_TOO_LARGE: &str = "secs.encode.payload_too_large";
    pub const UNSUPPORTED_OPERATION: &str = "secs.item.unsupported_operation";
    pub const UNKNOWN_CONTROL_MESSAGE: &str = "secs.header.unknown_control_message";
    pub const INVALID_CONFIGURATION: &str = "secs.config.invalid";
    pub const ENDPOINT_UNAVAILABLE: &str = "secs.reply.endpoint_unavailable";
}

/// SECS-II/HSMS 核心错误域。
///
/// # 契约说明
/// - [`SecsError::ProtocolViolation`]：线路上出现畸形长度或格式，或构造了超过 255 个子项的列表；
///   对解码流是致命的，调用方应重置解码器并通常关闭连接；
/// - [`SecsError::PayloadTooLarge`]：负载超过 3 字节长度字段上限，仅使本次编码失败；
/// - [`SecsError::UnsupportedOperation`]：对错误的条目变体调用访问器；
/// - [`SecsError::UnknownControlMessageType`]：SType 不在支持集合内；
/// - [`SecsError::EndpointUnavailable`]：回复句柄指向的端点已从注册表注销。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SecsError {
    #[error("protocol violation: {detail}")]
    ProtocolViolation { detail: String },

    #[error("item payload of {length} bytes exceeds the 3-byte length field limit")]
    PayloadTooLarge { length: usize },

    #[error("`{operation}` is not supported by {format} item")]
    UnsupportedOperation {
        operation: &'static str,
        format: SecsFormat,
    },

    #[error("unknown control message type (SType = {0})")]
    UnknownControlMessageType(u8),

    #[error("invalid configuration: {detail}")]
    InvalidConfiguration { detail: String },

    #[error("reply endpoint unavailable: {detail}")]
    EndpointUnavailable { detail: String },
}

impl SecsError {
    /// 构造协议违规错误。
    pub fn protocol(detail: impl Into<String>) -> Self {
        SecsError::ProtocolViolation {
            detail: detail.into(),
        }
    }

    pub(crate) fn unsupported(operation: &'static str, format: SecsFormat) -> Self {
        SecsError::UnsupportedOperation { operation, format }
    }

    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            SecsError::ProtocolViolation { .. } => codes::PROTOCOL_VIOLATION,
            SecsError::PayloadTooLarge { .. } => codes::PAYLOAD_TOO_LARGE,
            SecsError::UnsupportedOperation { .. } => codes::UNSUPPORTED_OPERATION,
            SecsError::UnknownControlMessageType(_) => codes::UNKNOWN_CONTROL_MESSAGE,
            SecsError::InvalidConfiguration { .. } => codes::INVALID_CONFIGURATION,
            SecsError::EndpointUnavailable { .. } => codes::ENDPOINT_UNAVAILABLE,
        }
    }

    /// 是否要求调用方丢弃当前解码流。
    pub fn is_fatal_to_stream(&self) -> bool {
        matches!(
            self,
            SecsError::ProtocolViolation { .. } | SecsError::UnknownControlMessageType(_)
        )
    }
}

/// crate 级 `Result` 别名。
pub type Result<T, E = SecsError> = core::result::Result<T, E>;
