//! 解码器与池的配置项。
//!
//! 所有结构都实现 `serde` 的序列化/反序列化并带有 `#[serde(default)]`，
//! 宿主可以直接嵌入到自身的 TOML/JSON 配置文件中，只覆盖需要调整的字段。

use secs_buffer::PoolAccessMode;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SecsError};
use crate::header::HEADER_LEN;

/// 4 字节总长度 + 10 字节报文头。
pub const MIN_DECODER_BUFFER: usize = 14;

const DEFAULT_DECODER_BUFFER: usize = 4096;

/// 顶层配置。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecsConfig {
    pub decoder: DecoderConfig,
    pub pool: PoolConfig,
}

impl SecsConfig {
    pub fn validate(&self) -> Result<()> {
        self.decoder.validate()
    }
}

/// 流式解码器配置。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// 工作缓冲初始字节数；收到超出容量的报文时解码器自行扩容。
    pub initial_buffer_size: usize,
    /// 单条报文（不含 4 字节长度前缀）允许的最大字节数，`None` 表示不限制。
    pub max_message_length: Option<usize>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            initial_buffer_size: DEFAULT_DECODER_BUFFER,
            max_message_length: None,
        }
    }
}

impl DecoderConfig {
    pub fn with_initial_buffer_size(mut self, size: usize) -> Self {
        self.initial_buffer_size = size;
        self
    }

    pub fn with_max_message_length(mut self, limit: usize) -> Self {
        self.max_message_length = Some(limit);
        self
    }

    /// 缓冲至少要容纳长度前缀与报文头，报文上限至少要容纳报文头。
    pub fn validate(&self) -> Result<()> {
        if self.initial_buffer_size < MIN_DECODER_BUFFER {
            return Err(SecsError::InvalidConfiguration {
                detail: format!(
                    "decoder.initial_buffer_size {} is smaller than {} bytes",
                    self.initial_buffer_size, MIN_DECODER_BUFFER
                ),
            });
        }
        if let Some(limit) = self.max_message_length
            && limit < HEADER_LEN
        {
            return Err(SecsError::InvalidConfiguration {
                detail: format!(
                    "decoder.max_message_length {} cannot hold the {} byte header",
                    limit, HEADER_LEN
                ),
            });
        }
        Ok(())
    }
}

/// 池配置。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub access_mode: PoolOrder,
}

/// [`PoolAccessMode`] 的配置表示。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolOrder {
    #[default]
    Lifo,
    Fifo,
}

impl From<PoolOrder> for PoolAccessMode {
    fn from(order: PoolOrder) -> Self {
        match order {
            PoolOrder::Lifo => PoolAccessMode::Lifo,
            PoolOrder::Fifo => PoolAccessMode::Fifo,
        }
    }
}
