//! 发送路径：把报文编码为可一次性分散写出的字节段序列。
//!
//! # 段布局（What）
//! - 第 0 段：4 字节大端总长度 + 10 字节报文头；
//! - 其后按深度优先顺序，每个条目一段（列表段仅含列表头）；
//! - 所有段的缓冲均租借自 [`ItemPools::bytes`]，[`EncodedMessage`] 释放时尝试归还。

use std::io::IoSlice;
use std::sync::Arc;

use bytes::{BufMut, Bytes};
use secs_buffer::BytePool;
use tracing::trace;

use crate::error::{Result, SecsError};
use crate::header::{HEADER_LEN, MessageHeader};
use crate::item::Item;
use crate::message::SecsMessage;
use crate::pools::ItemPools;

/// 长度前缀字节数。
pub const LENGTH_PREFIX_LEN: usize = 4;

/// 编码完成、等待写出的报文。
pub struct EncodedMessage {
    segments: Vec<Bytes>,
    total_len: usize,
    pool: BytePool,
}

impl EncodedMessage {
    pub fn segments(&self) -> &[Bytes] {
        &self.segments
    }

    /// 含长度前缀的总字节数。
    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// 供 `write_vectored` 使用的分散写视图。
    pub fn io_slices(&self) -> Vec<IoSlice<'_>> {
        self.segments.iter().map(|s| IoSlice::new(s)).collect()
    }

    /// 拼接为连续字节。
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len);
        for segment in &self.segments {
            out.extend_from_slice(segment);
        }
        out
    }
}

impl Drop for EncodedMessage {
    fn drop(&mut self) {
        for segment in self.segments.drain(..) {
            self.pool.reclaim_frozen(segment);
        }
    }
}

impl core::fmt::Debug for EncodedMessage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EncodedMessage")
            .field("segments", &self.segments.len())
            .field("total_len", &self.total_len)
            .finish()
    }
}

/// 报文编码器，绑定设备号与池集合。
#[derive(Clone, Debug)]
pub struct MessageEncoder {
    device_id: u16,
    pools: Arc<ItemPools>,
}

impl MessageEncoder {
    pub fn new(device_id: u16, pools: Arc<ItemPools>) -> Self {
        Self { device_id, pools }
    }

    pub fn device_id(&self) -> u16 {
        self.device_id
    }

    /// 编码数据报文；报文仍归调用方所有。
    pub fn encode_data(&self, message: &SecsMessage, system_bytes: u32) -> Result<EncodedMessage> {
        let header = MessageHeader::data(
            self.device_id,
            message.stream,
            message.function,
            message.reply_expected,
            system_bytes,
        );
        encode_frame(&header, message.item(), self.pools.bytes())
    }

    /// 编码数据报文并接管其所有权。
    ///
    /// `auto_dispose` 为真时报文在段生成后立即释放（条目数组归还池），返回 `None`；
    /// 否则把报文交还调用方。
    pub fn encode_owned(
        &self,
        message: SecsMessage,
        system_bytes: u32,
        auto_dispose: bool,
    ) -> Result<(EncodedMessage, Option<SecsMessage>)> {
        let encoded = self.encode_data(&message, system_bytes)?;
        if auto_dispose {
            drop(message);
            return Ok((encoded, None));
        }
        Ok((encoded, Some(message)))
    }

    /// 编码控制报文（无报文体）。
    pub fn encode_control(&self, header: &MessageHeader) -> Result<EncodedMessage> {
        encode_frame(header, None, self.pools.bytes())
    }
}

/// 编码一帧：长度前缀 + 报文头 + 深度优先的条目段。
pub fn encode_frame(header: &MessageHeader, item: Option<&Item>, pool: &BytePool) -> Result<EncodedMessage> {
    let mut item_segments = Vec::new();
    let mut body_len = HEADER_LEN;
    if let Some(item) = item {
        match item.encode_to(pool, &mut item_segments) {
            Ok(written) => body_len += written,
            Err(err) => {
                for segment in item_segments {
                    pool.reclaim_frozen(segment);
                }
                return Err(err);
            }
        }
    }
    let Ok(prefix_len) = u32::try_from(body_len) else {
        for segment in item_segments {
            pool.reclaim_frozen(segment);
        }
        return Err(SecsError::PayloadTooLarge { length: body_len });
    };

    let mut prefix = pool.acquire(LENGTH_PREFIX_LEN + HEADER_LEN);
    prefix.put_u32(prefix_len);
    prefix.put_slice(&header.encode());

    let mut segments = Vec::with_capacity(item_segments.len() + 1);
    segments.push(prefix.freeze());
    segments.extend(item_segments);
    trace!(
        header = %header,
        segments = segments.len(),
        body_len,
        "message encoded"
    );
    Ok(EncodedMessage {
        segments,
        total_len: LENGTH_PREFIX_LEN + body_len,
        pool: pool.clone(),
    })
}
