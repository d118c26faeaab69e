//! HSMS 可恢复流式解码器。
//!
//! # 模块定位（Why）
//! - 传输层以任意大小的字节块交付数据，单条报文可能被切成任意多块，也可能一块包含多条报文；
//! - 解码器不做 I/O：调用方把新字节写入 [`StreamDecoder::writable`] 后调用
//!   [`StreamDecoder::decode`]，解码器推进状态机并通过 [`MessageSink`] 回调交付完整报文。
//!
//! # 状态机（How）
//! 0. 读 4 字节总长度；
//! 1. 读 10 字节报文头；空体报文立即交付，报文体已全部到达时走一次性快速路径；
//! 2. 读条目格式字节；
//! 3. 读 1..=3 字节条目长度；
//! 4. 读条目值：非空列表压入 [`ListAssembler`] 后回到步骤 2，标量条目等待负载到齐。
//!
//! 每个步骤在字节不足时报告还需多少字节（`need`），所有续跑状态都保存在结构体字段中。
//!
//! # 缓冲管理
//! 每次 `decode` 结束后：若已无未消费字节，偏移归零（下一步需求超过容量时扩容为 `need * 2`）；
//! 否则检查从写偏移到缓冲末尾的剩余容量能否容纳 `remain + need`，不能时要么扩容到
//! `max(剩余报文长度 / 2, remain + need) * 2`，要么把未消费尾部搬到缓冲起点。
//!
//! # 错误
//! 任何不一致都会中止整条流：解码器记录 `warn!` 日志、自行 [`StreamDecoder::reset`] 并返回错误，
//! 调用方通常应随之关闭连接。

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::config::DecoderConfig;
use crate::encoder::LENGTH_PREFIX_LEN;
use crate::error::{Result, SecsError};
use crate::format::SecsFormat;
use crate::header::{HEADER_LEN, MessageHeader};
use crate::item::{Item, ListAssembler, decode_item_tree, decode_scalar, read_length, split_tag};
use crate::message::SecsMessage;
use crate::pools::ItemPools;

/// 完整报文的接收方。
///
/// 回调在解码线程上同步执行，实现方不应长时间阻塞。
pub trait MessageSink {
    fn on_control_message(&mut self, header: MessageHeader);

    fn on_data_message(&mut self, header: MessageHeader, message: SecsMessage);
}

/// 以两个闭包实现的 [`MessageSink`]。
pub struct FnSink<C, D> {
    control: C,
    data: D,
}

impl<C, D> FnSink<C, D>
where
    C: FnMut(MessageHeader),
    D: FnMut(MessageHeader, SecsMessage),
{
    pub fn new(control: C, data: D) -> Self {
        Self { control, data }
    }
}

impl<C, D> MessageSink for FnSink<C, D>
where
    C: FnMut(MessageHeader),
    D: FnMut(MessageHeader, SecsMessage),
{
    fn on_control_message(&mut self, header: MessageHeader) {
        (self.control)(header)
    }

    fn on_data_message(&mut self, header: MessageHeader, message: SecsMessage) {
        (self.data)(header, message)
    }
}

/// 解码产物，供收集型接收方使用。
#[derive(Debug)]
pub enum DecodedFrame {
    Control(MessageHeader),
    Data(MessageHeader, SecsMessage),
}

impl MessageSink for Vec<DecodedFrame> {
    fn on_control_message(&mut self, header: MessageHeader) {
        self.push(DecodedFrame::Control(header));
    }

    fn on_data_message(&mut self, header: MessageHeader, message: SecsMessage) {
        self.push(DecodedFrame::Data(header, message));
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DecodeStep {
    TotalLength,
    Header,
    ItemTag,
    ItemLength,
    ItemValue,
}

enum Progress {
    Advance(DecodeStep),
    Suspend(usize),
}

fn shortfall(available: usize, required: usize) -> Option<usize> {
    (available < required).then(|| required - available)
}

/// 单连接、单消费者的流式解码器。
pub struct StreamDecoder<S> {
    buffer: Vec<u8>,
    buffer_offset: usize,
    decode_index: usize,
    previous_remained: usize,
    step: DecodeStep,
    message_data_length: usize,
    header: MessageHeader,
    format: SecsFormat,
    length_bits: usize,
    item_length: usize,
    max_message_length: usize,
    lists: ListAssembler,
    pools: Arc<ItemPools>,
    sink: S,
}

impl<C, D> StreamDecoder<FnSink<C, D>>
where
    C: FnMut(MessageHeader),
    D: FnMut(MessageHeader, SecsMessage),
{
    /// 以控制报文/数据报文两个回调构造解码器。
    pub fn with_handlers(
        config: &DecoderConfig,
        pools: Arc<ItemPools>,
        control: C,
        data: D,
    ) -> Result<Self> {
        Self::new(config, pools, FnSink::new(control, data))
    }
}

impl<S: MessageSink> StreamDecoder<S> {
    pub fn new(config: &DecoderConfig, pools: Arc<ItemPools>, sink: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            buffer: vec![0; config.initial_buffer_size],
            buffer_offset: 0,
            decode_index: 0,
            previous_remained: 0,
            step: DecodeStep::TotalLength,
            message_data_length: 0,
            header: MessageHeader::default(),
            format: SecsFormat::List,
            length_bits: 0,
            item_length: 0,
            max_message_length: config.max_message_length.unwrap_or(usize::MAX),
            lists: ListAssembler::default(),
            pools,
            sink,
        })
    }

    /// 整个工作缓冲。
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// 新字节的写入起点。
    pub fn buffer_offset(&self) -> usize {
        self.buffer_offset
    }

    /// 从写入起点到缓冲末尾的可写字节数，始终大于 0。
    pub fn buffer_count(&self) -> usize {
        self.buffer.len() - self.buffer_offset
    }

    /// 可写区域，等价于 `&mut buffer_mut()[buffer_offset()..]`。
    pub fn writable(&mut self) -> &mut [u8] {
        &mut self.buffer[self.buffer_offset..]
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// 处理刚写入可写区域的 `count` 个字节。
    ///
    /// 返回 `true` 表示当前报文尚未完整，需要更多字节；返回错误时解码器已被重置。
    pub fn decode(&mut self, count: usize) -> Result<bool> {
        if count > self.buffer_count() {
            let err = SecsError::protocol(format!(
                "chunk of {} bytes overruns {} writable bytes",
                count,
                self.buffer_count()
            ));
            warn!(code = err.code(), count, writable = self.buffer_count(), "stream decode rejected");
            self.reset();
            return Err(err);
        }

        let mut available = count + self.previous_remained;
        let need = match self.drive(&mut available) {
            Ok(need) => need,
            Err(err) => {
                warn!(
                    code = err.code(),
                    error = %err,
                    step = ?self.step,
                    "stream decode aborted"
                );
                self.reset();
                return Err(err);
            }
        };
        trace!(remaining = available, need, "decode pass finished");
        self.manage_buffer(count, available, need);
        Ok(self.message_data_length > 0)
    }

    /// 把 `bytes` 分批拷入可写区域并逐批解码，返回最后一次 `decode` 的结果。
    pub fn feed(&mut self, bytes: &[u8]) -> Result<bool> {
        let mut rest = bytes;
        let mut needs_more = self.message_data_length > 0;
        while !rest.is_empty() {
            let take = rest.len().min(self.buffer_count());
            self.writable()[..take].copy_from_slice(&rest[..take]);
            needs_more = self.decode(take)?;
            rest = &rest[take..];
        }
        Ok(needs_more)
    }

    /// 清空全部解码状态；未完成的列表帧随之释放，工作缓冲保留当前容量。
    pub fn reset(&mut self) {
        self.lists.clear();
        self.step = DecodeStep::TotalLength;
        self.decode_index = 0;
        self.buffer_offset = 0;
        self.message_data_length = 0;
        self.previous_remained = 0;
    }

    fn drive(&mut self, available: &mut usize) -> Result<usize> {
        loop {
            match self.run_step(available)? {
                Progress::Advance(next) => self.step = next,
                Progress::Suspend(need) => return Ok(need),
            }
        }
    }

    fn run_step(&mut self, available: &mut usize) -> Result<Progress> {
        match self.step {
            DecodeStep::TotalLength => self.read_total_length(available),
            DecodeStep::Header => self.read_header(available),
            DecodeStep::ItemTag => self.read_item_tag(available),
            DecodeStep::ItemLength => self.read_item_length(available),
            DecodeStep::ItemValue => self.read_item_value(available),
        }
    }

    fn read_total_length(&mut self, available: &mut usize) -> Result<Progress> {
        if let Some(need) = shortfall(*available, LENGTH_PREFIX_LEN) {
            return Ok(Progress::Suspend(need));
        }
        let start = self.decode_index;
        let length = read_length(&self.buffer[start..start + LENGTH_PREFIX_LEN]);
        if length < HEADER_LEN {
            return Err(SecsError::protocol(format!(
                "message length {} is shorter than the {} byte header",
                length, HEADER_LEN
            )));
        }
        if length > self.max_message_length {
            return Err(SecsError::protocol(format!(
                "message length {} exceeds the configured limit of {} bytes",
                length, self.max_message_length
            )));
        }
        trace!(length, "message length");
        self.message_data_length = length;
        self.decode_index += LENGTH_PREFIX_LEN;
        *available -= LENGTH_PREFIX_LEN;
        Ok(Progress::Advance(DecodeStep::Header))
    }

    fn read_header(&mut self, available: &mut usize) -> Result<Progress> {
        if let Some(need) = shortfall(*available, HEADER_LEN) {
            return Ok(Progress::Suspend(need));
        }
        let start = self.decode_index;
        self.header = MessageHeader::decode(&self.buffer[start..start + HEADER_LEN])?;
        self.decode_index += HEADER_LEN;
        self.message_data_length -= HEADER_LEN;
        *available -= HEADER_LEN;

        if self.message_data_length == 0 {
            self.emit_empty();
            return Ok(Progress::Advance(DecodeStep::TotalLength));
        }
        if self.header.is_control() {
            return Err(SecsError::protocol(format!(
                "{} carries a {} byte body",
                self.header.message_type, self.message_data_length
            )));
        }

        if *available >= self.message_data_length {
            let start = self.decode_index;
            let body_len = self.message_data_length;
            let (item, consumed) =
                decode_item_tree(&self.buffer[start..start + body_len], &self.pools)?;
            if consumed != body_len {
                return Err(trailing_bytes(body_len - consumed));
            }
            trace!(header = %self.header, body_len, "message decoded from buffered body");
            self.decode_index += body_len;
            *available -= body_len;
            self.message_data_length = 0;
            self.emit_data(Some(item));
            return Ok(Progress::Advance(DecodeStep::TotalLength));
        }
        Ok(Progress::Advance(DecodeStep::ItemTag))
    }

    fn read_item_tag(&mut self, available: &mut usize) -> Result<Progress> {
        if self.message_data_length == 0 {
            return Err(SecsError::protocol(format!(
                "message body ended with {} unfinished list(s)",
                self.lists.depth()
            )));
        }
        if let Some(need) = shortfall(*available, 1) {
            return Ok(Progress::Suspend(need));
        }
        let (format, length_bits) = split_tag(self.buffer[self.decode_index])?;
        self.format = format;
        self.length_bits = length_bits;
        self.decode_index += 1;
        self.message_data_length -= 1;
        *available -= 1;
        Ok(Progress::Advance(DecodeStep::ItemLength))
    }

    fn read_item_length(&mut self, available: &mut usize) -> Result<Progress> {
        if self.length_bits > self.message_data_length {
            return Err(SecsError::protocol(format!(
                "{} length field of {} bytes overruns the message body",
                self.format, self.length_bits
            )));
        }
        if let Some(need) = shortfall(*available, self.length_bits) {
            return Ok(Progress::Suspend(need));
        }
        let start = self.decode_index;
        self.item_length = read_length(&self.buffer[start..start + self.length_bits]);
        self.decode_index += self.length_bits;
        self.message_data_length -= self.length_bits;
        *available -= self.length_bits;

        if self.format != SecsFormat::List && self.item_length > self.message_data_length {
            return Err(SecsError::protocol(format!(
                "{} item declares {} bytes but the message body has {} left",
                self.format, self.item_length, self.message_data_length
            )));
        }
        trace!(format = %self.format, length = self.item_length, "item header");
        Ok(Progress::Advance(DecodeStep::ItemValue))
    }

    fn read_item_value(&mut self, available: &mut usize) -> Result<Progress> {
        let item = if self.format == SecsFormat::List {
            if self.item_length > 0 {
                self.lists.open(self.item_length, &self.pools)?;
                return Ok(Progress::Advance(DecodeStep::ItemTag));
            }
            Item::empty_list()
        } else {
            if let Some(need) = shortfall(*available, self.item_length) {
                return Ok(Progress::Suspend(need));
            }
            let start = self.decode_index;
            let length = self.item_length;
            let item = decode_scalar(self.format, &self.buffer[start..start + length], &self.pools)?;
            self.decode_index += length;
            self.message_data_length -= length;
            *available -= length;
            item
        };

        match self.lists.complete(item)? {
            Some(root) => {
                if self.message_data_length != 0 {
                    return Err(trailing_bytes(self.message_data_length));
                }
                trace!(header = %self.header, "message decoded from stream");
                self.emit_data(Some(root));
                Ok(Progress::Advance(DecodeStep::TotalLength))
            }
            None => Ok(Progress::Advance(DecodeStep::ItemTag)),
        }
    }

    fn emit_empty(&mut self) {
        if self.header.is_control() {
            trace!(header = %self.header, "control message");
            self.sink.on_control_message(self.header);
        } else {
            self.emit_data(None);
        }
    }

    fn emit_data(&mut self, item: Option<Item>) {
        let header = self.header;
        let mut message = SecsMessage::new(header.stream, header.function, header.reply_expected);
        message.set_item(item);
        self.sink.on_data_message(header, message);
    }

    fn manage_buffer(&mut self, current_len: usize, remain: usize, need: usize) {
        if remain == 0 {
            if need > self.buffer.len() {
                let new_size = need * 2;
                debug!(current = self.buffer.len(), new_size, "decoder buffer resized");
                self.buffer = vec![0; new_size];
            }
            self.buffer_offset = 0;
            self.decode_index = 0;
            self.previous_remained = 0;
            return;
        }

        self.buffer_offset += current_len;
        let required = remain + need;
        if required > self.buffer_count() {
            let tail = self.buffer_offset - remain;
            if required > self.buffer.len() {
                let new_size = (self.message_data_length / 2).max(required) * 2;
                debug!(
                    current = self.buffer.len(),
                    remained = remain,
                    new_size,
                    "decoder buffer resized"
                );
                let mut grown = vec![0; new_size];
                grown[..remain].copy_from_slice(&self.buffer[tail..self.buffer_offset]);
                self.buffer = grown;
            } else {
                debug!(
                    available = self.buffer_count(),
                    need = required,
                    remained = remain,
                    "decoder buffer recycled"
                );
                self.buffer.copy_within(tail..self.buffer_offset, 0);
            }
            self.buffer_offset = remain;
            self.decode_index = 0;
        }
        self.previous_remained = remain;
    }
}

fn trailing_bytes(count: usize) -> SecsError {
    SecsError::protocol(format!(
        "root item ended with {} unconsumed body byte(s)",
        count
    ))
}
