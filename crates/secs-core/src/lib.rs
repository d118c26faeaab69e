//! `secs-core` 实现 SECS-II 条目编解码与 HSMS 报文的增量流式解码。
//!
//! # 模块定位（Why）
//! - 设备与主机之间交换嵌套、自描述的二进制条目，报文经流式传输以任意大小的字节块到达；
//! - 收发两条路径在高消息速率下并发运行，条目数组与编码缓冲需复用以避免分配风暴；
//! - 往返编解码必须保持格式码、元素个数与字节序不变。
//!
//! # 使用概览（How）
//! - [`Item`] 是封闭的条目枚举，提供构造、访问、通配匹配与编解码；
//! - [`StreamDecoder`] 消费调用方写入的字节块，通过 [`MessageSink`] 交付完整报文；
//! - [`MessageEncoder`] 把报文编码为分散写字节段（[`EncodedMessage`]）；
//! - [`PrimaryMessageWrapper`] 为收到的主报文提供至多一次回复。
//!
//! # 合约说明（What）
//! - 解码器不做 I/O，也不做内部同步：每条连接由单一线程驱动；
//! - 池由 [`ItemPools`] 聚合，可被收发线程并发共享；
//! - 线路错误以 [`SecsError::ProtocolViolation`] 报告，对当前流是致命的。
//!
//! # 风险提示（Trade-offs）
//! - 报文总长度来自对端声明，工作缓冲会按声明扩容；需要限制单报文大小的宿主应在传输层先行拦截。

pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod format;
pub mod header;
pub mod item;
mod jis8;
pub mod message;
pub mod pools;
pub mod reply;

pub use config::{DecoderConfig, PoolConfig, PoolOrder, SecsConfig};
pub use decoder::{DecodedFrame, FnSink, MessageSink, StreamDecoder};
pub use encoder::{EncodedMessage, MessageEncoder, encode_frame};
pub use error::{Result, SecsError};
pub use format::SecsFormat;
pub use header::{MessageHeader, MessageType, SystemBytesGenerator};
pub use item::{DepthFirst, Item, ListItem, SecsValue, StringItem, ValueItem};
pub use message::SecsMessage;
pub use pools::ItemPools;
pub use reply::{EndpointHandle, EndpointId, EndpointRegistry, PrimaryMessageWrapper, ReplySender};
