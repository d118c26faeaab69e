//! 主报文包装与至多一次回复。
//!
//! # 设计概要（Why / How）
//! - 包装器不持有发送端点：它只保存 [`EndpointHandle`]（注册表 + 端点 id），回复时按 id 查找；
//!   端点注销后，遗留的包装器只会得到 `Ok(false)`；
//! - “至多一次”由单个原子 compare-and-set 保证，回复路径不加锁；
//! - 回复报文所有权交给端点，未发送的回复在返回前即被释放，条目数组归还池。

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::error::{Result, SecsError};
use crate::header::{HEADER_LEN, MessageHeader};
use crate::item::Item;
use crate::message::SecsMessage;

/// S9F7：无法识别的报文。
const UNKNOWN_MESSAGE_STREAM: u8 = 9;
const UNKNOWN_MESSAGE_FUNCTION: u8 = 7;

/// 能够发送回复的端点（通常是一条 HSMS 连接）。
pub trait ReplySender: Send + Sync {
    /// 以给定 system bytes 发送回复；报文所有权随调用转移。
    fn send_reply(&self, message: SecsMessage, system_bytes: u32) -> Result<()>;

    /// 分配新的 system bytes。
    fn new_system_id(&self) -> u32;
}

/// 注册表内的端点标识。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(u64);

impl EndpointId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint#{}", self.0)
    }
}

/// 端点注册表，连接建立时登记、断开时注销。
#[derive(Default)]
pub struct EndpointRegistry {
    endpoints: DashMap<EndpointId, Arc<dyn ReplySender>>,
    next_id: AtomicU64,
}

impl EndpointRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, sender: Arc<dyn ReplySender>) -> EndpointId {
        let id = EndpointId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.endpoints.insert(id, sender);
        debug!(endpoint = %id, "endpoint registered");
        id
    }

    pub fn unregister(&self, id: EndpointId) -> Option<Arc<dyn ReplySender>> {
        let removed = self.endpoints.remove(&id).map(|(_, sender)| sender);
        if removed.is_some() {
            debug!(endpoint = %id, "endpoint unregistered");
        }
        removed
    }

    pub fn get(&self, id: EndpointId) -> Option<Arc<dyn ReplySender>> {
        self.endpoints.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("endpoints", &self.endpoints.len())
            .finish()
    }
}

/// 对端点的非拥有引用。
#[derive(Clone, Debug)]
pub struct EndpointHandle {
    registry: Arc<EndpointRegistry>,
    id: EndpointId,
}

impl EndpointHandle {
    pub fn new(registry: Arc<EndpointRegistry>, id: EndpointId) -> Self {
        Self { registry, id }
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// 端点已注销时返回 `EndpointUnavailable`。
    pub fn resolve(&self) -> Result<Arc<dyn ReplySender>> {
        self.registry
            .get(self.id)
            .ok_or_else(|| SecsError::EndpointUnavailable {
                detail: format!("{} is no longer registered", self.id),
            })
    }
}

/// 已解码的主报文及其回复能力。
///
/// # 契约说明（What）
/// - [`PrimaryMessageWrapper::reply`] 在整个生命周期内至多发送一次；
/// - 主报文未置 W-bit 或端点已注销时，回复被丢弃并返回 `Ok(false)`；
/// - `reply(None)` 合成 S9F7，负载为主报文头的 10 字节，使用新的 system bytes；
/// - 普通回复强制清除 W-bit，并沿用主报文的 system bytes。
pub struct PrimaryMessageWrapper {
    replied: AtomicBool,
    endpoint: EndpointHandle,
    header: MessageHeader,
    message: SecsMessage,
}

impl PrimaryMessageWrapper {
    pub fn new(endpoint: EndpointHandle, header: MessageHeader, message: SecsMessage) -> Self {
        Self {
            replied: AtomicBool::new(false),
            endpoint,
            header,
            message,
        }
    }

    pub fn message(&self) -> &SecsMessage {
        &self.message
    }

    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    /// 主报文的 system bytes。
    pub fn message_id(&self) -> u32 {
        self.header.system_bytes
    }

    pub fn is_replied(&self) -> bool {
        self.replied.load(Ordering::Acquire)
    }

    /// 释放包装器并取回主报文。
    pub fn into_message(self) -> SecsMessage {
        self.message
    }

    /// 发送回复；返回 `Ok(true)` 表示回复已交给端点。
    pub fn reply(&self, reply: Option<SecsMessage>) -> Result<bool> {
        if self
            .replied
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(system_bytes = self.header.system_bytes, "reply dropped: already replied");
            return Ok(false);
        }
        if !self.message.reply_expected {
            debug!(system_bytes = self.header.system_bytes, "reply dropped: no reply expected");
            return Ok(false);
        }
        let sender = match self.endpoint.resolve() {
            Ok(sender) => sender,
            Err(err) => {
                debug!(
                    code = err.code(),
                    error = %err,
                    system_bytes = self.header.system_bytes,
                    "reply dropped: endpoint gone"
                );
                return Ok(false);
            }
        };

        let reply = match reply {
            Some(mut message) => {
                message.reply_expected = false;
                message
            }
            None => self.unknown_message(),
        };
        let system_bytes = if reply.stream == UNKNOWN_MESSAGE_STREAM {
            sender.new_system_id()
        } else {
            self.header.system_bytes
        };
        sender.send_reply(reply, system_bytes)?;
        Ok(true)
    }

    fn unknown_message(&self) -> SecsMessage {
        let raw: [u8; HEADER_LEN] = self.header.encode();
        SecsMessage::new(UNKNOWN_MESSAGE_STREAM, UNKNOWN_MESSAGE_FUNCTION, false)
            .with_name("Unknown Message")
            .with_item(Item::binary(&raw))
    }
}

impl fmt::Display for PrimaryMessageWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.message, f)
    }
}

impl fmt::Debug for PrimaryMessageWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimaryMessageWrapper")
            .field("header", &self.header)
            .field("endpoint", &self.endpoint.id())
            .field("replied", &self.is_replied())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::header::SystemBytesGenerator;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(SecsMessage, u32)>>,
        ids: SystemBytesGenerator,
    }

    impl ReplySender for Recorder {
        fn send_reply(&self, message: SecsMessage, system_bytes: u32) -> Result<()> {
            self.sent.lock().unwrap().push((message, system_bytes));
            Ok(())
        }

        fn new_system_id(&self) -> u32 {
            self.ids.next_id() + 1000
        }
    }

    fn primary(reply_expected: bool) -> (Arc<Recorder>, Arc<EndpointRegistry>, PrimaryMessageWrapper) {
        let registry = EndpointRegistry::new();
        let recorder = Arc::new(Recorder::default());
        let id = registry.register(recorder.clone());
        let header = MessageHeader::data(1, 1, 3, reply_expected, 77);
        let message = SecsMessage::new(1, 3, reply_expected);
        let wrapper = PrimaryMessageWrapper::new(EndpointHandle::new(registry.clone(), id), header, message);
        (recorder, registry, wrapper)
    }

    #[test]
    fn ordinary_reply_reuses_system_bytes_and_clears_w_bit() {
        let (recorder, _registry, wrapper) = primary(true);
        assert_eq!(wrapper.reply(Some(SecsMessage::new(1, 4, true))), Ok(true));
        assert_eq!(wrapper.reply(Some(SecsMessage::new(1, 4, false))), Ok(false));

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].0.reply_expected);
        assert_eq!(sent[0].1, 77);
    }

    #[test]
    fn missing_reply_becomes_s9f7_with_header_bytes() {
        let (recorder, _registry, wrapper) = primary(true);
        assert_eq!(wrapper.reply(None), Ok(true));

        let sent = recorder.sent.lock().unwrap();
        let (message, system_bytes) = &sent[0];
        assert_eq!((message.stream, message.function), (9, 7));
        assert_eq!(*system_bytes, 1000);
        assert_eq!(
            message.item().unwrap().values::<u8>().unwrap(),
            &wrapper.header().encode()
        );
    }

    #[test]
    fn reply_is_dropped_without_w_bit_or_endpoint() {
        let (recorder, _registry, wrapper) = primary(false);
        assert_eq!(wrapper.reply(None), Ok(false));
        assert!(recorder.sent.lock().unwrap().is_empty());

        let (recorder, registry, wrapper) = primary(true);
        let _ = registry.unregister(EndpointId(0));
        assert_eq!(wrapper.reply(None), Ok(false));
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn unregistered_handle_resolves_to_endpoint_unavailable() {
        let registry = EndpointRegistry::new();
        let id = registry.register(Arc::new(Recorder::default()));
        let handle = EndpointHandle::new(registry.clone(), id);
        assert!(handle.resolve().is_ok());

        registry.unregister(id);
        let err = handle.resolve().err().expect("注销后无法解析");
        assert_eq!(err.code(), crate::error::codes::ENDPOINT_UNAVAILABLE);
        assert_eq!(
            err.to_string(),
            "reply endpoint unavailable: endpoint#0 is no longer registered"
        );
    }
}
