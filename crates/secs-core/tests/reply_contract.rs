//! `reply_contract` 集成测试：至多一次回复与回复关联。
//!
//! # 测试目标（Why）
//! - 多线程同时回复同一主报文时，只有一次回复真正交给端点；
//! - 回复经编码、再解码后，system bytes 与主报文一致（S9F7 除外）。

use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use secs_core::{
    DecodedFrame, DecoderConfig, EndpointHandle, EndpointId, EndpointRegistry, Item, ItemPools,
    MessageEncoder, MessageHeader, PrimaryMessageWrapper, ReplySender, Result, SecsMessage, StreamDecoder,
    SystemBytesGenerator,
};

/// 把回复编码成线路字节并累积，模拟一条连接的发送端。
struct WireEndpoint {
    encoder: MessageEncoder,
    ids: SystemBytesGenerator,
    wire: Mutex<Vec<u8>>,
}

impl WireEndpoint {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            encoder: MessageEncoder::new(9, ItemPools::shared()),
            ids: SystemBytesGenerator::new(500),
            wire: Mutex::new(Vec::new()),
        })
    }

    fn decoded(&self) -> Vec<DecodedFrame> {
        let mut decoder =
            StreamDecoder::new(&DecoderConfig::default(), ItemPools::shared(), Vec::new())
                .expect("配置合法");
        decoder
            .feed(&self.wire.lock().expect("锁未中毒"))
            .expect("回复字节应可解码");
        decoder.into_sink()
    }
}

impl ReplySender for WireEndpoint {
    fn send_reply(&self, message: SecsMessage, system_bytes: u32) -> Result<()> {
        let (encoded, _) = self.encoder.encode_owned(message, system_bytes, true)?;
        self.wire
            .lock()
            .expect("锁未中毒")
            .extend_from_slice(&encoded.to_vec());
        Ok(())
    }

    fn new_system_id(&self) -> u32 {
        self.ids.next_id()
    }
}

fn primary(
    endpoint: &Arc<WireEndpoint>,
    reply_expected: bool,
) -> (Arc<EndpointRegistry>, EndpointId, PrimaryMessageWrapper) {
    let registry = EndpointRegistry::new();
    let id = registry.register(endpoint.clone());
    let header = MessageHeader::data(9, 1, 3, reply_expected, 4242);
    let message = SecsMessage::new(1, 3, reply_expected).with_item(Item::u4(&[1, 2]));
    let wrapper = PrimaryMessageWrapper::new(EndpointHandle::new(registry.clone(), id), header, message);
    (registry, id, wrapper)
}

#[test]
fn concurrent_replies_send_exactly_once() {
    let endpoint = WireEndpoint::new();
    let (_registry, _, wrapper) = primary(&endpoint, true);
    let wrapper = Arc::new(wrapper);
    let barrier = Arc::new(Barrier::new(8));

    let workers: Vec<_> = (0..8u8)
        .map(|n| {
            let wrapper = Arc::clone(&wrapper);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let reply = SecsMessage::new(1, 4, false).with_item(Item::u1(&[n]));
                wrapper.reply(Some(reply)).expect("发送不应失败")
            })
        })
        .collect();
    let accepted = workers
        .into_iter()
        .map(|worker| worker.join().expect("线程不应 panic"))
        .filter(|sent| *sent)
        .count();

    assert_eq!(accepted, 1);
    assert!(wrapper.is_replied());
    let frames = endpoint.decoded();
    assert_eq!(frames.len(), 1, "线路上只能出现一条回复");
    match &frames[0] {
        DecodedFrame::Data(header, message) => {
            assert_eq!(header.system_bytes, wrapper.message_id());
            assert!(!header.reply_expected);
            assert_eq!((message.stream, message.function), (1, 4));
        }
        other => panic!("应为数据报文: {:?}", other),
    }
}

#[test]
fn replies_without_w_bit_are_no_ops() {
    let endpoint = WireEndpoint::new();
    let (_registry, _, wrapper) = primary(&endpoint, false);
    for _ in 0..3 {
        assert_eq!(wrapper.reply(Some(SecsMessage::new(1, 4, false))), Ok(false));
    }
    assert!(endpoint.wire.lock().expect("锁未中毒").is_empty());
}

#[test]
fn unknown_message_reply_carries_primary_header() {
    let endpoint = WireEndpoint::new();
    let (_registry, _, wrapper) = primary(&endpoint, true);
    assert_eq!(wrapper.reply(None), Ok(true));

    let frames = endpoint.decoded();
    match &frames[..] {
        [DecodedFrame::Data(header, message)] => {
            assert_eq!((header.stream, header.function), (9, 7));
            assert_eq!(header.system_bytes, 500, "S9F7 使用新分配的 system bytes");
            let payload = message
                .item()
                .expect("S9F7 携带报文头")
                .values::<u8>()
                .expect("二进制负载");
            assert_eq!(payload, &wrapper.header().encode());
        }
        other => panic!("应解码出一条 S9F7: {:?}", other),
    }
}

#[test]
fn unregistered_endpoint_drops_reply() {
    let endpoint = WireEndpoint::new();
    let (registry, id, wrapper) = primary(&endpoint, true);
    assert!(registry.unregister(id).is_some());
    assert!(registry.is_empty());
    assert_eq!(wrapper.reply(None), Ok(false));
    assert!(endpoint.wire.lock().expect("锁未中毒").is_empty());
}
