#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use secs_core::{DecodedFrame, DecoderConfig, Item, ItemPools, StreamDecoder};

const MAX_MESSAGE_LENGTH: usize = 1 << 20;

/// Fuzz 用例：任意线路字节 + 分块方案。
///
/// - **Why**：解码器直接面对对端字节，畸形长度、格式码与截断都必须以错误返回，不能 panic 或越界；
/// - **How**：同一输入分别整块交付与按 `chunks` 循环分块交付，比较两者的结果；
/// - **What**：两种交付方式要么都失败，要么产出相同数量的帧，且每个数据帧的条目重新编码后字节一致。
#[derive(Debug, Arbitrary)]
struct DecoderCase {
    bytes: Vec<u8>,
    chunks: Vec<u8>,
    initial_buffer: u8,
}

fn run(bytes: &[u8], chunks: &[u8], initial: usize) -> Option<Vec<DecodedFrame>> {
    let config = DecoderConfig::default()
        .with_initial_buffer_size(initial)
        .with_max_message_length(MAX_MESSAGE_LENGTH);
    let mut decoder = StreamDecoder::new(&config, ItemPools::shared(), Vec::new()).ok()?;
    let mut rest = bytes;
    let mut sizes = chunks.iter().map(|n| usize::from(*n).max(1)).cycle();
    while !rest.is_empty() {
        let wanted = if chunks.is_empty() { rest.len() } else { sizes.next()? };
        let take = wanted.min(rest.len()).min(decoder.buffer_count());
        decoder.writable()[..take].copy_from_slice(&rest[..take]);
        decoder.decode(take).ok()?;
        rest = &rest[take..];
    }
    Some(decoder.into_sink())
}

fn body(frame: &DecodedFrame) -> Option<Vec<u8>> {
    match frame {
        DecodedFrame::Control(_) => None,
        DecodedFrame::Data(_, message) => message.item().and_then(|item: &Item| item.encode().ok()),
    }
}

fuzz_target!(|case: DecoderCase| {
    let initial = 14 + usize::from(case.initial_buffer);
    let whole = run(&case.bytes, &[], 4096);
    let chunked = run(&case.bytes, &case.chunks, initial);
    assert_eq!(whole.is_some(), chunked.is_some());
    if let (Some(whole), Some(chunked)) = (whole, chunked) {
        assert_eq!(whole.len(), chunked.len());
        for (a, b) in whole.iter().zip(&chunked) {
            assert_eq!(body(a), body(b));
        }
    }
});
