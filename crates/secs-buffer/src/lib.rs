//! `secs-buffer` 提供 SECS-II 编解码热路径上的池化设施。
//!
//! # 模块定位（Why）
//! - 接收线程（解码）与发送线程（编码）在高消息速率下并发创建大量条目数组与编码缓冲，
//!   逐次堆分配会造成分配风暴；
//! - 池只是缓存，不承担正确性：未归还的实例会被正常释放，逻辑不得依赖租到实例的初始内容。
//!
//! # 设计概要（How）
//! - `pool` 模块实现通用的 [`Pool<T>`]，支持 LIFO/FIFO 出队；
//! - `array_pool` 在其上构建 [`ArrayPool<T>`]，租借结果 [`PooledArray<T>`] 在 `Drop` 时自动归还；
//! - `byte_pool` 实现 [`BytePool`]，以自由链表复用编码输出用的 `BytesMut`。

extern crate alloc;

mod array_pool;
mod byte_pool;
mod pool;

pub use array_pool::{ArrayPool, PooledArray};
pub use byte_pool::{BytePool, BytePoolStats};
pub use pool::{Pool, PoolAccessMode, PoolStats};
