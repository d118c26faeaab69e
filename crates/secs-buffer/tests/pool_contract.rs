//! `pool_contract` 集成测试：验证 `Pool`/`ArrayPool`/`BytePool` 在公开 API 下的契约。
//!
//! # 测试目标（Why）
//! - 编码与解码线程共享同一组池，必须确认并发租借/归还不会丢失或重复实例；
//! - 数组归还依赖 `Drop`，需要确认计数与复用路径在外部调用视角下一致。
//!
//! # 结构安排（How）
//! - `concurrent_rent_and_reclaim_balance`：多线程压测，校验累计计数守恒；
//! - `access_mode_is_preserved_through_clones`：克隆句柄共享同一空闲队列；
//! - 其余用例覆盖数组池与字节池的复用路径。

use std::{sync::Arc, thread};

use bytes::BufMut;
use secs_buffer::{ArrayPool, BytePool, Pool, PoolAccessMode};

#[test]
fn concurrent_rent_and_reclaim_balance() {
    let pool = Arc::new(Pool::new(|| Vec::<u32>::with_capacity(16), PoolAccessMode::Lifo));
    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for round in 0..500u32 {
                    let mut instance = pool.rent();
                    instance.clear();
                    instance.push(worker * 1000 + round);
                    pool.reclaim(instance);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked");
    }

    let stats = pool.statistics();
    assert_eq!(stats.rented, 2000);
    assert_eq!(stats.reclaimed, 2000);
    assert_eq!(stats.idle as u64, stats.created, "每个创建出的实例最终都应回到空闲队列");
    assert!(stats.created <= 4, "并发度为 4 时最多只需创建 4 个实例");
}

#[test]
fn access_mode_is_preserved_through_clones() {
    let pool = Pool::new(|| 0u8, PoolAccessMode::Fifo);
    let alias = pool.clone();
    pool.reclaim(1);
    alias.reclaim(2);
    assert_eq!(alias.access_mode(), PoolAccessMode::Fifo);
    assert_eq!(alias.rent(), 1);
    assert_eq!(pool.rent(), 2);
}

#[test]
fn array_pool_reuses_capacity_across_threads() {
    let pool = ArrayPool::<u64>::new(PoolAccessMode::Lifo);
    let sender = pool.clone();
    thread::spawn(move || {
        let array = sender.rent_from_slice(&[u64::MAX; 32]);
        assert_eq!(array.len(), 32);
    })
    .join()
    .expect("sender panicked");

    let reused = pool.rent(8);
    assert!(reused.is_empty());
    assert!(reused.capacity() >= 32);
    assert_eq!(pool.statistics().created, 1);
}

#[test]
fn byte_pool_statistics_track_lifecycle() {
    let pool = BytePool::new();
    let mut first = pool.acquire(128);
    first.put_slice(b"payload");
    assert_eq!(pool.statistics().active_leases, 1);

    pool.reclaim_frozen(first.freeze());
    let after = pool.statistics();
    assert_eq!(after.active_leases, 0);
    assert_eq!(after.free_slots, 1);

    let released = pool.shrink_to_fit();
    assert!(released >= 128);
    assert_eq!(pool.statistics().available_bytes, 0);
}
