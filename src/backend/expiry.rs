//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了按过期时间排序的最小堆，替代每个条目一个定时器的做法。

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// 过期时间队列
///
/// 堆中可能残留已被覆盖或删除的键，弹出的候选键需要调用方
/// 对照条目当前的过期时间再次确认。
#[derive(Debug, Default)]
pub struct ExpiryQueue {
    heap: BinaryHeap<Reverse<(u64, String)>>,
}

impl ExpiryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记键的过期时间（毫秒时间戳）
    pub fn schedule(&mut self, key: &str, expires_at: u64) {
        self.heap.push(Reverse((expires_at, key.to_string())));
    }

    /// 弹出所有在 `now` 之前到期的候选键
    pub fn pop_due(&mut self, now: u64) -> Vec<(String, u64)> {
        let mut due = Vec::new();
        while let Some(Reverse((at, _))) = self.heap.peek() {
            if *at > now {
                break;
            }
            if let Some(Reverse((at, key))) = self.heap.pop() {
                due.push((key, at));
            }
        }
        due
    }

    /// 最早的过期时间
    pub fn next_deadline(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse((at, _))| *at)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// 用存活条目重建堆，丢弃残留记录
    pub fn rebuild<I>(&mut self, live: I)
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        self.heap = live
            .into_iter()
            .map(|(key, at)| Reverse((at, key)))
            .collect();
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
