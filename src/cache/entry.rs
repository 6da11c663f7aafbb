//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存条目与缓存统计结构。

use serde::Serialize;
use std::collections::BTreeSet;

/// 缓存条目
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// 缓存负载
    pub data: serde_json::Value,
    /// 写入时间（毫秒时间戳），用于计算是否过期
    pub timestamp: u64,
    /// 命中次数，仅供参考
    pub hits: u64,
    /// 声明的依赖键
    pub dependencies: BTreeSet<String>,
    /// 硬过期时间（毫秒时间戳），None 表示永不过期
    pub expires_at: Option<u64>,
}

impl CacheEntry {
    pub fn new(
        data: serde_json::Value,
        timestamp: u64,
        expires_at: Option<u64>,
        dependencies: BTreeSet<String>,
    ) -> Self {
        Self {
            data,
            timestamp,
            hits: 0,
            dependencies,
            expires_at,
        }
    }

    /// 相对于给定新鲜度窗口是否已经陈旧
    pub fn is_stale(&self, now: u64, ttl_ms: u64) -> bool {
        now.saturating_sub(self.timestamp) > ttl_ms
    }

    /// 是否已经到达硬过期时间
    pub fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// 缓存统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    /// 因容量或过期被淘汰的条目数（不含显式失效）
    pub evictions: u64,
    pub avg_hit_rate: f64,
}

impl CacheStats {
    pub(crate) fn record_hit(&mut self) {
        self.hits += 1;
        self.recompute_hit_rate();
    }

    pub(crate) fn record_miss(&mut self) {
        self.misses += 1;
        self.recompute_hit_rate();
    }

    fn recompute_hit_rate(&mut self) {
        let total = self.hits + self.misses;
        self.avg_hit_rate = if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        };
    }
}
