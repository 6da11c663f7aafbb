//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于内存的本地存储实现，用于测试和无持久化场景。

use super::{entry_size, LocalStorage, DEFAULT_QUOTA_BYTES};
use crate::error::{CacheError, Result};
use dashmap::DashMap;

/// 内存本地存储
///
/// 进程退出后数据丢失，但保留与文件存储相同的配额语义
pub struct MemoryStorage {
    items: DashMap<String, String>,
    quota: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_quota(DEFAULT_QUOTA_BYTES)
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            items: DashMap::new(),
            quota,
        }
    }

    fn total_bytes(&self) -> usize {
        self.items
            .iter()
            .map(|e| entry_size(e.key(), e.value()))
            .sum()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.get(key).map(|v| v.value().clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let current = self.total_bytes();
        let replaced = self
            .items
            .get(key)
            .map(|v| entry_size(key, v.value()))
            .unwrap_or(0);
        let used = current.saturating_sub(replaced) + entry_size(key, value);
        if used > self.quota {
            return Err(CacheError::QuotaExceeded {
                used,
                quota: self.quota,
            });
        }
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.items.iter().map(|e| e.key().clone()).collect())
    }

    fn used_bytes(&self) -> Result<usize> {
        Ok(self.total_bytes())
    }
}
