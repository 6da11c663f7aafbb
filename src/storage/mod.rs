//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了持久化本地键值存储的接口与实现。
//!
//! 同步队列用它保存队列内容、迁移标记和存储模式标记，
//! 缓存用它在会话之间保留偏好设置。

pub mod file;
pub mod memory;

use crate::error::Result;
use crate::serialization::{JsonSerializer, Serializer};
use serde::{de::DeserializeOwned, Serialize};

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// 本地存储默认配额（字节），与浏览器本地存储的常见上限一致
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// 本地键值存储特征
///
/// 同步接口，值均为字符串；实现需要自行保证线程安全
pub trait LocalStorage: Send + Sync {
    /// 读取键对应的值
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// 写入键值，超出配额时返回 `QuotaExceeded`
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// 删除键
    fn remove_item(&self, key: &str) -> Result<()>;

    /// 列出所有键
    fn keys(&self) -> Result<Vec<String>>;

    /// 当前占用的字节数
    fn used_bytes(&self) -> Result<usize>;
}

/// 本地存储扩展特征
///
/// 提供基于 JSON 的类型安全读写
pub trait StorageExt: LocalStorage {
    /// 读取并反序列化值
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_item(key)? {
            Some(raw) => Ok(Some(JsonSerializer::new().deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// 序列化并写入值
    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = JsonSerializer::new().serialize(value)?;
        self.set_item(key, &raw)
    }

    /// 列出带指定前缀的键
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}

impl<T: LocalStorage + ?Sized> StorageExt for T {}

pub(crate) fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}
