//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于 JSON 文件的持久化本地存储。

use super::{entry_size, LocalStorage, DEFAULT_QUOTA_BYTES};
use crate::error::{CacheError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, instrument};

/// 文件本地存储
///
/// 所有键值保存在单个 JSON 对象文件中，每次写入都会整体落盘
/// （先写临时文件再重命名），读取走内存副本。
pub struct FileStorage {
    path: PathBuf,
    quota: usize,
    items: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// 打开（或创建）文件存储
    ///
    /// # 参数
    ///
    /// * `path` - 存储文件路径，父目录不存在时自动创建
    ///
    /// # 返回值
    ///
    /// 文件内容无法解析时返回 `Storage` 错误
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_quota(path, DEFAULT_QUOTA_BYTES)
    }

    #[instrument(skip(path), level = "debug")]
    pub fn open_with_quota(path: impl AsRef<Path>, quota: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CacheError::Storage(format!(
                        "无法创建存储目录 {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let items = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw).map_err(|e| {
                    CacheError::Storage(format!("存储文件 {} 已损坏: {}", path.display(), e))
                })?
            }
        } else {
            BTreeMap::new()
        };

        debug!(
            "FileStorage opened: path={}, keys={}",
            path.display(),
            items.len()
        );

        Ok(Self {
            path,
            quota,
            items: Mutex::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.items
            .lock()
            .map_err(|_| CacheError::Storage("storage lock poisoned".to_string()))
    }

    fn flush(&self, items: &BTreeMap<String, String>) -> Result<()> {
        let raw = serde_json::to_string(items)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl LocalStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.lock()?;
        let current: usize = items.iter().map(|(k, v)| entry_size(k, v)).sum();
        let replaced = items.get(key).map(|v| entry_size(key, v)).unwrap_or(0);
        let used = current.saturating_sub(replaced) + entry_size(key, value);
        if used > self.quota {
            return Err(CacheError::QuotaExceeded {
                used,
                quota: self.quota,
            });
        }

        let previous = items.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush(&items) {
            // 落盘失败时回滚内存副本，保持两者一致
            match previous {
                Some(old) => items.insert(key.to_string(), old),
                None => items.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut items = self.lock()?;
        if items.remove(key).is_some() {
            self.flush(&items)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn used_bytes(&self) -> Result<usize> {
        Ok(self.lock()?.iter().map(|(k, v)| entry_size(k, v)).sum())
    }
}
