//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和设置。

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wealthcache::config::{CacheConfig, SyncConfig};
use wealthcache::remote::RemoteStore;
use wealthcache::storage::MemoryStorage;
use wealthcache::sync::{ConnectivityMonitor, SyncQueue};
use wealthcache::{CacheError, LocalStorage, MemoryRemoteStore, Result, SmartCache};

pub fn setup_logging() {
    wealthcache::utils::setup_logging();
}

/// 测试用缓存配置：关闭后台清理
#[allow(dead_code)]
pub fn cache_config(max_size: usize) -> CacheConfig {
    CacheConfig {
        max_size,
        cleanup_interval_secs: 0,
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn new_cache(max_size: usize) -> SmartCache {
    setup_logging();
    SmartCache::new(
        wealthcache::utils::generate_unique_service_name("cache"),
        cache_config(max_size),
    )
}

/// 测试用同步配置：定时器间隔足够长，不会干扰测试
#[allow(dead_code)]
pub fn sync_config() -> SyncConfig {
    SyncConfig {
        interval_secs: 3600,
        ..Default::default()
    }
}

/// 创建同步队列
#[allow(dead_code)]
pub fn new_queue(
    remote: Option<Arc<dyn RemoteStore>>,
    storage: Arc<dyn LocalStorage>,
    online: bool,
) -> SyncQueue {
    setup_logging();
    SyncQueue::new(sync_config(), remote, storage, ConnectivityMonitor::new(online))
}

#[allow(dead_code)]
pub fn memory_storage() -> Arc<dyn LocalStorage> {
    Arc::new(MemoryStorage::new())
}

#[allow(dead_code)]
pub fn memory_remote() -> Arc<MemoryRemoteStore> {
    Arc::new(MemoryRemoteStore::new())
}

/// 轮询等待条件成立，超时返回 false
#[allow(dead_code)]
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// 记录写操作次数的远程存储，写操作总是失败
#[allow(dead_code)]
#[derive(Default)]
pub struct AlwaysFailingRemote {
    pub attempts: AtomicUsize,
}

#[allow(dead_code)]
impl AlwaysFailingRemote {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn fail(&self) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Remote("remote store unavailable".to_string()))
    }
}

#[async_trait]
impl RemoteStore for AlwaysFailingRemote {
    async fn find_user(&self, _external_id: &str) -> Result<Option<String>> {
        Ok(Some("internal-user".to_string()))
    }

    async fn ensure_user(&self, _external_id: &str) -> Result<String> {
        Ok("internal-user".to_string())
    }

    async fn has_accounts(&self, _user_id: &str) -> Result<bool> {
        Ok(true)
    }

    async fn insert(&self, _table: &str, _row: Value) -> Result<Value> {
        self.fail().map(|_| Value::Null)
    }

    async fn insert_many(&self, _table: &str, _rows: Vec<Value>) -> Result<Vec<Value>> {
        self.fail().map(|_| Vec::new())
    }

    async fn update(&self, _table: &str, _id: &str, _user_id: &str, _patch: Value) -> Result<()> {
        self.fail()
    }

    async fn delete(&self, _table: &str, _id: &str, _user_id: &str) -> Result<()> {
        self.fail()
    }
}
