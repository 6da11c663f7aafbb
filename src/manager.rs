//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了服务管理器，负责按配置组装本地存储、缓存、远程存储和同步队列。

use crate::cache::SmartCache;
use crate::config::{Config, StorageBackend, StorageConfig};
use crate::error::{CacheError, Result};
use crate::remote::RemoteStore;
use crate::storage::{FileStorage, LocalStorage, MemoryStorage};
use crate::sync::{ConnectivityMonitor, SyncQueue};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// 服务管理器
///
/// 应用的组合根：所有组件都是显式实例，由调用方持有并按需传递
pub struct ServiceManager {
    config: Config,
    storage: Arc<dyn LocalStorage>,
    cache: SmartCache,
    sync: SyncQueue,
    connectivity: ConnectivityMonitor,
    cleanup: Option<JoinHandle<()>>,
}

impl ServiceManager {
    /// 初始化所有组件
    ///
    /// # 参数
    ///
    /// * `config` - 系统配置
    /// * `remote` - 远程存储，None 时按配置创建；配置中也没有时以纯本地模式运行
    ///
    /// # 返回值
    ///
    /// 配置无效或本地存储无法打开时返回错误
    #[instrument(skip(config, remote), level = "info")]
    pub async fn init(config: Config, remote: Option<Arc<dyn RemoteStore>>) -> Result<Self> {
        if let Err(e) = config.validate() {
            return Err(CacheError::ConfigError(e));
        }

        let storage = open_storage(&config.storage)?;
        let remote = match remote {
            Some(remote) => Some(remote),
            None => remote_from_config(&config)?,
        };

        let connectivity = ConnectivityMonitor::new(true);
        let cache = SmartCache::with_storage("smart_cache", config.cache.clone(), storage.clone());
        let cleanup = cache.spawn_cleanup();
        let sync = SyncQueue::new(
            config.sync.clone(),
            remote,
            storage.clone(),
            connectivity.clone(),
        );

        info!(
            "ServiceManager initialized: storage={:?}, remote={}",
            config.storage.backend,
            if config.remote.is_some() { "configured" } else { "none" }
        );

        Ok(Self {
            config,
            storage,
            cache,
            sync,
            connectivity,
            cleanup,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &SmartCache {
        &self.cache
    }

    pub fn sync_queue(&self) -> &SyncQueue {
        &self.sync
    }

    pub fn storage(&self) -> &Arc<dyn LocalStorage> {
        &self.storage
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// 关闭所有后台任务
    ///
    /// 停止同步定时器和缓存清理任务；正在进行的刷新不会被中断
    #[instrument(skip(self), level = "info")]
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down services");
        self.sync.destroy().await;
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.abort();
            match cleanup.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    return Err(CacheError::ShutdownError(format!(
                        "cache cleanup task failed: {}",
                        e
                    )))
                }
            }
        }
        info!("All services stopped");
        Ok(())
    }
}

/// 按配置打开本地存储
pub fn open_storage(config: &StorageConfig) -> Result<Arc<dyn LocalStorage>> {
    let storage: Arc<dyn LocalStorage> = match config.backend {
        StorageBackend::Memory => Arc::new(MemoryStorage::with_quota(config.quota_bytes)),
        StorageBackend::File => Arc::new(FileStorage::open_with_quota(
            &config.path,
            config.quota_bytes,
        )?),
    };
    Ok(storage)
}

#[cfg(feature = "rest")]
fn remote_from_config(config: &Config) -> Result<Option<Arc<dyn RemoteStore>>> {
    match &config.remote {
        Some(remote) => {
            let store = crate::remote::RestRemoteStore::new(remote)?;
            Ok(Some(Arc::new(store)))
        }
        None => {
            warn!("No remote store configured, running in local-only mode");
            Ok(None)
        }
    }
}

#[cfg(not(feature = "rest"))]
fn remote_from_config(config: &Config) -> Result<Option<Arc<dyn RemoteStore>>> {
    if config.remote.is_some() {
        warn!("Remote store configured but the `rest` feature is disabled, running local-only");
    }
    Ok(None)
}
