//! wealthcache - 个人理财应用的客户端智能缓存与离线同步队列
//!
//! 提供带 TTL、依赖失效和后台刷新的 LRU 缓存，以及在线时
//! 把本地变更回放到远程存储的同步队列。

#![doc(html_root_url = "https://docs.rs/wealthcache/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod backend;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod remote;
pub mod serialization;
pub mod storage;
pub mod sync;
pub mod telemetry;
pub mod utils;

// Re-export commonly used items
pub use cache::{CacheOptions, CacheStats, KeyPattern, SmartCache};
pub use config::Config;
pub use error::{CacheError, Result};
pub use manager::ServiceManager;
pub use remote::{MemoryRemoteStore, RemoteStore};
pub use storage::{FileStorage, LocalStorage, MemoryStorage, StorageExt};
pub use sync::{ConnectivityMonitor, Entity, SyncOperation, SyncQueue, SyncStatus};

/// wealthcache 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
