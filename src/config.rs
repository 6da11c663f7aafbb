//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存与同步队列的配置结构和解析逻辑。

use crate::error::{CacheError, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// 远程存储配置，缺省时以纯本地模式运行
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

/// 全局配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GlobalConfig {
    /// 默认日志级别（`RUST_LOG` 优先）
    pub log_level: String,
    /// 是否启用指标收集
    pub enable_metrics: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            enable_metrics: true,
        }
    }
}

/// 缓存配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct CacheConfig {
    /// 最大条目数
    pub max_size: usize,
    /// 默认过期时间（秒）
    pub ttl_secs: u64,
    /// 过期命中时是否先返回旧值并在后台刷新
    pub stale_while_revalidate: bool,
    /// 是否把偏好设置持久化到本地存储
    pub persist_to_storage: bool,
    /// 过期清理间隔（秒），0表示禁用后台清理
    pub cleanup_interval_secs: u64,
    /// 偏好设置在本地存储中的键前缀
    pub preference_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 200,
            ttl_secs: 300,
            stale_while_revalidate: true,
            persist_to_storage: true,
            cleanup_interval_secs: 60,
            preference_prefix: "smartcache_pref_".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// 后台刷新的最小间隔
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// 同步队列配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SyncConfig {
    /// 后台刷新间隔（秒）
    pub interval_secs: u64,
    /// 最大重试次数，超过后条目被丢弃
    pub max_retries: u32,
    /// 迁移时每批插入的交易数
    pub migration_batch_size: usize,
    /// 本地存储键前缀
    pub storage_prefix: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            max_retries: 3,
            migration_batch_size: 100,
            storage_prefix: "wealthtracker_".to_string(),
        }
    }
}

impl SyncConfig {
    /// 后台刷新间隔，不小于 [`MIN_SYNC_INTERVAL`]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs).max(MIN_SYNC_INTERVAL)
    }
}

/// 本地存储后端类型
#[derive(Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// 仅内存
    Memory,
    /// JSON 文件
    #[default]
    File,
}

/// 本地存储配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// 文件路径（backend = "file" 时使用）
    pub path: String,
    /// 配额（字节）
    pub quota_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: "wealthcache_storage.json".to_string(),
            quota_bytes: crate::storage::DEFAULT_QUOTA_BYTES,
        }
    }
}

/// 远程存储配置
#[derive(Deserialize, Clone, Debug)]
pub struct RemoteConfig {
    /// 服务地址，例如 `https://project.example.co`
    pub url: String,
    /// 匿名访问密钥
    pub api_key: SecretString,
    /// 请求超时（毫秒）
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// 用户表名
    #[serde(default = "default_users_table")]
    pub users_table: String,
    /// 用户表中保存外部身份 ID 的列
    #[serde(default = "default_external_id_column")]
    pub external_id_column: String,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_users_table() -> String {
    "users".to_string()
}

fn default_external_id_column() -> String {
    "clerk_id".to_string()
}

impl Config {
    /// 从 TOML 字符串解析配置
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| CacheError::ConfigError(e.to_string()))
    }

    /// 从 TOML 文件加载配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CacheError::ConfigError(format!(
                "无法读取配置文件 {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&raw)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有值在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(version) = &self.config_version {
            if *version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        if self.cache.max_size == 0 {
            return Err("cache.max_size cannot be zero".to_string());
        }

        if self.cache.ttl_secs == 0 {
            return Err("cache.ttl_secs cannot be zero".to_string());
        }

        if self.cache.ttl_secs > 86400 * 30 {
            return Err("cache.ttl_secs cannot exceed 30 days (2592000 seconds)".to_string());
        }

        if self.cache.preference_prefix.is_empty() {
            return Err("cache.preference_prefix cannot be empty".to_string());
        }

        if self.sync.interval_secs == 0 || self.sync.interval_secs > 3600 {
            return Err("sync.interval_secs must be between 1 and 3600 seconds".to_string());
        }

        if self.sync.max_retries > 100 {
            return Err("sync.max_retries cannot exceed 100".to_string());
        }

        if self.sync.migration_batch_size == 0 {
            return Err("sync.migration_batch_size cannot be zero".to_string());
        }

        if self.storage.backend == StorageBackend::File && self.storage.path.trim().is_empty() {
            return Err("storage.path is required for the file backend".to_string());
        }

        if self.storage.quota_bytes < 1024 {
            return Err("storage.quota_bytes must be at least 1024".to_string());
        }

        if let Some(remote) = &self.remote {
            if !remote.url.starts_with("http://") && !remote.url.starts_with("https://") {
                return Err(format!(
                    "remote.url '{}' must start with http:// or https://",
                    remote.url
                ));
            }
            if remote.request_timeout_ms == 0 {
                return Err("remote.request_timeout_ms cannot be zero".to_string());
            }
        }

        Ok(())
    }
}
