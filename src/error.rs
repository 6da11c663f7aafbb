//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存与同步队列的错误类型和处理机制。

use thiserror::Error;

/// 缓存与同步系统错误类型枚举
///
/// 定义了缓存读取、本地存储和远程同步中可能发生的各种错误类型
#[derive(Error, Debug)]
pub enum CacheError {
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 数据加载（fetcher）失败
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// 远程存储操作失败
    #[error("Remote store operation failed: {0}")]
    Remote(String),

    /// 未配置远程存储
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    /// 本地存储操作失败
    #[error("Local storage error: {0}")]
    Storage(String),

    /// 本地存储超出配额
    #[error("Local storage quota exceeded: {used} of {quota} bytes")]
    QuotaExceeded { used: usize, quota: usize },

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 无效输入
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 同步队列尚未初始化
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// HTTP错误
    #[cfg(feature = "rest")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// 关闭错误
    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

/// 缓存操作结果类型别名
///
/// 简化错误处理，所有缓存与同步操作都返回此类型
pub type Result<T> = std::result::Result<T, CacheError>;
