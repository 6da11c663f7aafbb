//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 统一工具模块
//!
//! 提供库、测试和命令行共用的工具函数，包括：
//! - 日志设置工具
//! - 时间戳与 ID 生成工具
//! - 输入验证工具

use crate::error::CacheError;
use std::sync::Once;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// 安装全局日志订阅者（只生效一次）
///
/// 优先使用 `RUST_LOG`，否则使用传入的默认级别
pub fn setup_logging_with_level(default_level: &str) {
    let default_level = default_level.to_string();
    INIT.call_once(move || {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(filter)
            .try_init()
            .ok();
    });
}

pub fn setup_logging() {
    setup_logging_with_level("debug");
}

/// 当前时间（毫秒时间戳）
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// 将时长换算为毫秒，超出 u64 范围时饱和
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// 生成新的唯一 ID
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 远程存储生成的 ID 长度（带连字符的 UUID）
pub const REMOTE_ID_LENGTH: usize = 36;

/// 判断 ID 是否已经是远程存储生成的格式
pub fn looks_like_remote_id(id: &str) -> bool {
    id.len() == REMOTE_ID_LENGTH
}

/// 生成唯一的服务名称
pub fn generate_unique_service_name(base: &str) -> String {
    format!("{}_{}", base, uuid::Uuid::new_v4().simple())
}

const MAX_CACHE_KEY_LENGTH: usize = 1024;

/// 校验缓存键
///
/// 键不能为空、不能超过 1024 字节，且不能包含控制字符
pub fn validate_cache_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty() {
        return Err(CacheError::InvalidInput(
            "Cache key cannot be empty".to_string(),
        ));
    }

    if key.len() > MAX_CACHE_KEY_LENGTH {
        return Err(CacheError::InvalidInput(format!(
            "Cache key exceeds maximum length of {} bytes (got {} bytes)",
            MAX_CACHE_KEY_LENGTH,
            key.len()
        )));
    }

    if let Some(c) = key.chars().find(|c| c.is_control()) {
        return Err(CacheError::InvalidInput(format!(
            "Cache key contains control character {:?}",
            c
        )));
    }

    Ok(())
}
