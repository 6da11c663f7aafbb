//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了失效操作使用的键匹配模式。

use crate::error::{CacheError, Result};
use regex::Regex;

/// 键匹配模式
///
/// 字符串默认按前缀匹配（包含完全相等），正则按 `is_match` 匹配
#[derive(Debug, Clone)]
pub enum KeyPattern {
    /// 仅完全相等
    Exact(String),
    /// 完全相等或以该前缀开头
    Prefix(String),
    /// 正则匹配
    Regex(Regex),
}

impl KeyPattern {
    /// 编译正则模式
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(KeyPattern::Regex)
            .map_err(|e| CacheError::InvalidInput(format!("invalid key pattern: {}", e)))
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Exact(exact) => key == exact,
            KeyPattern::Prefix(prefix) => key.starts_with(prefix.as_str()),
            KeyPattern::Regex(re) => re.is_match(key),
        }
    }
}

impl From<&str> for KeyPattern {
    fn from(value: &str) -> Self {
        KeyPattern::Prefix(value.to_string())
    }
}

impl From<String> for KeyPattern {
    fn from(value: String) -> Self {
        KeyPattern::Prefix(value)
    }
}

impl From<&String> for KeyPattern {
    fn from(value: &String) -> Self {
        KeyPattern::Prefix(value.clone())
    }
}

impl From<Regex> for KeyPattern {
    fn from(value: Regex) -> Self {
        KeyPattern::Regex(value)
    }
}
