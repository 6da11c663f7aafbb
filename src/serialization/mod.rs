//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存条目与本地存储值的序列化机制。

pub mod json;

use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};

pub use json::JsonSerializer;

/// 序列化器特征
///
/// 定义序列化和反序列化操作的接口。本地存储只保存字符串，
/// 缓存内部以 `serde_json::Value` 保存任意负载。
pub trait Serializer: Send + Sync {
    /// 序列化值为字符串
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<String>;

    /// 从字符串反序列化值
    fn deserialize<T: DeserializeOwned>(&self, data: &str) -> Result<T>;

    /// 将值转换为缓存内部使用的 JSON 值
    fn to_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<serde_json::Value>;

    /// 将缓存内部的 JSON 值还原为具体类型
    fn from_value<T: DeserializeOwned>(&self, value: serde_json::Value) -> Result<T>;
}
