//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了远程存储的抽象接口。
//!
//! 远程存储按表组织，行通过 `id` 和内部用户 ID 定位；应用层用户 ID
//! （外部身份 ID）需要先解析为远程存储的内部用户 ID。

pub mod memory;
#[cfg(feature = "rest")]
pub mod rest;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

pub use memory::MemoryRemoteStore;
#[cfg(feature = "rest")]
pub use rest::RestRemoteStore;

/// 远程存储特征
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 根据外部身份 ID 查找内部用户 ID
    async fn find_user(&self, external_id: &str) -> Result<Option<String>>;

    /// 查找内部用户 ID，不存在时创建用户记录
    async fn ensure_user(&self, external_id: &str) -> Result<String>;

    /// 用户在远程是否已有账户（存在性探测，不加载数据）
    async fn has_accounts(&self, user_id: &str) -> Result<bool>;

    /// 插入一行，返回远程存储保存后的行
    async fn insert(&self, table: &str, row: Value) -> Result<Value>;

    /// 批量插入，返回顺序与输入一致
    async fn insert_many(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>>;

    /// 按 `id` 和用户 ID 更新一行
    async fn update(&self, table: &str, id: &str, user_id: &str, patch: Value) -> Result<()>;

    /// 按 `id` 和用户 ID 删除一行
    async fn delete(&self, table: &str, id: &str, user_id: &str) -> Result<()>;

    /// 后端名称，用于日志
    fn name(&self) -> &str {
        "remote"
    }
}
