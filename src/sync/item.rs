//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步队列条目及其操作类型、实体类型和状态。

use crate::utils::{generate_id, now_millis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 同步操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncOperation::Create => "CREATE",
            SyncOperation::Update => "UPDATE",
            SyncOperation::Delete => "DELETE",
        };
        f.pad(s)
    }
}

/// 可同步的业务实体
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Account,
    Transaction,
    Budget,
    Goal,
    Category,
}

impl Entity {
    pub const ALL: [Entity; 5] = [
        Entity::Account,
        Entity::Transaction,
        Entity::Budget,
        Entity::Goal,
        Entity::Category,
    ];

    /// 远程存储中的表名（实体名的复数形式）
    pub fn table(&self) -> &'static str {
        match self {
            Entity::Account => "accounts",
            Entity::Transaction => "transactions",
            Entity::Budget => "budgets",
            Entity::Goal => "goals",
            Entity::Category => "categories",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Account => "account",
            Entity::Transaction => "transaction",
            Entity::Budget => "budget",
            Entity::Goal => "goal",
            Entity::Category => "category",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// 队列条目状态
///
/// 成功的条目直接移出队列，`Completed` 只在持久化数据中可能出现
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncItemStatus {
    Pending,
    Syncing,
    Completed,
    Failed,
}

/// 同步队列条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    pub id: String,
    #[serde(rename = "type")]
    pub op_type: SyncOperation,
    pub entity: Entity,
    pub data: serde_json::Value,
    pub timestamp: u64,
    pub retries: u32,
    pub status: SyncItemStatus,
}

impl SyncQueueItem {
    pub fn new(op_type: SyncOperation, entity: Entity, data: serde_json::Value) -> Self {
        Self {
            id: generate_id(),
            op_type,
            entity,
            data,
            timestamp: now_millis(),
            retries: 0,
            status: SyncItemStatus::Pending,
        }
    }

    /// 负载中的 `id` 字段
    pub fn data_id(&self) -> Option<&str> {
        self.data.get("id").and_then(|v| v.as_str())
    }
}
