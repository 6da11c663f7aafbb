//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了首次初始化时把本地数据迁移到远程存储的逻辑。

use super::item::Entity;
use crate::error::Result;
use crate::remote::RemoteStore;
use crate::storage::{LocalStorage, StorageExt};
use crate::utils::now_millis;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

/// 本地账户类型到远程账户类型的映射
const ACCOUNT_TYPE_ALIASES: &[(&str, &str)] = &[("current", "checking"), ("credit", "credit_card")];

/// 持久化的迁移完成标记
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationFlag {
    pub completed: bool,
    pub timestamp: u64,
}

/// 本地存储中的业务数据
#[derive(Debug, Clone, Default)]
pub struct LocalSnapshot {
    pub accounts: Vec<Value>,
    pub transactions: Vec<Value>,
    pub budgets: Vec<Value>,
    pub goals: Vec<Value>,
    pub categories: Vec<Value>,
}

impl LocalSnapshot {
    /// 从本地存储读取所有集合，缺失或无法解析的集合按空处理
    pub fn load(storage: &dyn LocalStorage, prefix: &str) -> Self {
        let read = |entity: Entity| -> Vec<Value> {
            let key = collection_key(prefix, entity);
            match storage.get_json::<Vec<Value>>(&key) {
                Ok(rows) => rows.unwrap_or_default(),
                Err(e) => {
                    warn!("Ignoring unreadable local collection {}: {}", key, e);
                    Vec::new()
                }
            }
        };
        Self {
            accounts: read(Entity::Account),
            transactions: read(Entity::Transaction),
            budgets: read(Entity::Budget),
            goals: read(Entity::Goal),
            categories: read(Entity::Category),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
            && self.transactions.is_empty()
            && self.budgets.is_empty()
            && self.goals.is_empty()
            && self.categories.is_empty()
    }
}

/// 迁移策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStrategy {
    /// 远程无数据、本地有数据：静默迁移
    Migrate,
    /// 两边都有数据：以远程为准，本地数据不上传
    RemoteWins,
    /// 只有远程数据
    RemoteOnly,
    /// 两边都没有数据
    Nothing,
}

impl MigrationStrategy {
    pub fn decide(remote_has_data: bool, local_has_data: bool) -> Self {
        match (remote_has_data, local_has_data) {
            (false, true) => MigrationStrategy::Migrate,
            (true, true) => MigrationStrategy::RemoteWins,
            (true, false) => MigrationStrategy::RemoteOnly,
            (false, false) => MigrationStrategy::Nothing,
        }
    }
}

/// 迁移结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    pub accounts_migrated: usize,
    pub transactions_migrated: usize,
    /// 因账户无法映射而跳过的交易数
    pub transactions_skipped: usize,
    pub failed_batches: usize,
}

pub fn collection_key(prefix: &str, entity: Entity) -> String {
    format!("{}{}", prefix, entity.table())
}

pub fn migration_flag_key(prefix: &str) -> String {
    format!("{}migration_complete", prefix)
}

pub fn storage_mode_key(prefix: &str) -> String {
    format!("{}storage_mode", prefix)
}

/// 读取迁移完成标记
pub fn migration_flag(storage: &dyn LocalStorage, prefix: &str) -> Result<Option<MigrationFlag>> {
    storage.get_json(&migration_flag_key(prefix))
}

/// 把本地存储切换为仅缓存模式
pub fn mark_cache_only(storage: &dyn LocalStorage, prefix: &str) -> Result<()> {
    storage.set_json(&storage_mode_key(prefix), "cache_only")
}

/// 转换本地账户类型
pub fn translate_account_type(account_type: &str) -> &str {
    ACCOUNT_TYPE_ALIASES
        .iter()
        .find(|(local, _)| *local == account_type)
        .map(|(_, remote)| *remote)
        .unwrap_or(account_type)
}

fn local_account_ref(transaction: &Value) -> Option<&str> {
    transaction
        .get("accountId")
        .or_else(|| transaction.get("account_id"))
        .and_then(Value::as_str)
}

fn account_row(account: &Value, user_id: &str) -> Option<Value> {
    let mut row = account.as_object()?.clone();
    row.remove("id");
    if let Some(account_type) = row.get("type").and_then(Value::as_str) {
        let translated = translate_account_type(account_type).to_string();
        row.insert("type".to_string(), Value::String(translated));
    }
    row.insert("user_id".to_string(), Value::String(user_id.to_string()));
    Some(Value::Object(row))
}

fn transaction_row(transaction: &Value, account_id: &str, user_id: &str) -> Option<Value> {
    let mut row = transaction.as_object()?.clone();
    row.remove("id");
    row.remove("accountId");
    row.insert("account_id".to_string(), Value::String(account_id.to_string()));
    row.insert("user_id".to_string(), Value::String(user_id.to_string()));
    Some(Value::Object(row))
}

fn name_of(row: &Value) -> Option<&str> {
    row.get("name").and_then(Value::as_str)
}

/// 执行静默迁移
///
/// 先批量插入账户，再按批插入交易；交易引用的本地账户 ID
/// 通过账户名称映射为新的远程账户 ID。单个批次失败只记录日志，
/// 不影响其余批次。全部批次处理完后写入迁移完成标记。
#[instrument(skip(remote, storage, snapshot), level = "debug")]
pub async fn migrate(
    remote: &dyn RemoteStore,
    storage: &dyn LocalStorage,
    prefix: &str,
    user_id: &str,
    snapshot: &LocalSnapshot,
    batch_size: usize,
) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();
    info!(
        "Migrating local data: accounts={}, transactions={}",
        snapshot.accounts.len(),
        snapshot.transactions.len()
    );

    // 本地账户 ID -> 账户名称
    let local_names: AHashMap<&str, &str> = snapshot
        .accounts
        .iter()
        .filter_map(|a| Some((a.get("id")?.as_str()?, name_of(a)?)))
        .collect();

    // 账户名称 -> 远程账户 ID
    let mut remote_ids: AHashMap<String, String> = AHashMap::new();
    let account_rows: Vec<Value> = snapshot
        .accounts
        .iter()
        .filter_map(|a| account_row(a, user_id))
        .collect();
    if !account_rows.is_empty() {
        match remote.insert_many(Entity::Account.table(), account_rows).await {
            Ok(inserted) => {
                report.accounts_migrated = inserted.len();
                for row in &inserted {
                    if let (Some(name), Some(id)) =
                        (name_of(row), row.get("id").and_then(Value::as_str))
                    {
                        remote_ids.insert(name.to_string(), id.to_string());
                    }
                }
            }
            Err(e) => {
                warn!("Account migration failed: {}", e);
                report.failed_batches += 1;
            }
        }
    }

    let mut transaction_rows = Vec::with_capacity(snapshot.transactions.len());
    for transaction in &snapshot.transactions {
        let remote_account = local_account_ref(transaction)
            .and_then(|local_id| local_names.get(local_id))
            .and_then(|name| remote_ids.get(*name));
        match remote_account.and_then(|account_id| transaction_row(transaction, account_id, user_id)) {
            Some(row) => transaction_rows.push(row),
            None => {
                debug!("Skipping transaction without a migrated account");
                report.transactions_skipped += 1;
            }
        }
    }
    if report.transactions_skipped > 0 {
        warn!(
            "{} transactions skipped, their accounts could not be mapped",
            report.transactions_skipped
        );
    }

    for (index, chunk) in transaction_rows.chunks(batch_size.max(1)).enumerate() {
        match remote
            .insert_many(Entity::Transaction.table(), chunk.to_vec())
            .await
        {
            Ok(inserted) => report.transactions_migrated += inserted.len(),
            Err(e) => {
                warn!("Transaction batch {} failed to migrate: {}", index, e);
                report.failed_batches += 1;
            }
        }
    }

    let flag = MigrationFlag {
        completed: true,
        timestamp: now_millis(),
    };
    storage.set_json(&migration_flag_key(prefix), &flag)?;
    info!(
        "Migration complete: accounts={}, transactions={}, skipped={}, failed_batches={}",
        report.accounts_migrated,
        report.transactions_migrated,
        report.transactions_skipped,
        report.failed_batches
    );
    Ok(report)
}
