//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了内存中的远程存储实现，用于本地运行和测试。

use super::RemoteStore;
use crate::error::{CacheError, Result};
use crate::utils::generate_id;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// 内存远程存储
///
/// 除了保存数据外还记录每种操作的调用次数，并支持注入失败和延迟。
#[derive(Default)]
pub struct MemoryRemoteStore {
    tables: DashMap<String, Vec<Value>>,
    /// 外部身份 ID -> 内部用户 ID
    users: DashMap<String, String>,
    calls: DashMap<&'static str, usize>,
    failing: AtomicBool,
    fail_next: AtomicUsize,
    delay_ms: AtomicU64,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的所有写操作都失败（用户查询不受影响）
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 接下来的 `count` 次写操作失败
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// 每次调用前等待的时间
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis().min(u64::MAX as u128) as u64, Ordering::SeqCst);
    }

    /// 预先登记用户映射
    pub fn register_user(&self, external_id: &str, user_id: &str) {
        self.users
            .insert(external_id.to_string(), user_id.to_string());
    }

    /// 某种操作被调用的次数
    pub fn call_count(&self, op: &str) -> usize {
        self.calls.get(op).map(|c| *c).unwrap_or(0)
    }

    /// 所有写操作（insert / insert_many / update / delete）的调用次数
    pub fn write_count(&self) -> usize {
        ["insert", "insert_many", "update", "delete"]
            .iter()
            .map(|op| self.call_count(op))
            .sum()
    }

    /// 表中的所有行
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .get(table)
            .map(|rows| rows.value().clone())
            .unwrap_or_default()
    }

    /// 直接写入一行，不计入调用次数
    pub fn seed(&self, table: &str, row: Value) {
        self.tables.entry(table.to_string()).or_default().push(row);
    }

    async fn enter(&self, op: &'static str) {
        *self.calls.entry(op).or_insert(0) += 1;
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    fn check_write(&self, op: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Remote(format!("{} rejected by remote store", op)));
        }
        let consumed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(CacheError::Remote(format!("{} rejected by remote store", op)));
        }
        Ok(())
    }

    fn store_row(&self, table: &str, mut row: Value) -> Result<Value> {
        let Some(object) = row.as_object_mut() else {
            return Err(CacheError::InvalidInput(format!(
                "row for table {} must be a JSON object",
                table
            )));
        };
        if !object.get("id").map(Value::is_string).unwrap_or(false) {
            object.insert("id".to_string(), Value::String(generate_id()));
        }
        self.tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }
}

fn row_matches(row: &Value, id: &str, user_id: &str) -> bool {
    row.get("id").and_then(Value::as_str) == Some(id)
        && row.get("user_id").and_then(Value::as_str) == Some(user_id)
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn find_user(&self, external_id: &str) -> Result<Option<String>> {
        self.enter("find_user").await;
        Ok(self.users.get(external_id).map(|u| u.value().clone()))
    }

    async fn ensure_user(&self, external_id: &str) -> Result<String> {
        self.enter("ensure_user").await;
        let user_id = self
            .users
            .entry(external_id.to_string())
            .or_insert_with(generate_id)
            .clone();
        Ok(user_id)
    }

    async fn has_accounts(&self, user_id: &str) -> Result<bool> {
        self.enter("has_accounts").await;
        Ok(self
            .tables
            .get("accounts")
            .map(|rows| {
                rows.iter()
                    .any(|r| r.get("user_id").and_then(Value::as_str) == Some(user_id))
            })
            .unwrap_or(false))
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        self.enter("insert").await;
        self.check_write("insert")?;
        let stored = self.store_row(table, row)?;
        debug!("MemoryRemoteStore insert into {}", table);
        Ok(stored)
    }

    async fn insert_many(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>> {
        self.enter("insert_many").await;
        self.check_write("insert_many")?;
        rows.into_iter()
            .map(|row| self.store_row(table, row))
            .collect()
    }

    async fn update(&self, table: &str, id: &str, user_id: &str, patch: Value) -> Result<()> {
        self.enter("update").await;
        self.check_write("update")?;
        if let Some(mut rows) = self.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|r| row_matches(r, id, user_id)) {
                if let (Some(target), Some(fields)) = (row.as_object_mut(), patch.as_object()) {
                    for (k, v) in fields {
                        target.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str, user_id: &str) -> Result<()> {
        self.enter("delete").await;
        self.check_write("delete")?;
        if let Some(mut rows) = self.tables.get_mut(table) {
            rows.retain(|r| !row_matches(r, id, user_id));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
