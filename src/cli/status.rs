//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步状态查询命令的实现。

use crate::cli::{load_config, Cli, StatusArgs};
use crate::manager::open_storage;
use crate::serialization::{JsonSerializer, Serializer};
use crate::storage::StorageExt;
use crate::sync::migration::{migration_flag, storage_mode_key};
use crate::sync::{errors_key, queue_key, SyncItemStatus, SyncQueueItem};
use anyhow::Result;
use serde_json::json;

pub async fn execute(cli: &Cli, args: &StatusArgs) -> Result<()> {
    let config = load_config(cli)?;
    let storage = open_storage(&config.storage)?;
    let prefix = &config.sync.storage_prefix;

    let queue: Vec<SyncQueueItem> = storage.get_json(&queue_key(prefix))?.unwrap_or_default();
    let errors: Vec<String> = storage.get_json(&errors_key(prefix))?.unwrap_or_default();
    let migration = migration_flag(storage.as_ref(), prefix)?;
    let mode: Option<String> = storage.get_json(&storage_mode_key(prefix))?;
    let pending = queue
        .iter()
        .filter(|i| i.status == SyncItemStatus::Pending)
        .count();

    if args.json {
        let queue_value = if args.detailed {
            serde_json::to_value(&queue)?
        } else {
            serde_json::Value::Null
        };
        let output = json!({
            "storage": config.storage.path,
            "queue_length": queue.len(),
            "pending_changes": pending,
            "sync_errors": errors,
            "migration_completed": migration.as_ref().map(|f| f.completed).unwrap_or(false),
            "migration_timestamp": migration.as_ref().map(|f| f.timestamp),
            "storage_mode": mode,
            "used_bytes": storage.used_bytes()?,
            "queue": queue_value,
        });
        println!("{}", JsonSerializer::pretty().serialize(&output)?);
        return Ok(());
    }

    println!("=== Sync Queue Status ===\n");
    println!("Storage:         {}", config.storage.path);
    println!(
        "Used Bytes:      {} / {}",
        storage.used_bytes()?,
        config.storage.quota_bytes
    );
    println!("Storage Mode:    {}", mode.as_deref().unwrap_or("primary"));
    match &migration {
        Some(flag) if flag.completed => {
            println!("Migration:       ✅ COMPLETED (at {})", format_millis(flag.timestamp))
        }
        _ => println!("Migration:       ⏳ NOT RUN"),
    }
    println!("Queued Items:    {}", queue.len());
    println!("Pending Changes: {}", pending);
    println!("Sync Errors:     {}", errors.len());

    if args.detailed && !queue.is_empty() {
        println!("\n--- Queue ---");
        for item in &queue {
            println!(
                "{}  {:<6} {:<11} retries={} status={:?}",
                item.id, item.op_type, item.entity, item.retries, item.status
            );
        }
    }

    if !errors.is_empty() {
        println!("\n--- Errors ---");
        for error in &errors {
            println!("❌ {}", error);
        }
    }

    Ok(())
}

fn format_millis(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}
