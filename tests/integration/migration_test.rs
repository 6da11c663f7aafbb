//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 首次登录时本地数据迁移集成测试

#[path = "../common/mod.rs"]
mod common;

use common::{memory_remote, memory_storage, setup_logging, sync_config};
use serde_json::{json, Value};
use std::sync::Arc;
use wealthcache::config::SyncConfig;
use wealthcache::remote::RemoteStore;
use wealthcache::sync::migration::{
    collection_key, migration_flag, migration_flag_key, storage_mode_key,
};
use wealthcache::sync::{ConnectivityMonitor, MigrationFlag, SyncQueue};
use wealthcache::{Entity, LocalStorage, MemoryRemoteStore, StorageExt};

fn small_batches() -> SyncConfig {
    SyncConfig {
        migration_batch_size: 2,
        ..sync_config()
    }
}

fn seed_local(storage: &Arc<dyn LocalStorage>, prefix: &str) {
    storage
        .set_json(
            &collection_key(prefix, Entity::Account),
            &vec![
                json!({"id": "local-a", "name": "Everyday", "type": "current", "balance": 120}),
                json!({"id": "local-b", "name": "Card", "type": "credit", "balance": -40}),
            ],
        )
        .unwrap();
    storage
        .set_json(
            &collection_key(prefix, Entity::Transaction),
            &vec![
                json!({"id": "t1", "accountId": "local-a", "amount": -12.5}),
                json!({"id": "t2", "accountId": "local-a", "amount": -3.0}),
                json!({"id": "t3", "account_id": "local-b", "amount": -20.0}),
                json!({"id": "t4", "accountId": "local-a", "amount": 1000.0}),
                json!({"id": "t5", "accountId": "deleted-account", "amount": -1.0}),
            ],
        )
        .unwrap();
}

fn queue_with(
    config: SyncConfig,
    remote: &Arc<MemoryRemoteStore>,
    storage: Arc<dyn LocalStorage>,
) -> SyncQueue {
    setup_logging();
    SyncQueue::new(
        config,
        Some(remote.clone() as Arc<dyn RemoteStore>),
        storage,
        ConnectivityMonitor::new(true),
    )
}

fn remote_id_of(remote: &MemoryRemoteStore, name: &str) -> String {
    remote
        .rows("accounts")
        .into_iter()
        .find(|r| r["name"] == json!(name))
        .and_then(|r| r["id"].as_str().map(str::to_string))
        .unwrap()
}

fn with_amount(rows: &[Value], amount: f64) -> &Value {
    rows.iter()
        .find(|t| t["amount"].as_f64() == Some(amount))
        .unwrap()
}

#[tokio::test]
async fn test_first_login_migrates_local_data() {
    let config = small_batches();
    let prefix = config.storage_prefix.clone();
    let storage = memory_storage();
    seed_local(&storage, &prefix);
    let remote = memory_remote();

    let queue = queue_with(config, &remote, storage.clone());
    queue.initialize("new-user").await;

    let accounts = remote.rows("accounts");
    assert_eq!(accounts.len(), 2);
    let user_id = accounts[0]["user_id"].as_str().unwrap().to_string();
    assert!(accounts.iter().all(|a| a["id"] != json!("local-a") && a["id"] != json!("local-b")));
    let everyday = accounts.iter().find(|a| a["name"] == json!("Everyday")).unwrap();
    assert_eq!(everyday["type"], json!("checking"));
    let card = accounts.iter().find(|a| a["name"] == json!("Card")).unwrap();
    assert_eq!(card["type"], json!("credit_card"));

    let everyday_id = remote_id_of(&remote, "Everyday");
    let card_id = remote_id_of(&remote, "Card");
    let transactions = remote.rows("transactions");
    assert_eq!(transactions.len(), 4);
    for t in &transactions {
        assert_eq!(t["user_id"], json!(user_id));
        assert!(t.get("accountId").is_none());
    }
    assert_eq!(
        with_amount(&transactions, -12.5)["account_id"],
        json!(everyday_id)
    );
    assert_eq!(with_amount(&transactions, -20.0)["account_id"], json!(card_id));

    // 1 次账户插入 + 4 笔交易按 2 条一批
    assert_eq!(remote.call_count("insert_many"), 3);

    let flag: MigrationFlag = migration_flag(storage.as_ref(), &prefix).unwrap().unwrap();
    assert!(flag.completed);
    assert!(flag.timestamp > 0);
    let mode: Option<String> = storage.get_json(&storage_mode_key(&prefix)).unwrap();
    assert_eq!(mode.as_deref(), Some("cache_only"));

    // 迁移后本地数据保留，仅作为缓存
    assert!(storage
        .get_item(&collection_key(&prefix, Entity::Account))
        .unwrap()
        .is_some());

    // 迁移得到的内部用户 ID 用于后续同步
    assert_eq!(remote.call_count("ensure_user"), 1);
    queue.destroy().await;
}

#[tokio::test]
async fn test_initialize_twice_probes_once() {
    let remote = memory_remote();
    remote.register_user("user-1", "internal-1");
    let queue = queue_with(small_batches(), &remote, memory_storage());

    queue.initialize("user-1").await;
    queue.initialize("user-1").await;

    assert_eq!(remote.call_count("find_user"), 1);
    assert_eq!(remote.call_count("has_accounts"), 1);
    assert_eq!(remote.write_count(), 0);

    // 切换用户会重新探测
    queue.initialize("user-2").await;
    assert_eq!(remote.call_count("find_user"), 2);
    queue.destroy().await;
}

#[tokio::test]
async fn test_concurrent_initialize_probes_once() {
    let remote = memory_remote();
    remote.set_delay(std::time::Duration::from_millis(20));
    let queue = queue_with(small_batches(), &remote, memory_storage());

    let (a, b) = (queue.clone(), queue.clone());
    tokio::join!(a.initialize("user-1"), b.initialize("user-1"));

    assert_eq!(remote.call_count("find_user"), 1);
    queue.destroy().await;
}

#[tokio::test]
async fn test_remote_data_wins_over_local() {
    let config = small_batches();
    let prefix = config.storage_prefix.clone();
    let storage = memory_storage();
    seed_local(&storage, &prefix);

    let remote = memory_remote();
    remote.register_user("user-1", "internal-1");
    remote.seed(
        "accounts",
        json!({"id": "remote-acc", "user_id": "internal-1", "name": "Remote"}),
    );

    let queue = queue_with(config, &remote, storage.clone());
    queue.initialize("user-1").await;

    assert_eq!(remote.write_count(), 0);
    assert_eq!(remote.rows("accounts").len(), 1);
    assert!(migration_flag(storage.as_ref(), &prefix).unwrap().is_none());
    let mode: Option<String> = storage.get_json(&storage_mode_key(&prefix)).unwrap();
    assert_eq!(mode.as_deref(), Some("cache_only"));
    queue.destroy().await;
}

#[tokio::test]
async fn test_completed_migration_is_not_repeated() {
    let config = small_batches();
    let prefix = config.storage_prefix.clone();
    let storage = memory_storage();
    seed_local(&storage, &prefix);
    storage
        .set_json(
            &migration_flag_key(&prefix),
            &MigrationFlag {
                completed: true,
                timestamp: 1,
            },
        )
        .unwrap();

    let remote = memory_remote();
    let queue = queue_with(config, &remote, storage);
    queue.initialize("user-1").await;

    assert_eq!(remote.write_count(), 0);
    assert!(remote.rows("accounts").is_empty());
    queue.destroy().await;
}

#[tokio::test]
async fn test_failed_account_batch_skips_transactions() {
    let config = small_batches();
    let prefix = config.storage_prefix.clone();
    let storage = memory_storage();
    seed_local(&storage, &prefix);

    let remote = memory_remote();
    remote.fail_next(1);
    let queue = queue_with(config, &remote, storage.clone());
    queue.initialize("user-1").await;

    assert!(remote.rows("accounts").is_empty());
    assert!(remote.rows("transactions").is_empty());
    // 失败的批次不会阻止初始化完成
    assert!(queue.is_running());
    let flag = migration_flag(storage.as_ref(), &prefix).unwrap().unwrap();
    assert!(flag.completed);
    queue.destroy().await;
}

#[tokio::test]
async fn test_direct_migration_report() {
    let prefix = "direct_";
    let storage = memory_storage();
    seed_local(&storage, prefix);
    let snapshot = wealthcache::sync::LocalSnapshot::load(storage.as_ref(), prefix);
    assert!(!snapshot.is_empty());

    let remote = MemoryRemoteStore::new();
    let report = wealthcache::sync::migration::migrate(
        &remote,
        storage.as_ref(),
        prefix,
        "internal-9",
        &snapshot,
        3,
    )
    .await
    .unwrap();

    assert_eq!(report.accounts_migrated, 2);
    assert_eq!(report.transactions_migrated, 4);
    assert_eq!(report.transactions_skipped, 1);
    assert_eq!(report.failed_batches, 0);
    assert_eq!(remote.call_count("insert_many"), 3);
}

#[tokio::test]
async fn test_unreadable_local_collection_is_ignored() {
    let prefix = "broken_";
    let storage = memory_storage();
    storage
        .set_item(&collection_key(prefix, Entity::Account), "{oops")
        .unwrap();

    let snapshot = wealthcache::sync::LocalSnapshot::load(storage.as_ref(), prefix);
    assert!(snapshot.is_empty());
}
