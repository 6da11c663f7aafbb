//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了离线同步队列：在本地记录 CREATE / UPDATE / DELETE 操作，
//! 在线时按入队顺序回放到远程存储，失败的条目有限次重试。

pub mod connectivity;
pub mod item;
pub mod migration;
pub mod status;

use crate::config::{SyncConfig, MIN_SYNC_INTERVAL};
use crate::error::{CacheError, Result};
use crate::metrics::GLOBAL_METRICS;
use crate::remote::RemoteStore;
use crate::storage::{LocalStorage, StorageExt};
use crate::utils::{looks_like_remote_id, now_millis};
use serde_json::Value;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub use connectivity::ConnectivityMonitor;
pub use item::{Entity, SyncItemStatus, SyncOperation, SyncQueueItem};
pub use migration::{LocalSnapshot, MigrationFlag, MigrationReport, MigrationStrategy};
pub use status::SyncStatus;

/// 一次刷新的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    /// 成功同步（包括因已有远程 ID 而跳过的 CREATE）
    pub synced: usize,
    /// 失败后重新排队
    pub retried: usize,
    /// 重试耗尽被丢弃
    pub dropped: usize,
}

#[derive(Debug, Clone)]
struct Session {
    external_user_id: String,
    /// 远程存储的内部用户 ID，首次成功解析后缓存
    internal_user_id: Option<String>,
}

struct SyncInner {
    name: String,
    config: SyncConfig,
    remote: Option<Arc<dyn RemoteStore>>,
    storage: Arc<dyn LocalStorage>,
    connectivity: ConnectivityMonitor,
    queue: Mutex<Vec<SyncQueueItem>>,
    errors: Mutex<Vec<String>>,
    status: RwLock<SyncStatus>,
    /// 刷新锁，保证同一时间最多一个刷新在进行
    flush_lock: Mutex<()>,
    init_lock: Mutex<()>,
    session: RwLock<Option<Session>>,
    background: StdMutex<Option<Background>>,
}

struct Background {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// 离线同步队列
///
/// 克隆开销很小，所有克隆共享同一个队列。后台任务只持有弱引用，
/// 最后一个克隆被释放后自动退出。
#[derive(Clone)]
pub struct SyncQueue {
    inner: Arc<SyncInner>,
}

/// 持久化队列内容的存储键
pub fn queue_key(prefix: &str) -> String {
    format!("{}sync_queue", prefix)
}

/// 持久化同步错误的存储键
pub fn errors_key(prefix: &str) -> String {
    format!("{}sync_errors", prefix)
}

fn count_pending(items: &[SyncQueueItem]) -> usize {
    items
        .iter()
        .filter(|i| i.status == SyncItemStatus::Pending)
        .count()
}

impl SyncQueue {
    /// 创建同步队列并恢复持久化的队列内容
    ///
    /// 持久化数据中处于 `syncing` 的条目会重置为 `pending`
    pub fn new(
        config: SyncConfig,
        remote: Option<Arc<dyn RemoteStore>>,
        storage: Arc<dyn LocalStorage>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        let prefix = &config.storage_prefix;
        let mut items: Vec<SyncQueueItem> = match storage.get_json(&queue_key(prefix)) {
            Ok(items) => items.unwrap_or_default(),
            Err(e) => {
                warn!("Discarding unreadable persisted sync queue: {}", e);
                Vec::new()
            }
        };
        items.retain(|i| {
            matches!(
                i.status,
                SyncItemStatus::Pending | SyncItemStatus::Syncing
            )
        });
        for item in items.iter_mut() {
            item.status = SyncItemStatus::Pending;
        }
        let errors: Vec<String> = match storage.get_json(&errors_key(prefix)) {
            Ok(errors) => errors.unwrap_or_default(),
            Err(e) => {
                warn!("Discarding unreadable persisted sync errors: {}", e);
                Vec::new()
            }
        };

        if config.interval_secs == 0 {
            warn!("Sync interval of 0s is raised to {}s", MIN_SYNC_INTERVAL.as_secs());
        }
        if remote.is_none() {
            warn!("No remote store configured, sync queue runs in local-only mode");
        }
        if !items.is_empty() {
            info!("Restored {} pending sync operations", items.len());
        }

        let name = "sync_queue".to_string();
        let status = SyncStatus {
            is_online: connectivity.is_online(),
            is_syncing: false,
            last_sync_time: None,
            pending_changes: count_pending(&items),
            sync_errors: errors.clone(),
        };
        GLOBAL_METRICS.set_queue_length(&name, status.pending_changes);

        Self {
            inner: Arc::new(SyncInner {
                name,
                config,
                remote,
                storage,
                connectivity,
                queue: Mutex::new(items),
                errors: Mutex::new(errors),
                status: RwLock::new(status),
                flush_lock: Mutex::new(()),
                init_lock: Mutex::new(()),
                session: RwLock::new(None),
                background: StdMutex::new(None),
            }),
        }
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.inner.connectivity
    }

    /// 为用户初始化同步
    ///
    /// 同一用户重复调用时直接返回。首次调用会探测远程数据并决定是否
    /// 迁移本地数据，然后把本地存储切换为仅缓存模式并启动后台刷新。
    /// 迁移过程中的任何错误只记录日志，初始化总会完成。
    #[instrument(skip(self), level = "debug")]
    pub async fn initialize(&self, user_id: &str) {
        let _init = self.inner.init_lock.lock().await;
        if let Some(session) = self.inner.session.read().await.as_ref() {
            if session.external_user_id == user_id {
                debug!("Sync queue already initialized for this user");
                return;
            }
        }

        info!("Initializing sync queue");
        let internal_user_id = match &self.inner.remote {
            Some(remote) => match self.prepare_remote(remote.as_ref(), user_id).await {
                Ok(id) => id,
                Err(e) => {
                    warn!("Remote preparation failed, continuing without migration: {}", e);
                    None
                }
            },
            None => None,
        };

        *self.inner.session.write().await = Some(Session {
            external_user_id: user_id.to_string(),
            internal_user_id,
        });

        if let Err(e) =
            migration::mark_cache_only(self.inner.storage.as_ref(), &self.inner.config.storage_prefix)
        {
            warn!("Failed to switch local storage to cache-only mode: {}", e);
        }

        self.start_sync();
        info!("Sync queue initialized");
    }

    /// 探测远程数据并按需迁移，返回已知的内部用户 ID
    async fn prepare_remote(&self, remote: &dyn RemoteStore, user_id: &str) -> Result<Option<String>> {
        let storage = self.inner.storage.as_ref();
        let prefix = &self.inner.config.storage_prefix;

        let already_migrated = migration::migration_flag(storage, prefix)
            .unwrap_or_else(|e| {
                warn!("Unreadable migration flag: {}", e);
                None
            })
            .map(|flag| flag.completed)
            .unwrap_or(false);
        let snapshot = LocalSnapshot::load(storage, prefix);

        let existing_user = remote.find_user(user_id).await?;
        let remote_has_data = match &existing_user {
            Some(id) => remote.has_accounts(id).await?,
            None => false,
        };
        let local_has_data = !already_migrated && !snapshot.is_empty();

        match MigrationStrategy::decide(remote_has_data, local_has_data) {
            MigrationStrategy::Migrate => {
                let internal = remote.ensure_user(user_id).await?;
                migration::migrate(
                    remote,
                    storage,
                    prefix,
                    &internal,
                    &snapshot,
                    self.inner.config.migration_batch_size,
                )
                .await?;
                Ok(Some(internal))
            }
            MigrationStrategy::RemoteWins => {
                info!("Remote data is authoritative, local data is not uploaded");
                Ok(existing_user)
            }
            MigrationStrategy::RemoteOnly | MigrationStrategy::Nothing => {
                debug!("No migration needed");
                Ok(existing_user)
            }
        }
    }

    /// 启动后台刷新定时器和连接状态监听，已启动时不做任何事
    pub fn start_sync(&self) {
        let mut background = self
            .inner
            .background
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if background.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let period = self.inner.config.interval();
        let weak = Arc::downgrade(&self.inner);

        let ticker = {
            let token = token.clone();
            let weak: Weak<SyncInner> = weak.clone();
            tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = interval.tick() => {
                            let Some(inner) = weak.upgrade() else { break };
                            SyncQueue { inner }.process_sync_queue().await;
                        }
                    }
                }
                debug!("Sync timer stopped");
            })
        };

        let listener = {
            let token = token.clone();
            let mut rx = self.inner.connectivity.subscribe();
            tokio::spawn(async move {
                // 订阅时的当前值被视为已读，启动前发生的变化要在这里补上
                let initial = *rx.borrow_and_update();
                if let Some(inner) = weak.upgrade() {
                    SyncQueue { inner }.apply_connectivity(initial).await;
                }
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        changed = rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            let online = *rx.borrow_and_update();
                            let Some(inner) = weak.upgrade() else { break };
                            SyncQueue { inner }.apply_connectivity(online).await;
                        }
                    }
                }
                debug!("Connectivity listener stopped");
            })
        };

        *background = Some(Background {
            token,
            handles: vec![ticker, listener],
        });
        info!(
            "Background sync started: interval={}s",
            self.inner.config.interval_secs
        );
    }

    /// 停止后台刷新和连接监听，可重复调用
    ///
    /// 正在进行的刷新不会被中断
    pub fn stop_sync(&self) {
        let background = self
            .inner
            .background
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(background) = background {
            background.token.cancel();
            drop(background.handles);
            info!("Background sync stopped");
        }
    }

    /// 是否有后台任务在运行
    pub fn is_running(&self) -> bool {
        self.inner
            .background
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// 停止后台任务并清除用户会话，可重复调用
    pub async fn destroy(&self) {
        self.stop_sync();
        *self.inner.session.write().await = None;
        debug!("Sync queue destroyed");
    }

    /// 将操作加入队列
    ///
    /// UPDATE / DELETE 的负载必须带字符串 `id`。在线时立即在后台触发一次刷新。
    #[instrument(skip(self, data), level = "debug")]
    pub async fn queue_operation(
        &self,
        op_type: SyncOperation,
        entity: Entity,
        data: Value,
    ) -> Result<SyncQueueItem> {
        if !data.is_object() {
            return Err(CacheError::InvalidInput(format!(
                "{} {} payload must be a JSON object",
                op_type, entity
            )));
        }
        if op_type != SyncOperation::Create
            && data.get("id").and_then(Value::as_str).is_none()
        {
            return Err(CacheError::InvalidInput(format!(
                "{} {} payload requires an id",
                op_type, entity
            )));
        }

        let item = SyncQueueItem::new(op_type, entity, data);
        {
            let mut queue = self.inner.queue.lock().await;
            queue.push(item.clone());
            self.persist_queue(&queue);
            self.refresh_pending(&queue).await;
        }
        GLOBAL_METRICS.record_request("sync", "queue", op_type.to_string().as_str());
        debug!("Queued {} {} as {}", op_type, entity, item.id);

        if self.is_online() && self.inner.flush_lock.try_lock().is_ok() {
            let queue = self.clone();
            tokio::spawn(async move {
                queue.process_sync_queue().await;
            });
        }
        Ok(item)
    }

    /// 执行一次刷新
    ///
    /// 离线、已有刷新在进行、未初始化或未配置远程存储时跳过并返回 None。
    /// 否则按入队顺序逐个处理开始时处于 pending 的条目。
    #[instrument(skip(self), level = "debug")]
    pub async fn process_sync_queue(&self) -> Option<FlushReport> {
        if !self.is_online() {
            debug!("Offline, flush skipped");
            return None;
        }
        let Ok(_flush) = self.inner.flush_lock.try_lock() else {
            debug!("Flush already running, skipped");
            return None;
        };
        self.flush_locked().await
    }

    /// 立即刷新，等待正在进行的刷新结束而不是跳过
    pub async fn force_sync(&self) -> Result<FlushReport> {
        if self.inner.session.read().await.is_none() {
            return Err(CacheError::NotInitialized(
                "force_sync called before initialize".to_string(),
            ));
        }
        if self.inner.remote.is_none() {
            return Err(CacheError::RemoteUnavailable(
                "no remote store configured".to_string(),
            ));
        }
        if !self.is_online() {
            return Err(CacheError::RemoteUnavailable("offline".to_string()));
        }
        let _flush = self.inner.flush_lock.lock().await;
        Ok(self.flush_locked().await.unwrap_or_default())
    }

    /// 持有刷新锁时执行刷新
    async fn flush_locked(&self) -> Option<FlushReport> {
        if self.inner.remote.is_none() || self.inner.session.read().await.is_none() {
            debug!("Sync not ready, flush skipped");
            return None;
        }

        let start = std::time::Instant::now();
        self.inner.status.write().await.is_syncing = true;

        let snapshot: Vec<SyncQueueItem> = self
            .inner
            .queue
            .lock()
            .await
            .iter()
            .filter(|i| i.status == SyncItemStatus::Pending)
            .cloned()
            .collect();
        let mut report = FlushReport::default();
        if !snapshot.is_empty() {
            debug!("Flushing {} sync operations", snapshot.len());
        }

        for item in snapshot {
            self.set_item_status(&item.id, SyncItemStatus::Syncing).await;
            let outcome = self.sync_item(&item).await;
            self.settle(&item, outcome, &mut report).await;
        }

        {
            let queue = self.inner.queue.lock().await;
            let mut status = self.inner.status.write().await;
            status.is_syncing = false;
            status.last_sync_time = Some(now_millis());
            status.pending_changes = count_pending(&queue);
            GLOBAL_METRICS.set_queue_length(&self.inner.name, status.pending_changes);
        }
        GLOBAL_METRICS.record_duration("sync", "flush", start.elapsed().as_secs_f64());
        if report != FlushReport::default() {
            info!(
                "Flush finished: synced={}, retried={}, dropped={}",
                report.synced, report.retried, report.dropped
            );
        }
        Some(report)
    }

    async fn set_item_status(&self, id: &str, status: SyncItemStatus) {
        let mut queue = self.inner.queue.lock().await;
        if let Some(item) = queue.iter_mut().find(|i| i.id == id) {
            item.status = status;
        }
        self.persist_queue(&queue);
    }

    /// 根据同步结果更新队列
    async fn settle(&self, item: &SyncQueueItem, outcome: Result<()>, report: &mut FlushReport) {
        let mut queue = self.inner.queue.lock().await;
        let Some(pos) = queue.iter().position(|i| i.id == item.id) else {
            return;
        };

        match outcome {
            Ok(()) => {
                queue.remove(pos);
                report.synced += 1;
                GLOBAL_METRICS.record_request("sync", "flush", "success");
            }
            Err(e) => {
                let entry = &mut queue[pos];
                entry.retries += 1;
                if entry.retries > self.inner.config.max_retries {
                    let message = format!(
                        "Failed to sync {} {} ({}) after {} attempts: {}",
                        entry.op_type, entry.entity, entry.id, entry.retries, e
                    );
                    error!("{}", message);
                    queue.remove(pos);
                    report.dropped += 1;
                    GLOBAL_METRICS.record_request("sync", "flush", "dropped");

                    let mut errors = self.inner.errors.lock().await;
                    errors.push(message);
                    self.persist_errors(&errors);
                    self.inner.status.write().await.sync_errors = errors.clone();
                } else {
                    warn!(
                        "Sync of {} {} failed (attempt {}), will retry: {}",
                        entry.op_type, entry.entity, entry.retries, e
                    );
                    entry.status = SyncItemStatus::Pending;
                    report.retried += 1;
                    GLOBAL_METRICS.record_request("sync", "flush", "failure");
                }
            }
        }
        self.persist_queue(&queue);
    }

    /// 把单个条目同步到远程存储
    ///
    /// 未初始化时返回 `NotInitialized`，未配置远程存储时返回 `RemoteUnavailable`
    #[instrument(skip(self, item), level = "debug", fields(id = %item.id))]
    pub async fn sync_item(&self, item: &SyncQueueItem) -> Result<()> {
        if self.inner.session.read().await.is_none() {
            return Err(CacheError::NotInitialized(
                "sync_item called before initialize".to_string(),
            ));
        }
        let Some(remote) = self.inner.remote.as_ref() else {
            return Err(CacheError::RemoteUnavailable(
                "no remote store configured".to_string(),
            ));
        };
        let user_id = self.resolve_user(remote.as_ref()).await?;
        let table = item.entity.table();

        match item.op_type {
            SyncOperation::Create => {
                if let Some(id) = item.data_id() {
                    if looks_like_remote_id(id) {
                        debug!("CREATE {} already has a remote id, skipped", item.entity);
                        return Ok(());
                    }
                }
                let mut row = item.data.as_object().cloned().ok_or_else(|| {
                    CacheError::InvalidInput("CREATE payload must be a JSON object".to_string())
                })?;
                row.remove("id");
                row.insert("user_id".to_string(), Value::String(user_id));
                remote.insert(table, Value::Object(row)).await?;
            }
            SyncOperation::Update => {
                let id = item.data_id().ok_or_else(|| {
                    CacheError::InvalidInput("UPDATE payload requires an id".to_string())
                })?;
                let mut patch = item.data.clone();
                if let Some(fields) = patch.as_object_mut() {
                    fields.remove("id");
                }
                remote.update(table, id, &user_id, patch).await?;
            }
            SyncOperation::Delete => {
                let id = item.data_id().ok_or_else(|| {
                    CacheError::InvalidInput("DELETE payload requires an id".to_string())
                })?;
                remote.delete(table, id, &user_id).await?;
            }
        }
        Ok(())
    }

    /// 解析内部用户 ID，远程不存在时创建
    async fn resolve_user(&self, remote: &dyn RemoteStore) -> Result<String> {
        let external = {
            let session = self.inner.session.read().await;
            let Some(session) = session.as_ref() else {
                return Err(CacheError::NotInitialized("no active user".to_string()));
            };
            if let Some(id) = &session.internal_user_id {
                return Ok(id.clone());
            }
            session.external_user_id.clone()
        };

        let internal = remote.ensure_user(&external).await?;
        if let Some(session) = self.inner.session.write().await.as_mut() {
            if session.external_user_id == external {
                session.internal_user_id = Some(internal.clone());
            }
        }
        Ok(internal)
    }

    /// 处理连接状态变化：上线时立即刷新，下线时只更新状态
    #[instrument(skip(self), level = "debug")]
    pub async fn handle_connectivity_change(&self, online: bool) {
        {
            let mut status = self.inner.status.write().await;
            status.is_online = online;
            self.inner.connectivity.set_online(online);
        }
        if online {
            info!("Back online, flushing sync queue");
            self.process_sync_queue().await;
        } else {
            info!("Offline, sync paused");
        }
    }

    /// 监听到的连接状态与已处理的状态不同时才处理
    async fn apply_connectivity(&self, online: bool) {
        if self.inner.status.read().await.is_online == online {
            return;
        }
        self.handle_connectivity_change(online).await;
    }

    /// 当前是否在线，以连接信号为准
    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    /// 获取同步状态快照
    pub async fn get_sync_status(&self) -> SyncStatus {
        let mut status = self.inner.status.read().await.clone();
        status.is_online = self.is_online();
        status
    }

    /// 当前队列内容
    pub async fn queue_snapshot(&self) -> Vec<SyncQueueItem> {
        self.inner.queue.lock().await.clone()
    }

    /// 清空已记录的同步错误
    pub async fn clear_errors(&self) {
        let mut errors = self.inner.errors.lock().await;
        errors.clear();
        self.persist_errors(&errors);
        self.inner.status.write().await.sync_errors.clear();
    }

    async fn refresh_pending(&self, queue: &[SyncQueueItem]) {
        let pending = count_pending(queue);
        self.inner.status.write().await.pending_changes = pending;
        GLOBAL_METRICS.set_queue_length(&self.inner.name, pending);
    }

    fn persist_queue(&self, queue: &[SyncQueueItem]) {
        let key = queue_key(&self.inner.config.storage_prefix);
        if let Err(e) = self.inner.storage.set_json(&key, queue) {
            warn!("Failed to persist sync queue: {}", e);
        }
    }

    fn persist_errors(&self, errors: &[String]) {
        let key = errors_key(&self.inner.config.storage_prefix);
        if let Err(e) = self.inner.storage.set_json(&key, errors) {
            warn!("Failed to persist sync errors: {}", e);
        }
    }
}

impl std::fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueue")
            .field("name", &self.inner.name)
            .field("remote", &self.inner.remote.as_ref().map(|r| r.name().to_string()))
            .finish()
    }
}
