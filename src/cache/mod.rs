//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了智能缓存：容量受限的 LRU 内存缓存，支持过期时间、
//! 依赖级联失效、过期命中后台刷新（stale-while-revalidate）以及偏好持久化。

pub mod dependency;
pub mod entry;
pub mod helpers;
pub mod memoize;
pub mod pattern;
pub mod warmup;

use crate::backend::{ExpiryQueue, LruStore};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::metrics::GLOBAL_METRICS;
use crate::serialization::{JsonSerializer, Serializer};
use crate::storage::{LocalStorage, StorageExt};
use crate::utils::{duration_millis, now_millis, validate_cache_key};
use dashmap::DashSet;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use dependency::DependencyIndex;
pub use entry::{CacheEntry, CacheStats};
pub use helpers::{calculation_key, BatchRequest, BoxedFetcher};
pub use memoize::{memoize, MemoizeOptions, Memoized};
pub use pattern::KeyPattern;
pub use warmup::{WarmupPrediction, WarmupResult};

/// 永不过期的 TTL
pub const INFINITE_TTL: Duration = Duration::MAX;

/// 偏好设置在缓存中的键前缀
pub(crate) const PREFERENCE_KEY_PREFIX: &str = "pref:";

/// 读写选项
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// 新鲜度窗口 / 过期时间，None 使用缓存默认值
    pub ttl: Option<Duration>,
    /// 依赖键，任一依赖失效时本条目随之失效
    pub dependencies: Vec<String>,
    /// 跳过缓存读取，总是调用 fetcher
    pub force_refresh: bool,
    /// 覆盖缓存级别的 stale-while-revalidate 设置
    pub stale_while_revalidate: Option<bool>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub fn with_force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    pub fn with_stale_while_revalidate(mut self, enabled: bool) -> Self {
        self.stale_while_revalidate = Some(enabled);
        self
    }
}

struct CacheState {
    store: LruStore<CacheEntry>,
    expiry: ExpiryQueue,
    deps: DependencyIndex,
    stats: CacheStats,
}

impl CacheState {
    /// 删除所有已到硬过期时间的条目，返回淘汰数量
    fn purge_expired(&mut self, now: u64) -> usize {
        let mut purged = 0;
        for (key, at) in self.expiry.pop_due(now) {
            let current = self.store.peek(&key).and_then(|e| e.expires_at);
            if current == Some(at) {
                self.store.remove(&key);
                self.deps.purge(&key);
                self.stats.evictions += 1;
                purged += 1;
                debug!("Cache entry expired: key={}", key);
            }
        }

        // 频繁覆盖同一个键会在堆里留下残留记录
        if self.expiry.len() > self.store.len().saturating_mul(4).max(64) {
            let live: Vec<(String, u64)> = self
                .store
                .iter()
                .filter_map(|(k, e)| e.expires_at.map(|at| (k.clone(), at)))
                .collect();
            self.expiry.rebuild(live);
        }

        self.stats.size = self.store.len();
        purged
    }
}

struct CacheInner {
    name: String,
    config: CacheConfig,
    state: Mutex<CacheState>,
    revalidating: DashSet<String>,
    storage: Option<Arc<dyn LocalStorage>>,
    serializer: JsonSerializer,
}

/// 智能缓存
///
/// 克隆开销很小，所有克隆共享同一份状态。条目映射、过期堆、
/// 依赖索引和统计信息由同一把锁保护，锁不会跨越 `.await` 持有。
#[derive(Clone)]
pub struct SmartCache {
    inner: Arc<CacheInner>,
}

/// 后台刷新期间占用的去重标记，任务结束（包括 panic）时释放
struct RevalidationGuard {
    inner: Arc<CacheInner>,
    key: String,
}

impl Drop for RevalidationGuard {
    fn drop(&mut self) {
        self.inner.revalidating.remove(&self.key);
    }
}

enum Lookup {
    Fresh(serde_json::Value),
    Stale(serde_json::Value),
    Missing,
}

impl SmartCache {
    /// 创建纯内存缓存
    pub fn new(name: impl Into<String>, config: CacheConfig) -> Self {
        Self::build(name.into(), config, None)
    }

    /// 创建带本地存储的缓存
    ///
    /// `persist_to_storage` 开启时会从存储中恢复偏好设置，
    /// 无法解析的条目会被跳过，存储读取失败时退化为纯内存模式。
    pub fn with_storage(
        name: impl Into<String>,
        config: CacheConfig,
        storage: Arc<dyn LocalStorage>,
    ) -> Self {
        let cache = Self::build(name.into(), config, Some(storage));
        if cache.inner.config.persist_to_storage {
            cache.rehydrate_preferences();
        }
        cache
    }

    fn build(name: String, config: CacheConfig, storage: Option<Arc<dyn LocalStorage>>) -> Self {
        let state = CacheState {
            store: LruStore::new(config.max_size),
            expiry: ExpiryQueue::new(),
            deps: DependencyIndex::new(),
            stats: CacheStats::default(),
        };
        info!(
            "Creating SmartCache {}: max_size={}, ttl={}s, swr={}",
            name, config.max_size, config.ttl_secs, config.stale_while_revalidate
        );
        Self {
            inner: Arc::new(CacheInner {
                name,
                config,
                state: Mutex::new(state),
                revalidating: DashSet::new(),
                storage,
                serializer: JsonSerializer::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub(crate) fn storage(&self) -> Option<&Arc<dyn LocalStorage>> {
        self.inner.storage.as_ref()
    }

    pub(crate) fn serializer(&self) -> &JsonSerializer {
        &self.inner.serializer
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn default_ttl(&self) -> Duration {
        self.inner.config.ttl()
    }

    /// 读取缓存值，不回源
    ///
    /// 条目超出默认新鲜度窗口时返回 None，同时计一次命中和一次未命中
    #[instrument(skip(self), level = "debug", fields(cache = %self.inner.name))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get_with(key, CacheOptions::default()).await
    }

    /// 按选项读取缓存值，不回源
    #[instrument(skip(self, options), level = "debug", fields(cache = %self.inner.name))]
    pub async fn get_with<T: DeserializeOwned>(
        &self,
        key: &str,
        options: CacheOptions,
    ) -> Result<Option<T>> {
        let ttl = options.ttl.unwrap_or_else(|| self.default_ttl());
        match self.lookup(key, ttl, false) {
            Lookup::Fresh(value) => Ok(Some(self.inner.serializer.from_value(value)?)),
            Lookup::Stale(_) | Lookup::Missing => Ok(None),
        }
    }

    /// 读取缓存值，未命中时调用 `fetcher` 加载并写入缓存
    ///
    /// - `force_refresh` 时总是调用 `fetcher`
    /// - 命中且新鲜时直接返回
    /// - 命中但陈旧且开启 stale-while-revalidate 时返回旧值，并在后台刷新
    /// - 其余情况同步调用 `fetcher`；失败时若仍有旧值则返回旧值，否则返回错误
    #[instrument(skip(self, fetcher, options), level = "debug", fields(cache = %self.inner.name))]
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        options: CacheOptions,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        validate_cache_key(key)?;

        if options.force_refresh {
            debug!("Force refresh for key: {}", key);
            return self.fetch_and_store(key, fetcher, &options).await;
        }

        let ttl = options.ttl.unwrap_or_else(|| self.default_ttl());
        let swr = options
            .stale_while_revalidate
            .unwrap_or(self.inner.config.stale_while_revalidate);

        match self.lookup(key, ttl, swr) {
            Lookup::Fresh(value) => return self.inner.serializer.from_value(value),
            Lookup::Stale(value) => {
                match self.inner.serializer.from_value(value) {
                    Ok(stale) => {
                        self.spawn_revalidation(key, fetcher, options);
                        return Ok(stale);
                    }
                    Err(e) => {
                        warn!("Stale value for key {} could not be decoded: {}", key, e);
                    }
                }
                return self.fetch_and_store(key, fetcher, &options).await;
            }
            Lookup::Missing => {}
        }

        self.fetch_and_store(key, fetcher, &options).await
    }

    /// 查找条目并更新统计
    ///
    /// `serve_stale` 为 true 时陈旧条目也会作为命中返回
    fn lookup(&self, key: &str, ttl: Duration, serve_stale: bool) -> Lookup {
        let now = now_millis();
        let ttl_ms = duration_millis(ttl);
        let mut state = self.state();
        state.purge_expired(now);

        // 条目存在即计为命中；陈旧且不返回旧值时再按未命中处理
        let found = state.store.get_mut(key).map(|entry| {
            entry.hits += 1;
            (entry.data.clone(), entry.is_stale(now, ttl_ms))
        });
        if found.is_some() {
            state.stats.record_hit();
        }

        let result = match found {
            Some((data, false)) => {
                GLOBAL_METRICS.record_request("cache", "get", "hit");
                Lookup::Fresh(data)
            }
            Some((data, true)) if serve_stale => {
                GLOBAL_METRICS.record_request("cache", "get", "stale");
                Lookup::Stale(data)
            }
            _ => {
                state.stats.record_miss();
                GLOBAL_METRICS.record_request("cache", "get", "miss");
                Lookup::Missing
            }
        };
        let size = state.store.len();
        drop(state);
        GLOBAL_METRICS.set_cache_size(&self.inner.name, size);
        debug!(
            "Cache lookup: key={}, result={}",
            key,
            match &result {
                Lookup::Fresh(_) => "fresh",
                Lookup::Stale(_) => "stale",
                Lookup::Missing => "miss",
            }
        );
        result
    }

    async fn fetch_and_store<T, F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        options: &CacheOptions,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = std::time::Instant::now();
        let fetched = fetcher().await;
        GLOBAL_METRICS.record_duration("cache", "fetch", start.elapsed().as_secs_f64());

        match fetched {
            Ok(value) => {
                self.set(key, &value, options.clone())?;
                GLOBAL_METRICS.record_request("cache", "fetch", "success");
                Ok(value)
            }
            Err(e) => {
                GLOBAL_METRICS.record_request("cache", "fetch", "failure");
                if let Some(last_known) = self.peek_value(key) {
                    warn!(
                        "Fetch failed for key {}, serving last known value: {}",
                        key, e
                    );
                    return self.inner.serializer.from_value(last_known);
                }
                Err(e)
            }
        }
    }

    /// 读取仍在缓存中的值，不考虑新鲜度，也不更新统计
    fn peek_value(&self, key: &str) -> Option<serde_json::Value> {
        self.state().store.peek(key).map(|e| e.data.clone())
    }

    fn spawn_revalidation<T, F, Fut>(&self, key: &str, fetcher: F, options: CacheOptions)
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if !self.inner.revalidating.insert(key.to_string()) {
            debug!("Revalidation already in flight for key: {}", key);
            return;
        }

        let guard = RevalidationGuard {
            inner: self.inner.clone(),
            key: key.to_string(),
        };
        let cache = self.clone();
        let key = key.to_string();
        debug!("Starting background revalidation for key: {}", key);

        tokio::spawn(async move {
            let _guard = guard;
            match fetcher().await {
                Ok(value) => match cache.set(&key, &value, options) {
                    Ok(()) => {
                        GLOBAL_METRICS.record_request("cache", "revalidate", "success");
                        debug!("Background revalidation succeeded for key: {}", key);
                    }
                    Err(e) => warn!("Background revalidation could not store {}: {}", key, e),
                },
                Err(e) => {
                    GLOBAL_METRICS.record_request("cache", "revalidate", "failure");
                    warn!("Background revalidation failed for key {}: {}", key, e);
                }
            }
        });
    }

    /// 该键是否正在后台刷新
    pub fn is_revalidating(&self, key: &str) -> bool {
        self.inner.revalidating.contains(key)
    }

    /// 写入缓存值
    ///
    /// 以当前时间为时间戳、命中数清零；依赖键按追加方式登记。
    /// 新键在容量已满时淘汰最久未使用的条目。
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
        options: CacheOptions,
    ) -> Result<()> {
        validate_cache_key(key)?;
        let value = self.inner.serializer.to_value(data)?;
        self.set_value(key, value, &options);
        Ok(())
    }

    /// 写入已转换为 JSON 的值
    ///
    /// 开启 stale-while-revalidate 时条目在新鲜度窗口之后再保留一个 TTL，
    /// 期间可以作为旧值返回并触发后台刷新。
    pub(crate) fn set_value(&self, key: &str, value: serde_json::Value, options: &CacheOptions) {
        let now = now_millis();
        let ttl_ms = duration_millis(options.ttl.unwrap_or_else(|| self.default_ttl()));
        let swr = options
            .stale_while_revalidate
            .unwrap_or(self.inner.config.stale_while_revalidate);
        let grace_ms = if swr { ttl_ms } else { 0 };
        let expires_at = now
            .checked_add(ttl_ms)
            .and_then(|at| at.checked_add(grace_ms));
        let dependencies = &options.dependencies;
        let deps: BTreeSet<String> = dependencies.iter().cloned().collect();

        let mut state = self.state();
        state.purge_expired(now);

        let entry = CacheEntry::new(value, now, expires_at, deps);
        if let Some((evicted, _)) = state.store.insert(key.to_string(), entry) {
            state.deps.purge(&evicted);
            state.stats.evictions += 1;
            GLOBAL_METRICS.record_request("cache", "evict", "capacity");
            debug!("Cache capacity reached, evicted key: {}", evicted);
        }
        if let Some(at) = expires_at {
            state.expiry.schedule(key, at);
        }
        for dependency in dependencies {
            state.deps.register(dependency, key);
        }
        state.stats.size = state.store.len();
        let size = state.stats.size;
        drop(state);

        GLOBAL_METRICS.record_request("cache", "set", "success");
        GLOBAL_METRICS.set_cache_size(&self.inner.name, size);
        debug!("Cache set: key={}, ttl_ms={}", key, ttl_ms);
    }

    /// 失效匹配的键
    ///
    /// 模式同时匹配缓存键和依赖键。`include_dependents` 为 true 时，
    /// 直接依赖于匹配键的条目一并删除（只级联一层）。
    ///
    /// # 返回值
    ///
    /// 返回实际删除的缓存条目数
    #[instrument(skip(self, pattern), level = "debug", fields(cache = %self.inner.name))]
    pub fn invalidate(&self, pattern: impl Into<KeyPattern>, include_dependents: bool) -> usize {
        let pattern = pattern.into();
        let mut state = self.state();

        let mut matched: BTreeSet<String> = state
            .store
            .keys()
            .filter(|k| pattern.matches(k))
            .cloned()
            .collect();
        let matched_dependencies: Vec<String> = state
            .deps
            .dependency_keys()
            .filter(|k| pattern.matches(k))
            .cloned()
            .collect();

        if include_dependents {
            let roots: Vec<String> = matched
                .iter()
                .cloned()
                .chain(matched_dependencies)
                .collect();
            for root in roots {
                matched.extend(state.deps.take_dependents(&root));
            }
        }

        let mut removed = 0;
        for key in &matched {
            if state.store.remove(key).is_some() {
                removed += 1;
            }
            state.deps.purge(key);
        }
        state.stats.size = state.store.len();
        let size = state.stats.size;
        drop(state);

        GLOBAL_METRICS.set_cache_size(&self.inner.name, size);
        debug!("Invalidated {} cache entries", removed);
        removed
    }

    /// 是否存在未过期的条目（不更新统计与使用顺序）
    pub fn contains(&self, key: &str) -> bool {
        let now = now_millis();
        self.state()
            .store
            .peek(key)
            .map(|e| !e.is_expired(now))
            .unwrap_or(false)
    }

    /// 当前条目数
    pub fn len(&self) -> usize {
        self.state().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 条目的命中次数
    pub fn entry_hits(&self, key: &str) -> Option<u64> {
        self.state().store.peek(key).map(|e| e.hits)
    }

    /// 获取统计信息
    pub fn get_stats(&self) -> CacheStats {
        let mut state = self.state();
        state.stats.size = state.store.len();
        state.stats.clone()
    }

    /// 清空缓存并重置统计
    pub fn clear(&self) {
        let mut state = self.state();
        state.store.clear();
        state.expiry.clear();
        state.deps.clear();
        state.stats = CacheStats::default();
        drop(state);
        GLOBAL_METRICS.set_cache_size(&self.inner.name, 0);
        info!("SmartCache {} cleared", self.inner.name);
    }

    /// 立即清理所有已过期条目
    pub fn purge_expired(&self) -> usize {
        self.state().purge_expired(now_millis())
    }

    /// 启动后台过期清理任务
    ///
    /// `cleanup_interval_secs` 为 0 时不启动，返回 None
    pub fn spawn_cleanup(&self) -> Option<JoinHandle<()>> {
        let secs = self.inner.config.cleanup_interval_secs;
        if secs == 0 {
            return None;
        }
        let cache = self.clone();
        Some(tokio::spawn(async move {
            let period = Duration::from_secs(secs);
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!("Cleanup task purged {} expired entries", purged);
                }
            }
        }))
    }

    fn rehydrate_preferences(&self) {
        let Some(storage) = self.inner.storage.as_ref() else {
            return;
        };
        let prefix = &self.inner.config.preference_prefix;

        let keys = match storage.keys_with_prefix(prefix) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to read persisted preferences, continuing in memory: {}", e);
                return;
            }
        };

        let mut restored = 0;
        for storage_key in keys {
            let value: serde_json::Value = match storage.get_json(&storage_key) {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping malformed preference {}: {}", storage_key, e);
                    continue;
                }
            };
            let name = &storage_key[prefix.len()..];
            let cache_key = format!("{}{}", PREFERENCE_KEY_PREFIX, name);
            self.set_value(&cache_key, value, &CacheOptions::default().with_ttl(INFINITE_TTL));
            restored += 1;
        }
        if restored > 0 {
            info!("Restored {} persisted preferences", restored);
        }
    }
}

impl std::fmt::Debug for SmartCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartCache")
            .field("name", &self.inner.name)
            .field("len", &self.len())
            .finish()
    }
}

/// 将任意错误包装为 fetcher 错误，便于调用方在闭包中使用 `map_err`
pub fn fetch_error(e: impl std::fmt::Display) -> CacheError {
    CacheError::Fetch(e.to_string())
}
