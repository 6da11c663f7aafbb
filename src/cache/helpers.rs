//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了建立在 `get` / `set` 之上的便捷方法：偏好设置、
//! 页面筛选条件、计算结果缓存以及批量读取。

use super::{CacheOptions, SmartCache, INFINITE_TTL, PREFERENCE_KEY_PREFIX};
use crate::error::Result;
use crate::serialization::Serializer;
use crate::storage::StorageExt;
use futures::future::{join_all, BoxFuture};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// 计算结果的默认缓存时间
pub const CALCULATION_TTL: Duration = Duration::from_secs(5 * 60);

/// 页面筛选条件的缓存时间
pub const FILTER_TTL: Duration = Duration::from_secs(60 * 60);

/// 每个页面保留的最近筛选条件数量
pub const RECENT_FILTERS_LIMIT: usize = 10;

/// 装箱的异步加载函数
pub type BoxedFetcher<T> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T>> + Send>;

/// 批量读取中的单个请求
pub struct BatchRequest<T> {
    pub key: String,
    pub fetcher: BoxedFetcher<T>,
    pub options: CacheOptions,
}

impl<T> BatchRequest<T> {
    pub fn new<F, Fut>(key: impl Into<String>, fetcher: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            key: key.into(),
            fetcher: Box::new(move || Box::pin(fetcher())),
            options: CacheOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }
}

fn options_for_preference() -> CacheOptions {
    CacheOptions::default().with_ttl(INFINITE_TTL)
}

fn filter_key(page: &str) -> String {
    format!("filters:{}", page)
}

fn recent_filters_key(page: &str) -> String {
    format!("filters:{}:recent", page)
}

/// 计算结果的缓存键：类型 + 参数的 JSON 序列化
pub fn calculation_key<P: Serialize + ?Sized>(calc_type: &str, params: &P) -> Result<String> {
    let params = serde_json::to_string(params)?;
    Ok(format!("calc:{}:{}", calc_type, params))
}

impl SmartCache {
    /// 保存偏好设置
    ///
    /// 偏好永不过期；开启持久化时同步写入本地存储，
    /// 写入失败只记录警告。
    #[instrument(skip(self, value), level = "debug", fields(cache = %self.name()))]
    pub fn cache_preference<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let cache_key = format!("{}{}", PREFERENCE_KEY_PREFIX, key);
        self.set(&cache_key, value, options_for_preference())?;

        if self.config().persist_to_storage {
            if let Some(storage) = self.storage() {
                let storage_key = format!("{}{}", self.config().preference_prefix, key);
                if let Err(e) = storage.set_json(&storage_key, value) {
                    warn!("Failed to persist preference {}: {}", key, e);
                }
            }
        }
        Ok(())
    }

    /// 读取偏好设置
    ///
    /// 内存中没有时（例如被容量淘汰）回退到本地存储并重新放入缓存
    #[instrument(skip(self), level = "debug", fields(cache = %self.name()))]
    pub async fn get_preference<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let cache_key = format!("{}{}", PREFERENCE_KEY_PREFIX, key);
        if let Some(value) = self.get_with(&cache_key, options_for_preference()).await? {
            return Ok(Some(value));
        }

        let Some(storage) = self.storage() else {
            return Ok(None);
        };
        if !self.config().persist_to_storage {
            return Ok(None);
        }
        let storage_key = format!("{}{}", self.config().preference_prefix, key);
        match storage.get_json::<serde_json::Value>(&storage_key)? {
            Some(value) => {
                debug!("Preference {} restored from storage", key);
                self.set_value(&cache_key, value.clone(), &options_for_preference());
                Ok(Some(self.serializer().from_value(value)?))
            }
            None => Ok(None),
        }
    }

    /// 保存页面的筛选条件，并记录到该页面的最近筛选列表
    ///
    /// 最近列表去重（相同条件移到最前），最多保留 10 条
    #[instrument(skip(self, filters), level = "debug", fields(cache = %self.name()))]
    pub fn cache_filters<T: Serialize + ?Sized>(&self, page: &str, filters: &T) -> Result<()> {
        let value = self.serializer().to_value(filters)?;
        let options = CacheOptions::default().with_ttl(FILTER_TTL);
        self.set_value(&filter_key(page), value.clone(), &options);

        let mut recent = self.recent_filters_raw(page);
        recent.retain(|existing| existing != &value);
        recent.insert(0, value);
        recent.truncate(RECENT_FILTERS_LIMIT);
        self.set_value(
            &recent_filters_key(page),
            serde_json::Value::Array(recent),
            &options,
        );
        Ok(())
    }

    /// 读取页面当前的筛选条件
    pub async fn get_cached_filters<T: DeserializeOwned>(&self, page: &str) -> Result<Option<T>> {
        let options = CacheOptions::default().with_ttl(FILTER_TTL);
        self.get_with(&filter_key(page), options).await
    }

    /// 读取页面最近使用的筛选条件，最新的在前
    pub async fn get_recent_filters<T: DeserializeOwned>(&self, page: &str) -> Result<Vec<T>> {
        let options = CacheOptions::default().with_ttl(FILTER_TTL);
        Ok(self
            .get_with::<Vec<T>>(&recent_filters_key(page), options)
            .await?
            .unwrap_or_default())
    }

    fn recent_filters_raw(&self, page: &str) -> Vec<serde_json::Value> {
        match self.peek_value(&recent_filters_key(page)) {
            Some(serde_json::Value::Array(items)) => items,
            _ => Vec::new(),
        }
    }

    /// 缓存计算结果，5 分钟过期，可附带依赖标签
    #[instrument(skip(self, params, result, dependencies), level = "debug", fields(cache = %self.name()))]
    pub fn cache_calculation<P, T>(
        &self,
        calc_type: &str,
        params: &P,
        result: &T,
        dependencies: &[String],
    ) -> Result<()>
    where
        P: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        let key = calculation_key(calc_type, params)?;
        let options = CacheOptions::default()
            .with_ttl(CALCULATION_TTL)
            .with_dependencies(dependencies.iter().cloned());
        self.set(&key, result, options)
    }

    /// 读取计算结果
    pub async fn get_cached_calculation<P, T>(&self, calc_type: &str, params: &P) -> Result<Option<T>>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let key = calculation_key(calc_type, params)?;
        let options = CacheOptions::default().with_ttl(CALCULATION_TTL);
        self.get_with(&key, options).await
    }

    /// 并发执行多个读取，结果顺序与请求顺序一致
    #[instrument(skip(self, requests), level = "debug", fields(cache = %self.name(), count = requests.len()))]
    pub async fn batch<T>(&self, requests: Vec<BatchRequest<T>>) -> Vec<Result<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let futures = requests.into_iter().map(|request| {
            let cache = self.clone();
            async move {
                cache
                    .get_or_fetch(&request.key, request.fetcher, request.options)
                    .await
            }
        });
        join_all(futures).await
    }
}
