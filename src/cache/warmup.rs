//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了按优先级预热缓存的功能。

use super::helpers::BoxedFetcher;
use super::{CacheOptions, SmartCache};
use crate::error::Result;
use futures::stream::{self, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, instrument, warn};

/// 同时进行的预热加载数上限
pub const WARMUP_CONCURRENCY: usize = 3;

/// 预测会被访问的键
pub struct WarmupPrediction<T> {
    pub key: String,
    pub fetcher: BoxedFetcher<T>,
    /// 数值越大越先加载
    pub priority: i32,
}

impl<T> WarmupPrediction<T> {
    pub fn new<F, Fut>(key: impl Into<String>, priority: i32, fetcher: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            key: key.into(),
            fetcher: Box::new(move || Box::pin(fetcher())),
            priority,
        }
    }
}

/// 预热结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarmupResult {
    pub loaded: usize,
    pub failed: usize,
    /// 已在缓存中而跳过的键
    pub skipped: usize,
    pub success: bool,
}

impl SmartCache {
    /// 预热缓存
    ///
    /// 按优先级从高到低加载，最多 3 个加载同时进行。
    /// 单个加载失败只计数，不影响其余键。
    #[instrument(skip(self, predictions), level = "debug", fields(cache = %self.name(), count = predictions.len()))]
    pub async fn warm_up<T>(&self, mut predictions: Vec<WarmupPrediction<T>>) -> WarmupResult
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        info!("Starting cache warmup: {} predictions", predictions.len());
        predictions.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut skipped = 0usize;
        let mut pending = Vec::with_capacity(predictions.len());
        for prediction in predictions {
            if self.contains(&prediction.key) {
                debug!("Warmup skipped, key already cached: {}", prediction.key);
                skipped = skipped.saturating_add(1);
            } else {
                pending.push(prediction);
            }
        }

        let outcomes: Vec<bool> = stream::iter(pending)
            .map(|prediction| {
                let cache = self.clone();
                async move {
                    let key = prediction.key;
                    match (prediction.fetcher)().await {
                        Ok(value) => match cache.set(&key, &value, CacheOptions::default()) {
                            Ok(()) => true,
                            Err(e) => {
                                warn!("Warmup could not store {}: {}", key, e);
                                false
                            }
                        },
                        Err(e) => {
                            warn!("Warmup fetch failed for {}: {}", key, e);
                            false
                        }
                    }
                }
            })
            .buffered(WARMUP_CONCURRENCY)
            .collect()
            .await;

        let loaded = outcomes.iter().filter(|ok| **ok).count();
        let failed = outcomes.len() - loaded;
        let result = WarmupResult {
            loaded,
            failed,
            skipped,
            success: failed == 0,
        };
        info!(
            "Cache warmup completed: loaded={}, failed={}, skipped={}",
            result.loaded, result.failed, result.skipped
        );
        result
    }
}
