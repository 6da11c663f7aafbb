//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存与同步队列的指标收集和监控功能。

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{span, Level};

/// 指标收集器
///
/// 用于收集和存储缓存与同步队列的各种运行时指标
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// 请求总数统计
    /// key: "component:op:result"
    pub requests_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 缓存条目数
    pub cache_size: Arc<Mutex<HashMap<String, usize>>>,
    /// 同步队列长度
    pub queue_length: Arc<Mutex<HashMap<String, usize>>>,
    /// 操作耗时
    /// key: "component:op" -> (total_duration_secs, count)
    pub operation_duration: Arc<Mutex<HashMap<String, (f64, u64)>>>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Metrics {
    /// 记录请求指标
    ///
    /// # 参数
    ///
    /// * `component` - 组件名称（cache/sync）
    /// * `op` - 操作类型（get/set/flush 等）
    /// * `result` - 操作结果（hit/miss/success/failure 等）
    pub fn record_request(&self, component: &str, op: &str, result: &str) {
        let span = span!(Level::TRACE, "metrics_request", component, op, result);
        let _enter = span.enter();
        let key = format!("{}:{}:{}", component, op, result);
        let mut map = guard(&self.requests_total);
        *map.entry(key).or_insert(0) += 1;
    }

    /// 记录操作耗时
    pub fn record_duration(&self, component: &str, op: &str, duration_secs: f64) {
        let key = format!("{}:{}", component, op);
        let mut map = guard(&self.operation_duration);
        let entry = map.entry(key).or_insert((0.0, 0));
        entry.0 += duration_secs;
        entry.1 += 1;
    }

    /// 设置缓存条目数
    pub fn set_cache_size(&self, cache: &str, size: usize) {
        guard(&self.cache_size).insert(cache.to_string(), size);
    }

    /// 设置同步队列长度
    pub fn set_queue_length(&self, queue: &str, len: usize) {
        guard(&self.queue_length).insert(queue.to_string(), len);
    }

    /// 读取某个请求计数
    pub fn request_count(&self, component: &str, op: &str, result: &str) -> u64 {
        let key = format!("{}:{}:{}", component, op, result);
        guard(&self.requests_total).get(&key).copied().unwrap_or(0)
    }
}

/// 获取指标字符串
///
/// 将所有指标格式化为 Prometheus 文本格式
pub fn get_metrics_string() -> String {
    let metrics = &GLOBAL_METRICS;
    let reqs = guard(&metrics.requests_total);
    let size = guard(&metrics.cache_size);
    let queue = guard(&metrics.queue_length);
    let dur = guard(&metrics.operation_duration);

    let mut output = String::new();
    for (k, v) in reqs.iter() {
        let parts: Vec<&str> = k.splitn(3, ':').collect();
        if parts.len() == 3 {
            output.push_str(&format!(
                "wealthcache_requests_total{{component=\"{}\", operation=\"{}\", result=\"{}\"}} {}\n",
                parts[0], parts[1], parts[2], v
            ));
        }
    }
    for (k, v) in size.iter() {
        output.push_str(&format!("wealthcache_cache_size{{cache=\"{}\"}} {}\n", k, v));
    }
    for (k, v) in queue.iter() {
        output.push_str(&format!(
            "wealthcache_sync_queue_length{{queue=\"{}\"}} {}\n",
            k, v
        ));
    }
    for (k, (total, count)) in dur.iter() {
        let parts: Vec<&str> = k.splitn(2, ':').collect();
        if parts.len() == 2 {
            output.push_str(&format!(
                "wealthcache_operation_duration_seconds_sum{{component=\"{}\", operation=\"{}\"}} {}\n",
                parts[0], parts[1], total
            ));
            output.push_str(&format!(
                "wealthcache_operation_duration_seconds_count{{component=\"{}\", operation=\"{}\"}} {}\n",
                parts[0], parts[1], count
            ));
        }
    }
    output
}
