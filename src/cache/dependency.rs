//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了依赖索引：依赖键 -> 声明了该依赖的缓存键集合。

use ahash::{AHashMap, AHashSet};

/// 依赖索引
///
/// 被淘汰或失效的键会从所有集合中移除；空集合允许残留，
/// 查询只做成员判断。
#[derive(Debug, Default)]
pub struct DependencyIndex {
    map: AHashMap<String, AHashSet<String>>,
}

impl DependencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 将 `key` 登记为 `dependency` 的依赖者（只增不减）
    pub fn register(&mut self, dependency: &str, key: &str) {
        self.map
            .entry(dependency.to_string())
            .or_default()
            .insert(key.to_string());
    }

    /// 获取依赖于 `dependency` 的所有键
    pub fn dependents(&self, dependency: &str) -> Vec<String> {
        self.map
            .get(dependency)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 取出并删除依赖于 `dependency` 的所有键
    pub fn take_dependents(&mut self, dependency: &str) -> Vec<String> {
        self.map
            .remove(dependency)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default()
    }

    /// 从所有依赖集合中移除 `key`
    pub fn purge(&mut self, key: &str) {
        for set in self.map.values_mut() {
            set.remove(key);
        }
    }

    /// 所有依赖键
    pub fn dependency_keys(&self) -> impl Iterator<Item = &String> {
        self.map.keys()
    }

    pub fn is_registered(&self, dependency: &str, key: &str) -> bool {
        self.map
            .get(dependency)
            .map(|set| set.contains(key))
            .unwrap_or(false)
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}
