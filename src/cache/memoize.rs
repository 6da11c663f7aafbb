//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了函数记忆化包装器：按参数缓存结果，独立于主缓存。

use crate::error::Result;
use crate::utils::{duration_millis, now_millis};
use ahash::AHashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

type KeyGenerator<A> = Arc<dyn Fn(&A) -> Result<String> + Send + Sync>;

/// 记忆化选项
pub struct MemoizeOptions<A> {
    /// 由参数生成缓存键，缺省时使用参数的 JSON 序列化
    pub key_generator: Option<KeyGenerator<A>>,
    pub ttl: Duration,
    /// 最多保留的参数组合数，超出时淘汰最早写入的
    pub max_args: usize,
}

impl<A> Default for MemoizeOptions<A> {
    fn default() -> Self {
        Self {
            key_generator: None,
            ttl: Duration::from_secs(5 * 60),
            max_args: 100,
        }
    }
}

impl<A> MemoizeOptions<A> {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_args(mut self, max_args: usize) -> Self {
        self.max_args = max_args.max(1);
        self
    }

    pub fn with_key_generator<G>(mut self, generator: G) -> Self
    where
        G: Fn(&A) -> Result<String> + Send + Sync + 'static,
    {
        self.key_generator = Some(Arc::new(generator));
        self
    }
}

struct MemoState<R> {
    values: AHashMap<String, (R, u64)>,
    order: VecDeque<String>,
}

/// 记忆化后的函数
pub struct Memoized<A, R, F> {
    func: F,
    options: MemoizeOptions<A>,
    state: Mutex<MemoState<R>>,
}

/// 包装函数，返回按参数缓存结果的 [`Memoized`]
pub fn memoize<A, R, F>(func: F, options: MemoizeOptions<A>) -> Memoized<A, R, F>
where
    A: Serialize,
    R: Clone,
    F: Fn(&A) -> R,
{
    Memoized {
        func,
        options,
        state: Mutex::new(MemoState {
            values: AHashMap::new(),
            order: VecDeque::new(),
        }),
    }
}

impl<A, R, F> Memoized<A, R, F>
where
    A: Serialize,
    R: Clone,
    F: Fn(&A) -> R,
{
    fn key_for(&self, args: &A) -> Result<String> {
        match &self.options.key_generator {
            Some(generator) => generator(args),
            None => Ok(serde_json::to_string(args)?),
        }
    }

    /// 调用函数，命中且未过期时直接返回缓存结果
    ///
    /// 只有生成缓存键失败时返回错误
    pub fn call(&self, args: &A) -> Result<R> {
        let key = self.key_for(args)?;
        let now = now_millis();

        {
            let state = self
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some((value, expires_at)) = state.values.get(&key) {
                if *expires_at > now {
                    return Ok(value.clone());
                }
            }
        }

        let value = (self.func)(args);
        let expires_at = now.saturating_add(duration_millis(self.options.ttl));

        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if state
            .values
            .insert(key.clone(), (value.clone(), expires_at))
            .is_none()
        {
            state.order.push_back(key);
        }
        while state.values.len() > self.options.max_args {
            match state.order.pop_front() {
                Some(oldest) => {
                    state.values.remove(&oldest);
                    debug!("Memoized result evicted: {}", oldest);
                }
                None => break,
            }
        }
        Ok(value)
    }

    /// 当前缓存的参数组合数
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.values.clear();
        state.order.clear();
    }
}
