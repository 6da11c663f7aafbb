//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了内存缓存的底层存储结构：LRU 链表与过期时间堆。

pub mod expiry;
pub mod lru;

pub use expiry::ExpiryQueue;
pub use lru::LruStore;
