//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步状态快照。

use serde::Serialize;

/// 同步状态
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStatus {
    pub is_online: bool,
    /// 是否有刷新正在进行
    pub is_syncing: bool,
    /// 最近一次刷新完成的时间（毫秒时间戳）
    pub last_sync_time: Option<u64>,
    /// 处于 pending 状态的条目数
    pub pending_changes: usize,
    /// 重试耗尽后被丢弃的条目错误信息
    pub sync_errors: Vec<String>,
}
