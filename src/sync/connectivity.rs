//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了在线/离线状态信号。

use tokio::sync::watch;
use tracing::info;

/// 连接状态监视器
///
/// 克隆后共享同一个信号，订阅者只会看到最新状态
#[derive(Clone, Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    /// 更新连接状态，状态未变化时不通知订阅者
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!("Connectivity changed: online={}", online);
        }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
