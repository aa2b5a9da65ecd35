//! 批处理的优雅停止
//!
//! Ctrl+C / SIGTERM 触发取消 token：正在运行的任务在下一次状态转移前以 Cancelled 结束
//! （沙箱照常关闭），批处理不再开始新任务，已写入的结果日志保留以便续跑。

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// 停止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
}

/// 停止信号管理器
#[derive(Clone)]
pub struct ShutdownManager {
    token: CancellationToken,
    /// 第一次停止的原因
    reason: Arc<OnceLock<StopReason>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// 传给 Orchestrator 的取消 token
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn shutdown(&self, reason: StopReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    /// 尚未停止时为 None
    pub fn reason(&self) -> Option<StopReason> {
        self.reason.get().copied()
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("received Ctrl+C, stopping after the current task");
                manager.shutdown(StopReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("received SIGTERM, stopping after the current task");
                    manager.shutdown(StopReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_follows_shutdown() {
        let manager = ShutdownManager::new();
        let token = manager.token();
        assert_eq!(manager.reason(), None);
        assert!(!token.is_cancelled());
        manager.shutdown(StopReason::UserInitiated);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_first_reason_wins() {
        let manager = ShutdownManager::new();
        let clone = manager.clone();
        clone.shutdown(StopReason::Signal);
        manager.shutdown(StopReason::UserInitiated);
        assert_eq!(manager.reason(), Some(StopReason::Signal));
    }
}
