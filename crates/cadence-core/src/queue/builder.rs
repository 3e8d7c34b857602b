//! QueueBuilder - TaskQueue の構築
//!
//! # 学習ポイント
//! - Builder パターン（所有権を受け取って返すメソッドチェーン）
//! - 起動時検証（Fail-fast 設計）

use std::time::Duration;

use super::{QueueConfig, TaskQueue};
use crate::ports::Host;

/// QueueBuilder は Host と設定から TaskQueue を構築
///
/// # 使用例
/// ```ignore
/// let queue = TaskQueue::builder(manual.host())
///     .long_stacks(true)
///     .micro_capacity(256)
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - 能力フラグが変更監視ありと言っているのに ObserverFactory が無ければエラー
/// - watchdog の周期が 0 ならエラー（タイマーが空回りする）
/// - micro の容量は検証しない（0 は「compaction しない」を意味する）
pub struct QueueBuilder {
    host: Host,
    config: QueueConfig,
}

/// BuildError は TaskQueue 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("host advertises a change observer but provides no observer factory")]
    MissingObserver,

    #[error("watchdog interval must be greater than zero")]
    ZeroWatchdog,
}

impl QueueBuilder {
    pub fn new(host: Host) -> Self {
        Self {
            host,
            config: QueueConfig::default(),
        }
    }

    /// 設定をまとめて適用（個別の指定は後勝ち）
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn long_stacks(mut self, enabled: bool) -> Self {
        self.config.long_stacks = enabled;
        self
    }

    pub fn micro_capacity(mut self, capacity: usize) -> Self {
        self.config.micro_capacity = capacity;
        self
    }

    pub fn watchdog_interval(mut self, interval: Duration) -> Self {
        self.config.watchdog_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// 検証してから TaskQueue を生成
    pub fn build(self) -> Result<TaskQueue, BuildError> {
        if self.host.features.change_observer && self.host.observer.is_none() {
            return Err(BuildError::MissingObserver);
        }
        if self.config.watchdog_interval_ms == 0 {
            return Err(BuildError::ZeroWatchdog);
        }
        Ok(TaskQueue::from_parts(self.host, self.config))
    }
}
