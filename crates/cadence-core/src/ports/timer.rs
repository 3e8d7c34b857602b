//! Timers port - タイマーによるコールバックのスケジュール
//!
//! setTimeout / setInterval / clear* に相当します。

use std::fmt;
use std::time::Duration;

use super::Callback;

/// TimerId はホストが発行するタイマーの識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Timers はワンショットと繰り返しのタイマーを提供
pub trait Timers {
    /// `delay` 後に 1 回だけ `callback` を呼ぶ
    fn set_timeout(&self, delay: Duration, callback: Callback) -> TimerId;

    /// `period` ごとに `callback` を呼ぶ（cancel されるまで）
    fn set_interval(&self, period: Duration, callback: Callback) -> TimerId;

    /// タイマーを取り消す。発火済み・未知の ID は無視する
    fn cancel(&self, id: TimerId);
}
