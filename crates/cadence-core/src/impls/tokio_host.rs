//! TokioHost - tokio の LocalSet 上で動くホスト
//!
//! # 学習ポイント
//! - `spawn_local` による `!Send` なコールバックの実行
//! - `JoinHandle::abort` によるタイマーの取り消し
//! - `interval_at` で最初の即時 tick を避ける
//!
//! # 前提
//! すべての操作は `LocalSet` の内側で呼ぶこと（`spawn_local` の制約）。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::{JoinHandle, spawn_local};
use tokio::time::{Instant, interval_at, sleep};
use tracing::error;

use super::BacktraceCapture;
use crate::domain::TaskError;
use crate::ports::{
    Callback, ErrorReporter, Features, Host, Immediate, ObservedNode, ObserverFactory, TimerId,
    Timers,
};

/// TokioHost は tokio のタイマーとタスクでホスト能力を提供
///
/// # 使用例
/// ```ignore
/// let local = tokio::task::LocalSet::new();
/// local.run_until(async {
///     let host = TokioHost::new();
///     let queue = TaskQueue::new(host.host())?;
///     queue.enqueue_macro(|| Ok(()));
/// }).await;
/// ```
pub struct TokioHost {
    next_id: Cell<u64>,
    handles: Rc<RefCell<HashMap<TimerId, JoinHandle<()>>>>,
}

impl TokioHost {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            next_id: Cell::new(1),
            handles: Rc::new(RefCell::new(HashMap::new())),
        })
    }

    pub fn host(self: &Rc<Self>) -> Host {
        Host {
            features: Features {
                change_observer: true,
            },
            observer: Some(Rc::clone(self) as Rc<dyn ObserverFactory>),
            timers: Rc::clone(self) as Rc<dyn Timers>,
            immediate: Some(Rc::clone(self) as Rc<dyn Immediate>),
            reporter: Rc::new(TracingReporter),
            stacks: Rc::new(BacktraceCapture),
        }
    }

    /// 未発火・未取り消しのタイマー数
    pub fn pending_timers(&self) -> usize {
        self.handles.borrow().len()
    }

    fn allocate_id(&self) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        id
    }
}

impl Timers for TokioHost {
    fn set_timeout(&self, delay: Duration, callback: Callback) -> TimerId {
        let id = self.allocate_id();
        let handles = Rc::clone(&self.handles);
        let handle = spawn_local(async move {
            sleep(delay).await;
            handles.borrow_mut().remove(&id);
            callback();
        });
        self.handles.borrow_mut().insert(id, handle);
        id
    }

    fn set_interval(&self, period: Duration, callback: Callback) -> TimerId {
        let id = self.allocate_id();
        let handle = spawn_local(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                callback();
            }
        });
        self.handles.borrow_mut().insert(id, handle);
        id
    }

    fn cancel(&self, id: TimerId) {
        let handle = self.handles.borrow_mut().remove(&id);
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Immediate for TokioHost {
    fn set_immediate(&self, callback: Box<dyn FnOnce()>) {
        spawn_local(async move { callback() });
    }
}

impl ObserverFactory for TokioHost {
    fn observe(&self, callback: Callback) -> Box<dyn ObservedNode> {
        Box::new(TokioNode {
            callback,
            value: Cell::new(0),
            queued: Rc::new(Cell::new(false)),
        })
    }
}

/// 監視ノード。値が変わるとローカルタスクを 1 つ spawn する
struct TokioNode {
    callback: Callback,
    value: Cell<i32>,
    queued: Rc<Cell<bool>>,
}

impl ObservedNode for TokioNode {
    fn write(&self, value: i32) {
        if self.value.replace(value) == value || self.queued.replace(true) {
            return;
        }
        let queued = Rc::clone(&self.queued);
        let callback = Rc::clone(&self.callback);
        spawn_local(async move {
            queued.set(false);
            callback();
        });
    }
}

/// TracingReporter は未処理エラーを tracing の error レベルで記録する
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: TaskError) {
        match error.stack() {
            Some(stack) if !stack.is_empty() => error!(%error, %stack, "unhandled task error"),
            _ => error!(%error, "unhandled task error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::LocalSet;

    fn counter() -> (Rc<Cell<usize>>, Callback) {
        let count = Rc::new(Cell::new(0));
        let sink = Rc::clone(&count);
        (count, Rc::new(move || sink.set(sink.get() + 1)))
    }

    #[tokio::test]
    async fn timeout_fires_and_forgets_handle() {
        LocalSet::new()
            .run_until(async {
                let host = TokioHost::new();
                let (count, callback) = counter();
                host.set_timeout(Duration::from_millis(1), callback);
                assert_eq!(host.pending_timers(), 1);

                sleep(Duration::from_millis(20)).await;
                assert_eq!(count.get(), 1);
                assert_eq!(host.pending_timers(), 0);
            })
            .await;
    }

    #[tokio::test]
    async fn cancelled_interval_stops_ticking() {
        LocalSet::new()
            .run_until(async {
                let host = TokioHost::new();
                let (count, callback) = counter();
                let id = host.set_interval(Duration::from_millis(2), callback);

                sleep(Duration::from_millis(15)).await;
                host.cancel(id);
                let seen = count.get();
                assert!(seen >= 1);

                sleep(Duration::from_millis(15)).await;
                assert_eq!(count.get(), seen);
            })
            .await;
    }

    #[tokio::test]
    async fn observer_node_notifies_once_per_change_batch() {
        LocalSet::new()
            .run_until(async {
                let host = TokioHost::new();
                let (count, callback) = counter();
                let node = host.observe(callback);

                node.write(-1);
                node.write(1);
                tokio::task::yield_now().await;
                sleep(Duration::from_millis(1)).await;
                assert_eq!(count.get(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn immediate_runs_on_next_turn() {
        LocalSet::new()
            .run_until(async {
                let host = TokioHost::new();
                let ran = Rc::new(Cell::new(false));
                let flag = Rc::clone(&ran);
                host.set_immediate(Box::new(move || flag.set(true)));
                assert!(!ran.get());

                sleep(Duration::from_millis(1)).await;
                assert!(ran.get());
            })
            .await;
    }
}
