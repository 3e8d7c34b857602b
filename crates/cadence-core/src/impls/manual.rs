//! ManualHost - 仮想時間で動く決定的なホスト
//!
//! # 学習ポイント
//! - `Rc::new_cyclic` による自己参照（監視ノードからホストへの Weak 参照）
//! - 借用を解放してからコールバックを呼ぶ（再入可能にするため）
//! - 仮想時計によるタイマーの決定的なテスト
//!
//! # 実行モデル
//! - 監視ノードへの書き込みは microtask として積まれる（ノードごとにまとめる）
//! - `run_microtasks()` は microtask が尽きるまで実行する
//! - immediate はタイマーより先に 1 つずつ実行され、その都度 microtask を処理する
//! - タイマーは期限順（同時刻なら登録順）に発火する

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::{debug, warn};

use super::BacktraceCapture;
use crate::domain::TaskError;
use crate::ports::{
    Callback, ErrorReporter, Features, Host, Immediate, ObservedNode, ObserverFactory, TimerId,
    Timers,
};

/// run_until_idle() が止まらないタイマーで無限ループしないための上限
const MAX_IDLE_STEPS: usize = 10_000;

struct ManualTimer {
    id: TimerId,
    due: Duration,
    seq: u64,
    period: Option<Duration>,
    callback: Callback,
}

/// ManualHost はテストと組み込み用のホスト
///
/// # 使用例
/// ```ignore
/// let manual = ManualHost::new();
/// let queue = TaskQueue::new(manual.host())?;
/// queue.enqueue_macro(|| Ok(()));
/// manual.run_until_idle();
/// ```
pub struct ManualHost {
    features: Features,
    this: Weak<ManualHost>,
    now: Cell<Duration>,
    next_id: Cell<u64>,
    next_seq: Cell<u64>,
    timers: RefCell<Vec<ManualTimer>>,
    microtasks: RefCell<VecDeque<Callback>>,
    immediates: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    reported: RefCell<Vec<TaskError>>,
    suppress_timeouts: Cell<bool>,
    observer_writes: Cell<usize>,
    timers_armed: Cell<usize>,
}

impl ManualHost {
    /// 変更監視プリミティブありのホストを作成
    pub fn new() -> Rc<Self> {
        Self::with_features(Features {
            change_observer: true,
        })
    }

    pub fn with_features(features: Features) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            features,
            this: this.clone(),
            now: Cell::new(Duration::ZERO),
            next_id: Cell::new(1),
            next_seq: Cell::new(0),
            timers: RefCell::new(Vec::new()),
            microtasks: RefCell::new(VecDeque::new()),
            immediates: RefCell::new(VecDeque::new()),
            reported: RefCell::new(Vec::new()),
            suppress_timeouts: Cell::new(false),
            observer_writes: Cell::new(0),
            timers_armed: Cell::new(0),
        })
    }

    /// このホストの能力をまとめた Host を作成
    ///
    /// 変更監視は `features.change_observer` が true のときだけ提供する。
    pub fn host(self: &Rc<Self>) -> Host {
        let observer: Option<Rc<dyn ObserverFactory>> = if self.features.change_observer {
            Some(Rc::clone(self) as Rc<dyn ObserverFactory>)
        } else {
            None
        };
        Host {
            features: self.features,
            observer,
            timers: Rc::clone(self) as Rc<dyn Timers>,
            immediate: Some(Rc::clone(self) as Rc<dyn Immediate>),
            reporter: Rc::clone(self) as Rc<dyn ErrorReporter>,
            stacks: Rc::new(BacktraceCapture),
        }
    }

    /// 仮想時計の現在時刻
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// ワンショットタイマーを抑止する（バックグラウンドでの間引きを再現）
    ///
    /// 抑止中のタイマーは破棄されず、解除後に発火できる。
    pub fn suppress_timeouts(&self, suppress: bool) {
        self.suppress_timeouts.set(suppress);
    }

    pub fn observer_writes(&self) -> usize {
        self.observer_writes.get()
    }

    pub fn timers_armed(&self) -> usize {
        self.timers_armed.get()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    pub fn pending_microtasks(&self) -> usize {
        self.microtasks.borrow().len()
    }

    /// 報告された未処理エラーを取り出す
    pub fn take_reported(&self) -> Vec<TaskError> {
        std::mem::take(&mut *self.reported.borrow_mut())
    }

    pub fn reported_count(&self) -> usize {
        self.reported.borrow().len()
    }

    /// microtask が尽きるまで実行し、実行した数を返す
    pub fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.microtasks.borrow_mut().pop_front();
            let Some(callback) = next else {
                return ran;
            };
            callback();
            ran += 1;
        }
    }

    /// `by` だけ時計を進め、その間に期限が来たものを全て実行する
    pub fn advance(&self, by: Duration) {
        let target = self.now.get() + by;
        loop {
            self.run_microtasks();
            if self.run_one_immediate() {
                continue;
            }
            if !self.fire_next_due(target) {
                break;
            }
        }
        self.now.set(target);
    }

    /// 実行できるものが無くなるまでホストを回す
    ///
    /// タイマーは期限まで時計を進めて発火する。実行したコールバック数を返す。
    pub fn run_until_idle(&self) -> usize {
        let mut steps = 0;
        while steps < MAX_IDLE_STEPS {
            steps += self.run_microtasks();
            if self.run_one_immediate() || self.fire_next_due(Duration::MAX) {
                steps += 1;
                continue;
            }
            return steps;
        }
        warn!(steps, "manual host still busy after step limit");
        steps
    }

    fn run_one_immediate(&self) -> bool {
        let next = self.immediates.borrow_mut().pop_front();
        match next {
            Some(callback) => {
                callback();
                self.run_microtasks();
                true
            }
            None => false,
        }
    }

    /// `limit` までに期限が来る最も早いタイマーを 1 つ発火する
    fn fire_next_due(&self, limit: Duration) -> bool {
        let callback = {
            let mut timers = self.timers.borrow_mut();
            let suppress = self.suppress_timeouts.get();
            let next = timers
                .iter()
                .enumerate()
                .filter(|(_, t)| t.due <= limit && !(suppress && t.period.is_none()))
                .min_by_key(|(_, t)| (t.due, t.seq))
                .map(|(index, _)| index);
            let Some(index) = next else {
                return false;
            };

            let due = timers[index].due;
            if due > self.now.get() {
                self.now.set(due);
            }
            match timers[index].period {
                Some(period) => {
                    let seq = self.bump_seq();
                    let timer = &mut timers[index];
                    timer.due = due + period.max(Duration::from_millis(1));
                    timer.seq = seq;
                    Rc::clone(&timer.callback)
                }
                None => timers.remove(index).callback,
            }
        };
        callback();
        self.run_microtasks();
        true
    }

    fn bump_seq(&self) -> u64 {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        seq
    }

    fn arm(&self, delay: Duration, period: Option<Duration>, callback: Callback) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.timers_armed.set(self.timers_armed.get() + 1);
        let seq = self.bump_seq();
        self.timers.borrow_mut().push(ManualTimer {
            id,
            due: self.now.get() + delay,
            seq,
            period,
            callback,
        });
        id
    }

    fn queue_microtask(&self, callback: Callback) {
        self.microtasks.borrow_mut().push_back(callback);
    }
}

impl Timers for ManualHost {
    fn set_timeout(&self, delay: Duration, callback: Callback) -> TimerId {
        self.arm(delay, None, callback)
    }

    fn set_interval(&self, period: Duration, callback: Callback) -> TimerId {
        self.arm(period, Some(period), callback)
    }

    fn cancel(&self, id: TimerId) {
        self.timers.borrow_mut().retain(|timer| timer.id != id);
    }
}

impl Immediate for ManualHost {
    fn set_immediate(&self, callback: Box<dyn FnOnce()>) {
        self.immediates.borrow_mut().push_back(callback);
    }
}

impl ErrorReporter for ManualHost {
    fn report(&self, error: TaskError) {
        debug!(%error, "unhandled task error reported to manual host");
        self.reported.borrow_mut().push(error);
    }
}

impl ObserverFactory for ManualHost {
    fn observe(&self, callback: Callback) -> Box<dyn ObservedNode> {
        Box::new(ManualNode {
            host: self.this.clone(),
            callback,
            value: Cell::new(0),
            queued: Rc::new(Cell::new(false)),
        })
    }
}

/// 監視ノード。値が変わると microtask を 1 つ積む
struct ManualNode {
    host: Weak<ManualHost>,
    callback: Callback,
    value: Cell<i32>,
    queued: Rc<Cell<bool>>,
}

impl ObservedNode for ManualNode {
    fn write(&self, value: i32) {
        let Some(host) = self.host.upgrade() else {
            return;
        };
        host.observer_writes.set(host.observer_writes.get() + 1);
        if self.value.replace(value) == value || self.queued.replace(true) {
            return;
        }
        let queued = Rc::clone(&self.queued);
        let callback = Rc::clone(&self.callback);
        host.queue_microtask(Rc::new(move || {
            queued.set(false);
            callback();
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Callback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let make = move |name: &'static str| -> Callback {
            let sink = Rc::clone(&sink);
            Rc::new(move || sink.borrow_mut().push(name))
        };
        (log, make)
    }

    #[test]
    fn timers_fire_in_due_then_registration_order() {
        let manual = ManualHost::new();
        let (log, make) = recorder();
        manual.set_timeout(Duration::from_millis(10), make("late"));
        manual.set_timeout(Duration::ZERO, make("first"));
        manual.set_timeout(Duration::ZERO, make("second"));

        manual.run_until_idle();
        assert_eq!(*log.borrow(), vec!["first", "second", "late"]);
        assert_eq!(manual.now(), Duration::from_millis(10));
    }

    #[test]
    fn cancel_prevents_firing() {
        let manual = ManualHost::new();
        let (log, make) = recorder();
        let id = manual.set_timeout(Duration::ZERO, make("never"));
        manual.cancel(id);

        manual.run_until_idle();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn interval_repeats_until_cancelled() {
        let manual = ManualHost::new();
        let (log, make) = recorder();
        let id = manual.set_interval(Duration::from_millis(5), make("tick"));

        manual.advance(Duration::from_millis(16));
        assert_eq!(log.borrow().len(), 3);

        manual.cancel(id);
        manual.advance(Duration::from_millis(100));
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn observer_writes_coalesce_into_one_microtask() {
        let manual = ManualHost::new();
        let (log, make) = recorder();
        let node = manual.observe(make("observed"));

        node.write(-1);
        node.write(1);
        assert_eq!(manual.pending_microtasks(), 1);
        manual.run_microtasks();
        assert_eq!(*log.borrow(), vec!["observed"]);
        assert_eq!(manual.observer_writes(), 2);
    }

    #[test]
    fn writing_same_value_does_not_notify() {
        let manual = ManualHost::new();
        let (log, make) = recorder();
        let node = manual.observe(make("observed"));

        node.write(0);
        manual.run_microtasks();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn microtasks_run_before_immediates_and_timers() {
        let manual = ManualHost::new();
        let (log, make) = recorder();
        manual.set_timeout(Duration::ZERO, make("timer"));
        let immediate = make("immediate");
        manual.set_immediate(Box::new(move || immediate()));
        let node = manual.observe(make("micro"));
        node.write(-1);

        manual.run_until_idle();
        assert_eq!(*log.borrow(), vec!["micro", "immediate", "timer"]);
    }

    #[test]
    fn suppressed_timeouts_stay_pending() {
        let manual = ManualHost::new();
        let (log, make) = recorder();
        manual.suppress_timeouts(true);
        manual.set_timeout(Duration::ZERO, make("held"));

        manual.run_until_idle();
        assert!(log.borrow().is_empty());
        assert_eq!(manual.pending_timers(), 1);

        manual.suppress_timeouts(false);
        manual.run_until_idle();
        assert_eq!(*log.borrow(), vec!["held"]);
    }

    #[test]
    fn host_without_observer_feature_omits_factory() {
        let manual = ManualHost::with_features(Features::default());
        let host = manual.host();
        assert!(host.observer.is_none());
        assert!(!host.features.change_observer);
    }
}
