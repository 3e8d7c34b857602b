//! Queue module: the two-tier task queue, its drain engine and flush strategies.

mod builder;
mod config;
mod drain;
mod flush;
mod record;
mod sequence;
mod stacks;

pub use builder::{BuildError, QueueBuilder};
pub use config::{ConfigError, DEFAULT_MICRO_CAPACITY, DEFAULT_WATCHDOG_INTERVAL_MS, QueueConfig};
pub use flush::FlushStrategy;
pub(crate) use flush::RequestFlush;
pub(crate) use record::TaskRecord;
pub(crate) use sequence::Sequence;
pub use stacks::{filter_flush_stack, filter_queue_stack};

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::domain::{Task, Tier};
use crate::observability::{QueueCounters, QueueStats};
use crate::ports::{Callback, Host};

/// Cooperative two-tier task queue.
///
/// Cloning is cheap and yields another handle to the same queue, which is how
/// tasks get hold of the queue to enqueue follow-up work.
///
/// Design intent:
/// - Enqueue never runs anything; it appends and, for the first pending task
///   of a tier, asks the host for a flush.
/// - The host (or `flush_*`) drains a tier synchronously, in FIFO order.
/// - Everything is single-threaded: no locks, nothing is `Send`.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Rc<Inner>,
}

pub(crate) struct Inner {
    host: Host,
    micro: RefCell<Sequence>,
    macro_: RefCell<Sequence>,
    micro_capacity: Cell<usize>,
    long_stacks: Cell<bool>,

    /// Nesting depth of active drains (any tier).
    flush_depth: Cell<usize>,
    micro_draining: Cell<bool>,
    macro_draining: Cell<bool>,

    /// Causal stack of the task currently being run by a drain.
    flush_stack: RefCell<Option<Rc<str>>>,

    request_micro: Box<dyn RequestFlush>,
    request_macro: Box<dyn RequestFlush>,
    counters: Cell<QueueCounters>,
}

impl TaskQueue {
    pub fn builder(host: Host) -> QueueBuilder {
        QueueBuilder::new(host)
    }

    /// Build a queue with the default configuration.
    pub fn new(host: Host) -> Result<Self, BuildError> {
        QueueBuilder::new(host).build()
    }

    pub(crate) fn from_parts(host: Host, config: QueueConfig) -> Self {
        let watchdog = config.watchdog_interval();
        let inner = Rc::new_cyclic(|weak: &Weak<Inner>| Inner {
            request_micro: flush::select_micro(&host, flush_callback(weak, Tier::Micro), watchdog),
            request_macro: flush::select_macro(&host, flush_callback(weak, Tier::Macro), watchdog),
            host,
            micro: RefCell::new(Sequence::new()),
            macro_: RefCell::new(Sequence::new()),
            micro_capacity: Cell::new(config.micro_capacity),
            long_stacks: Cell::new(config.long_stacks),
            flush_depth: Cell::new(0),
            micro_draining: Cell::new(false),
            macro_draining: Cell::new(false),
            flush_stack: RefCell::new(None),
            counters: Cell::new(QueueCounters::default()),
        });
        Self { inner }
    }

    /// Queue a task to run before the host's next ordinary turn.
    pub fn enqueue_micro<T: Task + 'static>(&self, task: T) {
        self.inner.enqueue(Tier::Micro, Box::new(task));
    }

    /// Queue a task to run on an ordinary host turn.
    pub fn enqueue_macro<T: Task + 'static>(&self, task: T) {
        self.inner.enqueue(Tier::Macro, Box::new(task));
    }

    /// Drain the micro tier now. A no-op if it is empty or already draining.
    pub fn flush_micro(&self) {
        self.inner.drain(Tier::Micro);
    }

    /// Drain the macro tier now. A no-op if it is empty or already draining.
    pub fn flush_macro(&self) {
        self.inner.drain(Tier::Macro);
    }

    pub fn long_stacks(&self) -> bool {
        self.inner.long_stacks.get()
    }

    /// Takes effect on the next enqueue; queued tasks keep what they had.
    pub fn set_long_stacks(&self, enabled: bool) {
        self.inner.long_stacks.set(enabled);
    }

    pub fn micro_capacity(&self) -> usize {
        self.inner.micro_capacity.get()
    }

    /// Consulted by the next micro drain; 0 disables compaction.
    pub fn set_micro_capacity(&self, capacity: usize) {
        self.inner.micro_capacity.set(capacity);
    }

    /// True while any drain of this queue is running.
    pub fn is_flushing(&self) -> bool {
        self.inner.flush_depth.get() > 0
    }

    pub fn pending(&self, tier: Tier) -> usize {
        self.inner.sequence(tier).borrow().pending()
    }

    pub fn is_empty(&self, tier: Tier) -> bool {
        self.inner.sequence(tier).borrow().is_empty()
    }

    pub fn micro_strategy(&self) -> FlushStrategy {
        self.inner.request_micro.strategy()
    }

    /// Causal stacks of the pending tasks of `tier`, in queue order.
    pub fn causal_stacks(&self, tier: Tier) -> Vec<Option<String>> {
        self.inner.sequence(tier).borrow().stacks()
    }

    pub fn stats(&self) -> QueueStats {
        let inner = &self.inner;
        let micro = inner.micro.borrow();
        let macro_ = inner.macro_.borrow();
        QueueStats {
            micro_pending: micro.pending(),
            micro_storage: micro.len(),
            macro_pending: macro_.pending(),
            macro_storage: macro_.len(),
            flushing: self.is_flushing(),
            long_stacks: self.long_stacks(),
            micro_capacity: self.micro_capacity(),
            micro_strategy: self.micro_strategy(),
            counters: inner.counters.get(),
        }
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Host-facing flush callback. Holds the queue weakly so a dropped queue
/// turns pending host callbacks into no-ops.
fn flush_callback(weak: &Weak<Inner>, tier: Tier) -> Callback {
    let weak = weak.clone();
    Rc::new(move || {
        if let Some(inner) = weak.upgrade() {
            let queue = TaskQueue { inner };
            match tier {
                Tier::Micro => queue.flush_micro(),
                Tier::Macro => queue.flush_macro(),
            }
        }
    })
}

impl Inner {
    fn sequence(&self, tier: Tier) -> &RefCell<Sequence> {
        match tier {
            Tier::Micro => &self.micro,
            Tier::Macro => &self.macro_,
        }
    }

    fn draining(&self, tier: Tier) -> &Cell<bool> {
        match tier {
            Tier::Micro => &self.micro_draining,
            Tier::Macro => &self.macro_draining,
        }
    }

    fn requester(&self, tier: Tier) -> &dyn RequestFlush {
        match tier {
            Tier::Micro => self.request_micro.as_ref(),
            Tier::Macro => self.request_macro.as_ref(),
        }
    }

    fn count(&self, update: impl FnOnce(&mut QueueCounters)) {
        let mut counters = self.counters.get();
        update(&mut counters);
        self.counters.set(counters);
    }

    fn enqueue(&self, tier: Tier, task: Box<dyn Task>) {
        let stack = self.long_stacks.get().then(|| self.prepare_queue_stack(tier));

        let was_empty = {
            let mut sequence = self.sequence(tier).borrow_mut();
            let was_empty = sequence.is_empty();
            sequence.push(TaskRecord::new(task, stack));
            was_empty
        };

        if was_empty {
            let requester = self.requester(tier);
            trace!(%tier, strategy = ?requester.strategy(), "requesting flush");
            requester.request();
        }
    }

    fn prepare_queue_stack(&self, tier: Tier) -> Rc<str> {
        let captured = self.host.stacks.capture();
        let enclosing = self.flush_stack.borrow();
        stacks::queue_stack(tier, &captured, enclosing.as_deref()).into()
    }
}
