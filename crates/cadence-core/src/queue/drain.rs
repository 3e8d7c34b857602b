//! Drain engine: runs one tier's sequence in order.
//!
//! - Walks the slots from index 0, taking each record out before running it,
//!   so tasks can enqueue onto the same tier while it drains.
//! - Micro tier only: once the walk passes `capacity` entries, the processed
//!   prefix is compacted away and the walk restarts at 0.
//! - The first failing task stops the walk. The whole sequence is cleared and
//!   the discarded records are dropped outside any borrow. The error then goes
//!   to the task's handler or the host's unhandled channel. The handler sees a
//!   fresh batch: it may enqueue and flush the same tier.

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{Inner, TaskRecord, stacks};
use crate::domain::{Task, TaskError, Tier};

/// Bookkeeping for one drain. Restores the queue's flushing state on drop,
/// including the causal stack of whatever drain was running before it.
struct DrainScope<'a> {
    inner: &'a Inner,
    tier: Tier,
    saved_stack: Option<Rc<str>>,
}

impl<'a> DrainScope<'a> {
    fn enter(inner: &'a Inner, tier: Tier) -> Self {
        inner.flush_depth.set(inner.flush_depth.get() + 1);
        let saved_stack = inner.flush_stack.borrow().clone();
        Self {
            inner,
            tier,
            saved_stack,
        }
    }

    fn set_current_stack(&self, stack: Option<Rc<str>>) {
        *self.inner.flush_stack.borrow_mut() = stack;
    }

    /// Let the tier drain again while this scope is still open.
    fn release_tier(&self) {
        self.inner.draining(self.tier).set(false);
    }
}

impl Drop for DrainScope<'_> {
    fn drop(&mut self) {
        let inner = self.inner;
        *inner.flush_stack.borrow_mut() = self.saved_stack.take();
        inner.draining(self.tier).set(false);
        inner.flush_depth.set(inner.flush_depth.get() - 1);
    }
}

impl Inner {
    pub(super) fn drain(&self, tier: Tier) {
        if self.sequence(tier).borrow().is_empty() {
            return;
        }
        if self.draining(tier).replace(true) {
            debug!(%tier, "flush requested while already draining; pending tasks join the running walk");
            return;
        }

        let scope = DrainScope::enter(self, tier);
        let sequence = self.sequence(tier);
        let capacity = match tier {
            Tier::Micro => self.micro_capacity.get(),
            Tier::Macro => 0,
        };
        self.count(|c| c.flushes += 1);
        debug!(%tier, pending = sequence.borrow().pending(), "flush started");

        let mut index = 0;
        let mut ran = 0_u64;
        let mut failure = None;
        loop {
            let next = {
                let mut sequence = sequence.borrow_mut();
                if index >= sequence.len() {
                    break;
                }
                sequence.take(index)
            };
            index += 1;
            let Some(mut record) = next else {
                continue;
            };

            if self.long_stacks.get() {
                scope.set_current_stack(record.stack.clone());
            }
            let result = run_task(record.task.as_mut());
            ran += 1;

            if let Err(error) = result {
                failure = Some((index - 1, record, error));
                break;
            }

            if capacity > 0 && index > capacity {
                sequence.borrow_mut().compact(index);
                index = 0;
            }
        }

        let leftover = sequence.borrow_mut().clear();
        let discarded = leftover.len();
        drop(leftover);
        self.count(|c| c.tasks_run += ran);

        match failure {
            Some((failed_at, record, error)) => {
                warn!(%tier, failed_at, discarded, "task failed; abandoning the rest of the batch");
                self.count(|c| {
                    c.batches_abandoned += 1;
                    c.tasks_discarded += discarded as u64;
                });
                scope.release_tier();
                self.handle_error(record, error);
            }
            None => debug!(%tier, ran, "flush finished"),
        }
        drop(scope);
    }

    fn handle_error(&self, mut record: TaskRecord, mut error: TaskError) {
        if self.long_stacks.get()
            && let Some(task_stack) = record.stack.as_deref()
            && let Some(stack) = error.stack_mut()
        {
            *stack = stacks::stitch_error_stack(stack, task_stack);
        }

        match record.task.on_error(error) {
            Ok(()) => self.count(|c| c.errors_handled += 1),
            Err(error) => {
                self.count(|c| c.errors_reported += 1);
                self.report_unhandled(error);
            }
        }
    }

    /// Re-raise on the host's unhandled-error channel without blocking the drain.
    fn report_unhandled(&self, error: TaskError) {
        let reporter = Rc::clone(&self.host.reporter);
        match &self.host.immediate {
            Some(immediate) => immediate.set_immediate(Box::new(move || reporter.report(error))),
            None => {
                let error = RefCell::new(Some(error));
                self.host.timers.set_timeout(
                    Duration::ZERO,
                    Rc::new(move || {
                        if let Some(error) = error.borrow_mut().take() {
                            reporter.report(error);
                        }
                    }),
                );
            }
        }
    }
}

/// Run one task, turning a panic into an ordinary task error.
fn run_task(task: &mut dyn Task) -> Result<(), TaskError> {
    catch_unwind(AssertUnwindSafe(|| task.call()))
        .unwrap_or_else(|payload| Err(TaskError::from_panic(payload)))
}
