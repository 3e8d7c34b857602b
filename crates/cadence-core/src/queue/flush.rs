//! Flush-request strategies: how a tier asks the host for its next drain.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ports::{Callback, Host, ObservedNode, TimerId, Timers};

/// Which mechanism a tier uses to request a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushStrategy {
    /// Toggle an observed node; the host calls back on its soonest turn.
    Observer,
    /// A zero-delay timeout raced against a watchdog interval.
    Timer,
}

/// Arrange exactly one future call of the tier's flush callback.
pub trait RequestFlush {
    fn request(&self);

    fn strategy(&self) -> FlushStrategy;
}

/// Pick the micro-tier strategy once, from the host's capability flag.
pub fn select_micro(host: &Host, flush: Callback, watchdog: Duration) -> Box<dyn RequestFlush> {
    match (&host.observer, host.features.change_observer) {
        (Some(factory), true) => Box::new(ObserverFlush::new(factory.observe(flush))),
        _ => Box::new(TimerFlush::new(Rc::clone(&host.timers), flush, watchdog)),
    }
}

/// The macro tier always uses timers.
pub fn select_macro(host: &Host, flush: Callback, watchdog: Duration) -> Box<dyn RequestFlush> {
    Box::new(TimerFlush::new(Rc::clone(&host.timers), flush, watchdog))
}

/// Zero-latency strategy: one reusable node, written with alternating values.
pub struct ObserverFlush {
    node: Box<dyn ObservedNode>,
    toggle: Cell<i32>,
}

impl ObserverFlush {
    pub fn new(node: Box<dyn ObservedNode>) -> Self {
        Self {
            node,
            toggle: Cell::new(1),
        }
    }
}

impl RequestFlush for ObserverFlush {
    fn request(&self) {
        let next = -self.toggle.get();
        self.toggle.set(next);
        self.node.write(next);
    }

    fn strategy(&self) -> FlushStrategy {
        FlushStrategy::Observer
    }
}

/// Timer strategy: arm a one-shot and a repeating timer with the same callback.
///
/// Whichever fires first cancels both and flushes. The interval only exists
/// for hosts that throttle or drop one-shot timers.
pub struct TimerFlush {
    timers: Rc<dyn Timers>,
    flush: Callback,
    watchdog: Duration,
}

impl TimerFlush {
    pub fn new(timers: Rc<dyn Timers>, flush: Callback, watchdog: Duration) -> Self {
        Self {
            timers,
            flush,
            watchdog,
        }
    }
}

impl RequestFlush for TimerFlush {
    fn request(&self) {
        let armed: Rc<RefCell<Option<(TimerId, TimerId)>>> = Rc::new(RefCell::new(None));
        let fired = Rc::new(Cell::new(false));

        let on_fire: Callback = {
            let armed = Rc::clone(&armed);
            let timers = Rc::clone(&self.timers);
            let flush = Rc::clone(&self.flush);
            Rc::new(move || {
                if fired.replace(true) {
                    return;
                }
                let ids = armed.borrow_mut().take();
                if let Some((timeout, interval)) = ids {
                    timers.cancel(timeout);
                    timers.cancel(interval);
                }
                flush();
            })
        };

        let timeout = self.timers.set_timeout(Duration::ZERO, Rc::clone(&on_fire));
        let interval = self.timers.set_interval(self.watchdog, on_fire);
        *armed.borrow_mut() = Some((timeout, interval));
    }

    fn strategy(&self) -> FlushStrategy {
        FlushStrategy::Timer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::ManualHost;
    use crate::ports::Features;

    fn counter() -> (Rc<Cell<usize>>, Callback) {
        let count = Rc::new(Cell::new(0));
        let sink = Rc::clone(&count);
        (count, Rc::new(move || sink.set(sink.get() + 1)))
    }

    #[test]
    fn micro_uses_observer_when_available() {
        let manual = ManualHost::new();
        let (_, flush) = counter();
        let strategy = select_micro(&manual.host(), flush, Duration::from_millis(50));
        assert_eq!(strategy.strategy(), FlushStrategy::Observer);
    }

    #[test]
    fn micro_falls_back_to_timer() {
        let manual = ManualHost::with_features(Features {
            change_observer: false,
        });
        let (_, flush) = counter();
        let strategy = select_micro(&manual.host(), flush, Duration::from_millis(50));
        assert_eq!(strategy.strategy(), FlushStrategy::Timer);
    }

    #[test]
    fn macro_always_uses_timer() {
        let manual = ManualHost::new();
        let (_, flush) = counter();
        let strategy = select_macro(&manual.host(), flush, Duration::from_millis(50));
        assert_eq!(strategy.strategy(), FlushStrategy::Timer);
    }

    #[test]
    fn observer_fires_without_timers() {
        let manual = ManualHost::new();
        let (count, flush) = counter();
        let strategy = select_micro(&manual.host(), flush, Duration::from_millis(50));

        strategy.request();
        assert_eq!(count.get(), 0);
        manual.run_microtasks();
        assert_eq!(count.get(), 1);
        assert_eq!(manual.timers_armed(), 0);
        assert_eq!(manual.observer_writes(), 1);
    }

    #[test]
    fn timer_fires_once_and_cancels_watchdog() {
        let manual = ManualHost::new();
        let (count, flush) = counter();
        let strategy = select_macro(&manual.host(), flush, Duration::from_millis(50));

        strategy.request();
        assert_eq!(manual.pending_timers(), 2);

        manual.run_until_idle();
        assert_eq!(count.get(), 1);
        assert_eq!(manual.pending_timers(), 0);
    }

    #[test]
    fn watchdog_fires_when_timeouts_are_throttled() {
        let manual = ManualHost::new();
        manual.suppress_timeouts(true);
        let (count, flush) = counter();
        let strategy = select_macro(&manual.host(), flush, Duration::from_millis(50));

        strategy.request();
        manual.advance(Duration::from_millis(49));
        assert_eq!(count.get(), 0);

        manual.advance(Duration::from_millis(1));
        assert_eq!(count.get(), 1);
        assert_eq!(manual.pending_timers(), 0);

        manual.advance(Duration::from_millis(500));
        assert_eq!(count.get(), 1);
    }
}
