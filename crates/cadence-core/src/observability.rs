use serde::{Deserialize, Serialize};

use crate::queue::FlushStrategy;

/// Cumulative counters of a queue instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounters {
    pub flushes: u64,
    pub tasks_run: u64,
    pub batches_abandoned: u64,
    pub tasks_discarded: u64,
    pub errors_handled: u64,
    pub errors_reported: u64,
}

/// Point-in-time view of a queue instance.
///
/// `*_pending` counts tasks still waiting to run; `*_storage` is the raw
/// sequence length, which during a drain also includes processed slots that
/// have not been compacted away yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub micro_pending: usize,
    pub micro_storage: usize,
    pub macro_pending: usize,
    pub macro_storage: usize,
    pub flushing: bool,
    pub long_stacks: bool,
    pub micro_capacity: usize,
    pub micro_strategy: FlushStrategy,
    pub counters: QueueCounters,
}
