//! Queue sequence: ordered slots for one tier.

use super::TaskRecord;

/// Insertion-ordered storage for one tier.
///
/// Design:
/// - The drain walks the slots by index and takes each record out, leaving `None`.
/// - `compact()` drops the processed prefix so a long same-cycle drain
///   does not keep growing the tail.
/// - `len()` is the raw storage length (processed slots included);
///   `pending()` counts records still waiting to run.
#[derive(Default)]
pub struct Sequence {
    slots: Vec<Option<TaskRecord>>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: TaskRecord) {
        self.slots.push(Some(record));
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Take the record at `index`, leaving its slot empty.
    pub fn take(&mut self, index: usize) -> Option<TaskRecord> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    /// Shift everything after the first `processed` slots to the front.
    pub fn compact(&mut self, processed: usize) {
        let processed = processed.min(self.slots.len());
        self.slots.drain(..processed);
    }

    /// Empty the sequence and hand back the records that were still pending.
    ///
    /// The caller drops them, so a task's `Drop` never runs under a borrow
    /// of this sequence.
    #[must_use]
    pub fn clear(&mut self) -> Vec<TaskRecord> {
        std::mem::take(&mut self.slots).into_iter().flatten().collect()
    }

    pub fn stacks(&self) -> Vec<Option<String>> {
        self.slots
            .iter()
            .flatten()
            .map(|record| record.stack.as_deref().map(str::to_string))
            .collect()
    }
}
