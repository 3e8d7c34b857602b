//! Task record: the task plus its causal stack.

use std::rc::Rc;

use crate::domain::Task;

/// A pending task as held by a queue sequence.
///
/// Design:
/// - The sequence owns the record until the drain takes it out of its slot.
/// - `stack` is only populated when long-stack mode was on at enqueue time.
pub struct TaskRecord {
    pub task: Box<dyn Task>,

    /// Causal stack attached at enqueue time.
    pub stack: Option<Rc<str>>,
}

impl TaskRecord {
    pub fn new(task: Box<dyn Task>, stack: Option<Rc<str>>) -> Self {
        Self { task, stack }
    }
}
