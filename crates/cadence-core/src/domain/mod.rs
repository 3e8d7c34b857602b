//! Domain model (tiers, tasks, errors).

pub mod errors;
pub mod task;
pub mod tier;

pub use self::errors::TaskError;
pub use self::task::{Recoverable, Task, recoverable};
pub use self::tier::Tier;
