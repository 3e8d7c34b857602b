//! Long-stack instrumentation: stitching stacks across enqueue boundaries.
//!
//! A causal stack is the stack captured at enqueue time with the queue's own
//! frames removed, prefixed by a tier label. If the enqueue happens while
//! a flush is running a task that itself carries a causal stack, that stack is
//! appended, so the chain spans every hop.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::Tier;

/// Everything up to and including the innermost `enqueue_*` frame, plus the
/// `at file:line` line that backtraces print under it.
static QUEUE_FRAMES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\s\S]*?\benqueue_(?:micro|macro)\b[^\n]*\n(?:[ \t]+at [^\n]*\n)?")
        .expect("queue frame pattern is valid")
});

/// Remove the frames that belong to the enqueue call itself.
pub fn filter_queue_stack(stack: &str) -> String {
    QUEUE_FRAMES.replace(stack, "").into_owned()
}

/// Cut the stack at the line of the outermost `flush_micro` (or failing that
/// `flush_macro`) frame, dropping it and everything below it.
pub fn filter_flush_stack(stack: &str) -> &str {
    let Some(index) = stack
        .rfind("flush_micro")
        .or_else(|| stack.rfind("flush_macro"))
    else {
        return stack;
    };
    match stack[..index].rfind('\n') {
        Some(line_start) => &stack[..line_start],
        None => stack,
    }
}

/// Build the causal stack for a task being enqueued on `tier`.
///
/// `enclosing` is the causal stack of the task currently being flushed, if any.
pub fn queue_stack(tier: Tier, captured: &str, enclosing: Option<&str>) -> String {
    let stack = format!("{}{}", tier.stack_separator(), filter_queue_stack(captured));
    match enclosing {
        Some(enclosing) => format!("{}{}", filter_flush_stack(&stack), enclosing),
        None => stack,
    }
}

/// Rewrite an error stack so it continues into the failing task's causal stack.
pub fn stitch_error_stack(error_stack: &str, task_stack: &str) -> String {
    format!("{}{}", filter_flush_stack(error_stack), task_stack)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPTURED: &str = "   0: capture\n   1: cadence_core::queue::TaskQueue::enqueue_macro\n             at src/queue/mod.rs:10:9\n   2: app::site_a\n   3: cadence_core::queue::TaskQueue::flush_macro\n   4: host::turn\n";

    #[test]
    fn queue_filter_strips_through_enqueue_frame() {
        let filtered = filter_queue_stack(CAPTURED);
        assert_eq!(
            filtered,
            "   2: app::site_a\n   3: cadence_core::queue::TaskQueue::flush_macro\n   4: host::turn\n"
        );
    }

    #[test]
    fn queue_filter_leaves_unrelated_stacks_alone() {
        let stack = "   0: main\n   1: helper\n";
        assert_eq!(filter_queue_stack(stack), stack);
    }

    #[test]
    fn queue_filter_does_not_match_partial_names() {
        let stack = "   0: my_enqueue_microwave\n   1: main\n";
        assert_eq!(filter_queue_stack(stack), stack);
    }

    #[test]
    fn flush_filter_cuts_at_flush_frame() {
        let stack = "   2: app::site_a\n   3: cadence_core::queue::TaskQueue::flush_macro\n   4: host::turn\n";
        assert_eq!(filter_flush_stack(stack), "   2: app::site_a");
    }

    #[test]
    fn flush_filter_prefers_micro_frame() {
        let stack = "a\n b::flush_macro\n c::flush_micro\n d\n";
        assert_eq!(filter_flush_stack(stack), "a\n b::flush_macro");
    }

    #[test]
    fn flush_filter_without_flush_frame_is_identity() {
        assert_eq!(filter_flush_stack("a\nb\n"), "a\nb\n");
    }

    #[test]
    fn queue_stack_without_enclosing_flush() {
        let stack = queue_stack(Tier::Micro, CAPTURED, None);
        assert!(stack.starts_with(Tier::Micro.stack_separator()));
        assert!(stack.contains("app::site_a"));
        assert!(!stack.contains("enqueue_macro"));
    }

    #[test]
    fn queue_stack_appends_enclosing_chain() {
        let outer = queue_stack(Tier::Macro, CAPTURED, None);
        let inner = queue_stack(Tier::Micro, CAPTURED, Some(&outer));

        let micro_at = inner.find(Tier::Micro.stack_separator()).unwrap();
        let macro_at = inner.find(Tier::Macro.stack_separator()).unwrap();
        assert!(micro_at < macro_at);
        assert!(inner.ends_with(&outer));
    }

    #[test]
    fn stitched_error_continues_into_task_stack() {
        let error_stack = "   0: app::fails\n   1: cadence_core::queue::TaskQueue::flush_micro\n   2: host\n";
        let task_stack = queue_stack(Tier::Micro, CAPTURED, None);

        let stitched = stitch_error_stack(error_stack, &task_stack);
        assert!(stitched.starts_with("   0: app::fails"));
        assert!(!stitched.contains("   2: host\n"));
        assert!(stitched.ends_with(&task_stack));
    }
}
