//! StackCapture の実装
//!
//! - **BacktraceCapture**: `std::backtrace::Backtrace` を強制取得（本番用）
//! - **FixedStack**: 固定文字列を返す（テスト用）

use std::backtrace::Backtrace;

use crate::ports::StackCapture;

/// BacktraceCapture は環境変数に関係なくバックトレースを取得する
///
/// long-stack モードは明示的に有効化されるものなので、
/// `RUST_BACKTRACE` の設定を待たずに取得する。
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktraceCapture;

impl StackCapture for BacktraceCapture {
    fn capture(&self) -> String {
        Backtrace::force_capture().to_string()
    }
}

/// FixedStack は常に同じスタックを返す
#[derive(Debug, Clone)]
pub struct FixedStack(String);

impl FixedStack {
    pub fn new(stack: impl Into<String>) -> Self {
        Self(stack.into())
    }

    /// フレーム名の並びからバックトレース風の文字列を作る
    ///
    /// # Example
    /// ```ignore
    /// let stack = FixedStack::from_frames(&["capture", "TaskQueue::enqueue_micro", "app::main"]);
    /// ```
    pub fn from_frames(frames: &[&str]) -> Self {
        let stack = frames
            .iter()
            .enumerate()
            .map(|(index, frame)| format!("{index:>4}: {frame}\n"))
            .collect();
        Self(stack)
    }
}

impl StackCapture for FixedStack {
    fn capture(&self) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_stack_formats_frames() {
        let stack = FixedStack::from_frames(&["a", "b"]);
        assert_eq!(stack.capture(), "   0: a\n   1: b\n");
    }

    #[test]
    fn backtrace_capture_is_not_empty() {
        let stack = BacktraceCapture.capture();
        assert!(!stack.is_empty());
    }
}
