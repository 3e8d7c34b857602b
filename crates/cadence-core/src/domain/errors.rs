//! Errors - タスク実行時のエラー
//!
//! JS の `throw` に相当するものは 3 種類に分類する。
//! - `Failed`: スタックを持つ構造化エラー（long-stack モードで書き換え対象）
//! - `Thrown`: スタックを持たない任意の値
//! - `Panicked`: `call()` 内で捕捉された panic

use std::backtrace::{Backtrace, BacktraceStatus};

use thiserror::Error;

/// TaskError はタスクの `call()` が返す（または panic から変換される）エラー
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{message}")]
    Failed { message: String, stack: String },

    #[error("{0}")]
    Thrown(String),

    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// 構造化エラーを作成
    ///
    /// `RUST_BACKTRACE` などでバックトレースが有効なときだけスタックを記録する。
    /// 無効なら空文字列になる。
    pub fn new(message: impl Into<String>) -> Self {
        let backtrace = Backtrace::capture();
        let stack = match backtrace.status() {
            BacktraceStatus::Captured => backtrace.to_string(),
            _ => String::new(),
        };
        Self::Failed {
            message: message.into(),
            stack,
        }
    }

    /// スタックを明示して構造化エラーを作成
    pub fn with_stack(message: impl Into<String>, stack: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            stack: stack.into(),
        }
    }

    /// スタックを持たない値を投げる
    pub fn thrown(value: impl Into<String>) -> Self {
        Self::Thrown(value.into())
    }

    /// 構造化エラーならスタックを返す
    pub fn stack(&self) -> Option<&str> {
        match self {
            TaskError::Failed { stack, .. } => Some(stack),
            _ => None,
        }
    }

    pub(crate) fn stack_mut(&mut self) -> Option<&mut String> {
        match self {
            TaskError::Failed { stack, .. } => Some(stack),
            _ => None,
        }
    }

    /// panic の payload を TaskError に変換
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_stack_is_structured() {
        let err = TaskError::with_stack("boom", "   0: site\n");
        assert_eq!(err.stack(), Some("   0: site\n"));
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn thrown_and_panicked_have_no_stack() {
        assert!(TaskError::thrown("oops").stack().is_none());
        assert!(TaskError::Panicked("x".into()).stack().is_none());
    }

    #[test]
    fn panic_payloads_are_stringified() {
        let err = TaskError::from_panic(Box::new("static str"));
        assert_eq!(err.to_string(), "task panicked: static str");

        let err = TaskError::from_panic(Box::new(String::from("owned")));
        assert_eq!(err.to_string(), "task panicked: owned");

        let err = TaskError::from_panic(Box::new(42_u32));
        assert!(matches!(err, TaskError::Panicked(m) if m == "non-string panic payload"));
    }
}
