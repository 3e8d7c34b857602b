//! cadence-core
//!
//! Cooperative two-tier task scheduler.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（Tier, Task, TaskError）
//! - **ports**: ホスト環境の抽象化（ObserverFactory, Timers, Immediate, ErrorReporter, StackCapture）
//! - **queue**: TaskQueue 本体（enqueue / flush、drain エンジン、flush 要求の戦略、long-stack）
//! - **impls**: ports の実装（ManualHost, TokioHost, BacktraceCapture など）
//! - **observability**: 統計ビュー（QueueStats）

pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use domain::{Task, TaskError, Tier, recoverable};
pub use queue::{BuildError, QueueBuilder, QueueConfig, TaskQueue};
