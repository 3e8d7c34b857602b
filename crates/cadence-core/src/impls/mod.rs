//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **ManualHost**: 仮想時間の決定的なホスト（テスト・組み込み用）
//! - **TokioHost**: tokio の LocalSet 上で動くホスト
//! - **TracingReporter**: 未処理エラーを tracing で記録
//! - **BacktraceCapture / FixedStack**: long-stack モード用のスタック取得

pub mod backtrace;
pub mod manual;
pub mod tokio_host;

// 主要な型を再エクスポート
pub use self::backtrace::{BacktraceCapture, FixedStack};
pub use self::manual::ManualHost;
pub use self::tokio_host::{TokioHost, TracingReporter};
