//! ErrorReporter / Immediate port - 未処理エラーの報告経路
//!
//! タスク固有のハンドラを持たないエラーは、スケジューラの制御フローを
//! 中断しないように、ホストの未処理エラーチャネルへ非同期に再送出されます。

use crate::domain::TaskError;

/// ErrorReporter はホストのトップレベルのエラー報告
pub trait ErrorReporter {
    fn report(&self, error: TaskError);
}

/// Immediate は setImmediate に相当する即時コールバック
///
/// ホストに無い場合は 0 ms のタイマーで代用される。
pub trait Immediate {
    fn set_immediate(&self, callback: Box<dyn FnOnce()>);
}
