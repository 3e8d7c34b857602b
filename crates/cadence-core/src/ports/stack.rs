//! StackCapture port - 呼び出しスタックの取得
//!
//! long-stack モードで enqueue 時のスタックを記録するために使います。

/// StackCapture は現在の呼び出しスタックを文字列で返す
///
/// # 形式
/// 1 フレーム 1 行（`std::backtrace::Backtrace` の表示形式に準じる）。
/// enqueue 側のフィルタは `enqueue_micro` / `enqueue_macro` を含む行、
/// flush 側のフィルタは `flush_micro` / `flush_macro` を含む行を探す。
pub trait StackCapture {
    fn capture(&self) -> String;
}
