//! ObserverFactory port - ゼロ遅延の変更監視プリミティブ
//!
//! ブラウザでいう MutationObserver + 空の Text ノードに相当します。
//! ノードに異なる値を書き込むと、ホストの最短のタイミングで
//! 束縛されたコールバックが呼ばれます（タイマーは使わない）。

use super::Callback;

/// ObserverFactory はコールバックに束縛された監視ノードを作成
pub trait ObserverFactory {
    fn observe(&self, callback: Callback) -> Box<dyn ObservedNode>;
}

/// ObservedNode は書き込みで通知をトリガーする値
///
/// # 契約
/// - 直前と異なる値の書き込みは、コールバックを 1 回スケジュールする
/// - 同じターン内の複数回の変更は 1 回の通知にまとめてよい
pub trait ObservedNode {
    fn write(&self, value: i32);
}
