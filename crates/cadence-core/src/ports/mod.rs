//! Ports - ホスト環境の抽象化レイヤー
//!
//! スケジューラ自身のロジックではない低レベルのプリミティブは、
//! すべてここの trait を通して構築時に注入されます。
//!
//! # ポート一覧
//! - **ObserverFactory**: ゼロ遅延の変更監視（micro の高速経路）
//! - **Timers**: ワンショット / 繰り返しタイマー
//! - **Immediate**: 即時コールバック（任意）
//! - **ErrorReporter**: 未処理エラーの報告
//! - **StackCapture**: long-stack モード用のスタック取得
//!
//! # スレッドモデル
//! 協調的なシングルスレッド前提のため、コールバックは `Rc<dyn Fn()>` で
//! `Send` を要求しません。

pub mod error_channel;
pub mod observer;
pub mod stack;
pub mod timer;

use std::rc::Rc;

// 主要な trait を再エクスポート
pub use self::error_channel::{ErrorReporter, Immediate};
pub use self::observer::{ObservedNode, ObserverFactory};
pub use self::stack::StackCapture;
pub use self::timer::{TimerId, Timers};

/// ホストが呼び出す引数なし・戻り値なしのコールバック
pub type Callback = Rc<dyn Fn()>;

/// Features はホストの能力フラグ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    /// ゼロ遅延の変更監視プリミティブが使えるか
    pub change_observer: bool,
}

/// Host は構築時に注入されるホスト能力の束
///
/// # 使用例
/// ```ignore
/// let manual = ManualHost::new();
/// let queue = TaskQueue::builder(manual.host()).build()?;
/// ```
#[derive(Clone)]
pub struct Host {
    pub features: Features,
    pub observer: Option<Rc<dyn ObserverFactory>>,
    pub timers: Rc<dyn Timers>,
    pub immediate: Option<Rc<dyn Immediate>>,
    pub reporter: Rc<dyn ErrorReporter>,
    pub stacks: Rc<dyn StackCapture>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("features", &self.features)
            .field("observer", &self.observer.is_some())
            .field("immediate", &self.immediate.is_some())
            .finish_non_exhaustive()
    }
}
