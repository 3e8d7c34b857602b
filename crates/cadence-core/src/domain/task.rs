//! Task trait - 遅延実行される作業の単位
//!
//! # 学習ポイント
//! - クロージャへの blanket impl（`FnMut() -> Result<..>` はそのまま Task）
//! - デフォルトメソッドによる「任意の capability」の表現（`on_error`）

use super::errors::TaskError;

/// Task はキューに積まれる作業の単位
///
/// # 使用例
/// ```ignore
/// queue.enqueue_micro(|| {
///     println!("runs before the next host turn");
///     Ok(())
/// });
/// ```
///
/// # エラー処理
/// `call()` が `Err` を返すと、同じバッチの残りのタスクは破棄される。
/// その後 `on_error()` が呼ばれ、`Err` が返ってきた場合はホストの
/// unhandled-error チャネルへ非同期に報告される。
pub trait Task {
    fn call(&mut self) -> Result<(), TaskError>;

    /// タスク固有のエラーハンドラ
    ///
    /// デフォルトはハンドラなし（エラーをそのまま返す）。
    fn on_error(&mut self, error: TaskError) -> Result<(), TaskError> {
        Err(error)
    }
}

impl<F> Task for F
where
    F: FnMut() -> Result<(), TaskError>,
{
    fn call(&mut self) -> Result<(), TaskError> {
        self()
    }
}

/// Recoverable はクロージャとエラーハンドラの組
pub struct Recoverable<F, H> {
    task: F,
    handler: H,
}

/// エラーハンドラ付きのタスクを作成
///
/// # Example
/// ```ignore
/// queue.enqueue_macro(recoverable(
///     || Err(TaskError::new("boom")),
///     |err| eprintln!("recovered: {err}"),
/// ));
/// ```
pub fn recoverable<F, H>(task: F, handler: H) -> Recoverable<F, H>
where
    F: FnMut() -> Result<(), TaskError>,
    H: FnMut(TaskError),
{
    Recoverable { task, handler }
}

impl<F, H> Task for Recoverable<F, H>
where
    F: FnMut() -> Result<(), TaskError>,
    H: FnMut(TaskError),
{
    fn call(&mut self) -> Result<(), TaskError> {
        (self.task)()
    }

    fn on_error(&mut self, error: TaskError) -> Result<(), TaskError> {
        (self.handler)(error);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn closures_are_tasks_without_handlers() {
        let mut task = || -> Result<(), TaskError> { Err(TaskError::thrown("nope")) };
        assert!(Task::call(&mut task).is_err());

        let err = Task::on_error(&mut task, TaskError::thrown("nope"));
        assert!(matches!(err, Err(TaskError::Thrown(v)) if v == "nope"));
    }

    #[test]
    fn recoverable_routes_errors_to_handler() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut task = recoverable(
            || Err(TaskError::thrown("bad")),
            move |err| sink.borrow_mut().push(err.to_string()),
        );

        let err = Task::call(&mut task).unwrap_err();
        assert!(task.on_error(err).is_ok());
        assert_eq!(*seen.borrow(), vec!["bad".to_string()]);
    }
}
