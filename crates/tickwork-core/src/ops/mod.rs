//! Ops - すぐに使える leaf operation
//!
//! - **InvokeAfterDelay**: 指定時間が経ってからコールバック
//! - **InvokeAfterFrame**: 指定フレーム数が経ってからコールバック
//! - **InvokeNextFrame**: 次のフレームでコールバック
//! - **Delegate**: 任意の body から操作を作る（結果なし = success）
//! - **Collective**: 最初の poll で一度だけ処理を走らせる
//!
//! 待ち系の 3 つは共通の `waiting_leaf` で組み立てます。
//! 結果を設定しないので、いずれも null-result-is-success です。

pub mod collective;
pub mod delegate;
pub mod invoke_after_delay;
pub mod invoke_after_frame;
pub mod invoke_next_frame;

pub use self::collective::Collective;
pub use self::delegate::Delegate;
pub use self::invoke_after_delay::InvokeAfterDelay;
pub use self::invoke_after_frame::InvokeAfterFrame;
pub use self::invoke_next_frame::InvokeNextFrame;

use std::cell::RefCell;
use std::rc::Rc;

use crate::domain::fault::Fault;
use crate::impls::frame_scheduler::FrameScheduler;
use crate::operation::{BasicContext, BasicOperation, Launch, Operation, Step};

/// Yield until `ready` holds, then invoke `callback` once and finish.
///
/// The callback is shared by every run of the returned operation.
fn waiting_leaf<F, R>(
    scheduler: &FrameScheduler,
    name: String,
    callback: F,
    ready: R,
) -> BasicOperation
where
    F: FnMut() + 'static,
    R: Fn(&BasicContext<'_>) -> bool + 'static,
{
    let callback: Rc<RefCell<dyn FnMut()>> = Rc::new(RefCell::new(callback));
    let ready = Rc::new(ready);

    Operation::new(scheduler, name, move |_: &Launch| {
        let callback = Rc::clone(&callback);
        let ready = Rc::clone(&ready);
        move |cx: &mut BasicContext<'_>| -> Result<Step, Fault> {
            if !(*ready)(cx) {
                return Ok(Step::Yield);
            }
            let mut invoke = callback.borrow_mut();
            (*invoke)();
            Ok(Step::Done)
        }
    })
    .null_result_is_success(true)
}
