//! InvokeAfterDelay - 指定時間後にコールバック
//!
//! 経過時間はスケジューラの時計で tick ごとに測ります（execute 時点が起点）。
//! 遅延 0 でも最初の poll は次の tick です。

use std::time::Duration;

use crate::domain::errors::TickworkError;
use crate::impls::frame_scheduler::FrameScheduler;
use crate::operation::{BasicContext, BasicOperation};

/// Builder for an operation that calls back once `delay` has elapsed.
pub struct InvokeAfterDelay<F> {
    name: String,
    delay: Duration,
    callback: F,
}

impl<F> InvokeAfterDelay<F>
where
    F: FnMut() + 'static,
{
    pub const DEFAULT_NAME: &'static str = "InvokeAfterDelay";

    pub fn new(callback: F) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            delay: Duration::ZERO,
            callback,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Delay in (fractional) seconds; negative or non-finite values mean no delay.
    pub fn seconds(self, secs: f64) -> Self {
        self.delay(Duration::try_from_secs_f64(secs).unwrap_or_default())
    }

    pub fn build(self, scheduler: &FrameScheduler) -> BasicOperation {
        let delay = self.delay;
        super::waiting_leaf(scheduler, self.name, self.callback, move |cx: &BasicContext<'_>| {
            cx.elapsed_since_launch() >= delay
        })
    }

    /// Build and execute.
    pub fn call(self, scheduler: &FrameScheduler) -> Result<BasicOperation, TickworkError> {
        let op = self.build(scheduler);
        op.execute()?;
        Ok(op)
    }
}
