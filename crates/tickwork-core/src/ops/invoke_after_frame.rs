//! InvokeAfterFrame - 指定フレーム数の後にコールバック

use crate::domain::errors::TickworkError;
use crate::impls::frame_scheduler::FrameScheduler;
use crate::operation::{BasicContext, BasicOperation};

/// Builder for an operation that calls back `frames` ticks after `execute`.
///
/// `frames(0)` behaves like `frames(1)`: the first poll is always on the next tick.
pub struct InvokeAfterFrame<F> {
    name: String,
    frames: u64,
    callback: F,
}

impl<F> InvokeAfterFrame<F>
where
    F: FnMut() + 'static,
{
    pub const DEFAULT_NAME: &'static str = "InvokeAfterFrame";

    pub fn new(callback: F) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            frames: 1,
            callback,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn frames(mut self, frames: u64) -> Self {
        self.frames = frames;
        self
    }

    pub fn build(self, scheduler: &FrameScheduler) -> BasicOperation {
        let frames = self.frames;
        super::waiting_leaf(scheduler, self.name, self.callback, move |cx: &BasicContext<'_>| {
            cx.frames_since_launch() >= frames
        })
    }

    pub fn call(self, scheduler: &FrameScheduler) -> Result<BasicOperation, TickworkError> {
        let op = self.build(scheduler);
        op.execute()?;
        Ok(op)
    }
}
