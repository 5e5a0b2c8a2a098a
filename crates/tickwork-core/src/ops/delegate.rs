//! Delegate - 任意の body をそのまま操作にする
//!
//! 結果を設定しない body は success として配送されます。

use crate::domain::errors::TickworkError;
use crate::domain::payload::{OperationErrors, OperationOutputs, OperationProgress};
use crate::impls::frame_scheduler::FrameScheduler;
use crate::operation::{BasicOperation, Body, Launch, Operation};

/// Builder for an operation whose body is supplied per run by `make_body`.
pub struct Delegate<M> {
    name: String,
    make_body: M,
}

impl<M> Delegate<M> {
    pub const DEFAULT_NAME: &'static str = "AsyncOperationDelegate";

    pub fn new(make_body: M) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            make_body,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn build<B>(self, scheduler: &FrameScheduler) -> BasicOperation
    where
        M: FnMut(&Launch) -> B + 'static,
        B: Body<OperationOutputs, OperationErrors, OperationProgress> + 'static,
    {
        Operation::new(scheduler, self.name, self.make_body).null_result_is_success(true)
    }

    pub fn call<B>(self, scheduler: &FrameScheduler) -> Result<BasicOperation, TickworkError>
    where
        M: FnMut(&Launch) -> B + 'static,
        B: Body<OperationOutputs, OperationErrors, OperationProgress> + 'static,
    {
        let op = self.build(scheduler);
        op.execute()?;
        Ok(op)
    }
}
