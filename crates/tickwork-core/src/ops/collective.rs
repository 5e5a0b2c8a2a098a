//! Collective - 一度きりの処理を操作にする
//!
//! 最初の poll で `process` を一度だけ呼び、同じ poll で終わります。
//! `process` は context 経由で結果を設定できます。`Err` や panic は
//! exception-error になります。

use std::cell::RefCell;
use std::rc::Rc;

use crate::domain::errors::TickworkError;
use crate::domain::fault::Fault;
use crate::domain::payload::{ErrorPayload, OutputPayload, ProgressPayload};
use crate::impls::frame_scheduler::FrameScheduler;
use crate::operation::{BodyContext, Launch, Operation, Step};

/// Builder for a single-poll operation over any payload types.
pub struct Collective<F> {
    name: String,
    null_result_is_success: bool,
    process: F,
}

impl<F> Collective<F> {
    pub const DEFAULT_NAME: &'static str = "AsyncOperationCollective";

    pub fn new(process: F) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            null_result_is_success: false,
            process,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn null_result_is_success(mut self, yes: bool) -> Self {
        self.null_result_is_success = yes;
        self
    }

    pub fn build<O, E, P>(self, scheduler: &FrameScheduler) -> Operation<O, E, P>
    where
        O: OutputPayload,
        E: ErrorPayload,
        P: ProgressPayload,
        F: FnMut(&mut BodyContext<'_, O, E, P>) -> Result<(), Fault> + 'static,
    {
        let process = Rc::new(RefCell::new(self.process));
        Operation::new(scheduler, self.name, move |_: &Launch| {
            let process = Rc::clone(&process);
            move |cx: &mut BodyContext<'_, O, E, P>| -> Result<Step, Fault> {
                let mut process = process.borrow_mut();
                (*process)(cx)?;
                Ok(Step::Done)
            }
        })
        .null_result_is_success(self.null_result_is_success)
    }

    pub fn call<O, E, P>(
        self,
        scheduler: &FrameScheduler,
    ) -> Result<Operation<O, E, P>, TickworkError>
    where
        O: OutputPayload,
        E: ErrorPayload,
        P: ProgressPayload,
        F: FnMut(&mut BodyContext<'_, O, E, P>) -> Result<(), Fault> + 'static,
    {
        let op = self.build(scheduler);
        op.execute()?;
        Ok(op)
    }
}
