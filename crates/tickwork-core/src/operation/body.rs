//! Body - tick ごとに poll される操作本体
//!
//! body は「1 回の poll = 1 tick 分の仕事」を行い、続きがあれば
//! `Step::Yield`、終わったら `Step::Done` を返します。
//! 結果・進捗・配送バリアは `BodyContext` 経由で操作します。

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::executor::RunControl;
use super::handle::OperationInner;
use crate::domain::fault::Fault;
use crate::domain::ids::RunId;
use crate::domain::payload::{
    ErrorPayload, OperationErrors, OperationOutputs, OperationProgress, OutputPayload,
    ProgressPayload,
};
use crate::domain::result::OperationResult;
use crate::ports::Tick;

/// What a body reports after one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Suspend until the next tick.
    Yield,

    /// The body is finished.
    Done,
}

/// Captured when `execute` is called, before any barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launch {
    pub run_id: RunId,

    /// Scheduler frame at `execute` time.
    pub frame: u64,

    /// Scheduler clock at `execute` time.
    pub at: DateTime<Utc>,
}

/// The resumable work of an operation.
///
/// Returning `Err` (or panicking) ends the run with an `exception-error`.
pub trait Body<O, E, P> {
    fn poll(&mut self, cx: &mut BodyContext<'_, O, E, P>) -> Result<Step, Fault>;
}

impl<O, E, P, F> Body<O, E, P> for F
where
    F: FnMut(&mut BodyContext<'_, O, E, P>) -> Result<Step, Fault>,
{
    fn poll(&mut self, cx: &mut BodyContext<'_, O, E, P>) -> Result<Step, Fault> {
        self(cx)
    }
}

/// Context for the base payload types.
pub type BasicContext<'a> = BodyContext<'a, OperationOutputs, OperationErrors, OperationProgress>;

/// What a body can see and do during one poll.
pub struct BodyContext<'a, O, E, P> {
    tick: &'a Tick,
    launch: &'a Launch,
    inner: &'a OperationInner<O, E, P>,
    control: &'a RunControl,
    progress: &'a mut Vec<P>,
}

impl<'a, O, E, P> BodyContext<'a, O, E, P>
where
    O: OutputPayload,
    E: ErrorPayload,
    P: ProgressPayload,
{
    pub(crate) fn new(
        tick: &'a Tick,
        launch: &'a Launch,
        inner: &'a OperationInner<O, E, P>,
        control: &'a RunControl,
        progress: &'a mut Vec<P>,
    ) -> Self {
        Self {
            tick,
            launch,
            inner,
            control,
            progress,
        }
    }

    pub fn tick(&self) -> &Tick {
        self.tick
    }

    pub fn frame(&self) -> u64 {
        self.tick.frame
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.tick.now
    }

    pub fn launch(&self) -> &Launch {
        self.launch
    }

    /// Frames elapsed since `execute` was called.
    pub fn frames_since_launch(&self) -> u64 {
        self.tick.frame.saturating_sub(self.launch.frame)
    }

    /// Clock time elapsed since `execute` was called (zero if the clock went back).
    pub fn elapsed_since_launch(&self) -> Duration {
        (self.tick.now - self.launch.at).to_std().unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Replace the pending result of this run.
    pub fn set_result(&mut self, result: OperationResult<O, E>) {
        self.inner.set_result(result);
    }

    pub fn succeed(&mut self, outputs: O) {
        self.set_result(OperationResult::success(outputs));
    }

    pub fn fail(&mut self, errors: E) {
        self.set_result(OperationResult::error(errors));
    }

    pub fn has_result(&self) -> bool {
        self.inner.has_result()
    }

    /// Queue a progress notification; subscribers see it once this poll returns.
    pub fn notify_progress(&mut self, progress: P) {
        self.progress.push(progress);
    }

    pub fn notify_progress_value(&mut self, value: f32) {
        self.notify_progress(P::from_value(value));
    }

    /// Engage the delivery barrier: the result is withheld until released.
    pub fn hold_delivery(&mut self) {
        self.control.hold_delivery();
    }

    pub fn release_delivery(&mut self) {
        self.control.release_delivery();
    }
}
