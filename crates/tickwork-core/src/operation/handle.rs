//! Operation - 呼び出し側が保持する操作ハンドル
//!
//! # 使用例
//! ```ignore
//! let op: BasicOperation = Operation::new(&scheduler, "load", |_launch: &Launch| {
//!     |cx: &mut BasicContext<'_>| -> Result<Step, Fault> {
//!         cx.succeed(OperationOutputs);
//!         Ok(Step::Done)
//!     }
//! });
//! op.on_success(|_| println!("loaded"));
//! op.execute()?;
//! ```
//!
//! # 設計
//! - ハンドルは `Rc` の共有（clone しても同じ操作）
//! - run ごとに新しい body と Executor を作る（execute のたびに作り直し）
//! - 結果は run ごとに一度だけ配送し、配送前に run の登録を外す
//!   （購読者の中から再 execute できるように）

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::body::{Body, Launch};
use super::channel::{Channel, SubscriptionId};
use super::executor::{Executor, RunControl};
use crate::domain::errors::TickworkError;
use crate::domain::ids::{OperationId, RunId, SlotId};
use crate::domain::payload::{
    ErrorPayload, OperationErrors, OperationOutputs, OperationProgress, OutputPayload,
    ProgressPayload,
};
use crate::domain::result::{OperationResult, ResultKind};
use crate::domain::state::{OperationState, Reclaim};
use crate::impls::frame_scheduler::{FrameScheduler, SchedulerCore};

/// Operation over the base payload types.
pub type BasicOperation = Operation<OperationOutputs, OperationErrors, OperationProgress>;

type BodyFactory<O, E, P> = Box<dyn FnMut(&Launch) -> Box<dyn Body<O, E, P>>>;

struct LiveRun {
    slot: SlotId,
    run_id: RunId,
    control: Rc<RunControl>,
}

pub(crate) struct OperationInner<O, E, P> {
    id: OperationId,
    name: String,
    scheduler: Weak<SchedulerCore>,
    null_result_is_success: Cell<bool>,
    hold_start: Cell<bool>,
    factory: RefCell<BodyFactory<O, E, P>>,
    result: RefCell<Option<OperationResult<O, E>>>,
    state: Cell<OperationState>,
    run: RefCell<Option<LiveRun>>,
    success: Channel<O>,
    error: Channel<E>,
    progress: Channel<P>,
}

/// Handle to a deferred operation.
///
/// Cloning the handle does not clone the operation.
pub struct Operation<O, E, P> {
    inner: Rc<OperationInner<O, E, P>>,
}

impl<O, E, P> Clone for Operation<O, E, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<O, E, P> Operation<O, E, P>
where
    O: OutputPayload,
    E: ErrorPayload,
    P: ProgressPayload,
{
    /// Create an idle operation bound to `scheduler`.
    ///
    /// `make_body` is called once per `execute` to build that run's body.
    pub fn new<M, B>(scheduler: &FrameScheduler, name: impl Into<String>, mut make_body: M) -> Self
    where
        M: FnMut(&Launch) -> B + 'static,
        B: Body<O, E, P> + 'static,
    {
        let factory: BodyFactory<O, E, P> =
            Box::new(move |launch: &Launch| Box::new(make_body(launch)) as Box<dyn Body<O, E, P>>);
        Self {
            inner: Rc::new(OperationInner {
                id: scheduler.core().generate_operation_id(),
                name: name.into(),
                scheduler: scheduler.downgrade(),
                null_result_is_success: Cell::new(false),
                hold_start: Cell::new(false),
                factory: RefCell::new(factory),
                result: RefCell::new(None),
                state: Cell::new(OperationState::Idle),
                run: RefCell::new(None),
                success: Channel::new(),
                error: Channel::new(),
                progress: Channel::new(),
            }),
        }
    }

    /// Whether a run that sets no result counts as success (default: error).
    pub fn null_result_is_success(self, yes: bool) -> Self {
        self.inner.null_result_is_success.set(yes);
        self
    }

    /// Start a new run. Outcomes arrive later through the channels.
    ///
    /// Fails with `AlreadyExecuting` if a run is live.
    pub fn execute(&self) -> Result<(), TickworkError> {
        let inner = &self.inner;
        if inner.state.get() == OperationState::Running {
            return Err(TickworkError::AlreadyExecuting {
                operation: inner.name.clone(),
            });
        }
        let scheduler = inner
            .scheduler
            .upgrade()
            .ok_or(TickworkError::SchedulerUnavailable)?;

        inner.result.borrow_mut().take();
        let launch = Launch {
            run_id: scheduler.generate_run_id(),
            frame: scheduler.frame(),
            at: scheduler.now(),
        };
        let body = {
            let mut factory = inner.factory.borrow_mut();
            (*factory)(&launch)
        };

        let hold_start = inner.hold_start.take();
        let control = Rc::new(RunControl::new(hold_start));
        let executor = Executor::new(Rc::clone(inner), body, launch, Rc::clone(&control));
        let slot = match scheduler.acquire(Box::new(executor)) {
            Ok(slot) => slot,
            Err(err) => {
                inner.hold_start.set(hold_start);
                return Err(err);
            }
        };

        debug!(
            operation = %inner.name,
            id = %inner.id,
            run = %launch.run_id,
            %slot,
            hold_start,
            "operation executing"
        );
        *inner.run.borrow_mut() = Some(LiveRun {
            slot,
            run_id: launch.run_id,
            control,
        });
        inner.state.set(OperationState::Running);
        Ok(())
    }

    /// Silently tear down the live run, if any. Nothing is delivered.
    pub fn cancel(&self) {
        let Some(run) = self.inner.run.borrow_mut().take() else {
            return;
        };
        run.control.cancel();
        self.inner.result.borrow_mut().take();
        self.inner.state.set(OperationState::Cancelled);
        debug!(operation = %self.inner.name, run = %run.run_id, "operation cancelled");

        if let Some(scheduler) = self.inner.scheduler.upgrade() {
            scheduler.release(run.slot, Reclaim::Cancelled);
        }
    }

    /// Hold the start of the next run until [`Operation::release_start_barrier`].
    pub fn engage_start_barrier(&self) {
        self.inner.hold_start.set(true);
    }

    /// Order the live run to start.
    ///
    /// Ordering the same run twice is `StartAlreadyOrdered`.
    pub fn release_start_barrier(&self) -> Result<(), TickworkError> {
        let run = self.inner.run.borrow();
        let Some(run) = run.as_ref() else {
            return Err(self.not_running());
        };
        if !run.control.order_start() {
            return Err(TickworkError::StartAlreadyOrdered {
                operation: self.inner.name.clone(),
            });
        }
        Ok(())
    }

    /// Let the live run deliver its result.
    pub fn release_delivery_barrier(&self) -> Result<(), TickworkError> {
        let run = self.inner.run.borrow();
        let Some(run) = run.as_ref() else {
            return Err(self.not_running());
        };
        run.control.release_delivery();
        Ok(())
    }

    pub fn on_success(&self, handler: impl Fn(&O) + 'static) -> SubscriptionId {
        self.inner.success.subscribe(handler)
    }

    pub fn on_error(&self, handler: impl Fn(&E) + 'static) -> SubscriptionId {
        self.inner.error.subscribe(handler)
    }

    pub fn on_progress(&self, handler: impl Fn(&P) + 'static) -> SubscriptionId {
        self.inner.progress.subscribe(handler)
    }

    pub fn success_channel(&self) -> &Channel<O> {
        &self.inner.success
    }

    pub fn error_channel(&self) -> &Channel<E> {
        &self.inner.error
    }

    pub fn progress_channel(&self) -> &Channel<P> {
        &self.inner.progress
    }

    pub fn id(&self) -> OperationId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> OperationState {
        self.inner.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state() == OperationState::Running
    }

    /// Scheduler slot of the live run.
    pub fn slot(&self) -> Option<SlotId> {
        self.inner.run.borrow().as_ref().map(|run| run.slot)
    }

    pub fn run_id(&self) -> Option<RunId> {
        self.inner.run.borrow().as_ref().map(|run| run.run_id)
    }

    fn not_running(&self) -> TickworkError {
        TickworkError::NotRunning {
            operation: self.inner.name.clone(),
        }
    }
}

impl<O, E, P> fmt::Debug for Operation<O, E, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.inner.state.get())
            .finish()
    }
}

impl<O, E, P> OperationInner<O, E, P>
where
    O: OutputPayload,
    E: ErrorPayload,
    P: ProgressPayload,
{
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_result(&self, result: OperationResult<O, E>) {
        *self.result.borrow_mut() = Some(result);
    }

    pub(crate) fn has_result(&self) -> bool {
        self.result.borrow().is_some()
    }

    pub(crate) fn emit_progress(&self, progress: &P) {
        self.progress.emit(progress);
    }

    /// Deliver the buffered result of the run owning `control`.
    pub(crate) fn deliver(&self, control: &Rc<RunControl>) {
        if !self.detach(control) {
            return;
        }
        let pending = self.result.borrow_mut().take();
        let result = match pending {
            Some(result) => result,
            None if self.null_result_is_success.get() => OperationResult::success(O::default()),
            None => OperationResult::error(E::result_was_null()),
        };

        let kind = result.kind();
        self.state.set(match kind {
            ResultKind::Success => OperationState::Succeeded,
            ResultKind::Error => OperationState::Failed,
        });
        debug!(operation = %self.name, ?kind, "delivering result");

        match &result {
            OperationResult::Success(outputs) => self.success.emit(outputs),
            OperationResult::Error(errors) => self.error.emit(errors),
        }
    }

    /// End the run owning `control` without a result; report it unless suppressed.
    pub(crate) fn abort(&self, control: &Rc<RunControl>, suppressed: bool) {
        if !self.detach(control) {
            return;
        }
        self.result.borrow_mut().take();
        self.state.set(OperationState::Aborted);
        if !suppressed {
            self.error.emit(&E::aborted());
        }
    }

    /// Forget the live run if it is the one owning `control`.
    fn detach(&self, control: &Rc<RunControl>) -> bool {
        let mut run = self.run.borrow_mut();
        if run
            .as_ref()
            .is_some_and(|live| Rc::ptr_eq(&live.control, control))
        {
            *run = None;
            true
        } else {
            false
        }
    }
}
