//! Executor - 1 回の run を駆動する、スケジューラの slot
//!
//! # ライフサイクル（順番固定）
//! 1. 開始バリア待ち（バリアが無ければ即通過）
//! 2. body 実行（`Step::Yield` ごとに次の tick へ）
//! 3. 配送バリア待ち（バリアが無ければ即通過）
//! 4. 結果配送
//! 5. 破棄（slot を返却）
//!
//! 1〜4 は `StageFlags` で一度ずつしか処理されません。
//! 4 つ全てが済む前に登録簿から外されたら abort 扱いです。

use std::cell::Cell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::{debug, trace, warn};

use super::body::{Body, BodyContext, Launch, Step};
use super::handle::OperationInner;
use crate::domain::fault::Fault;
use crate::domain::payload::{ErrorPayload, OutputPayload, ProgressPayload};
use crate::domain::result::OperationResult;
use crate::domain::state::{Reclaim, Stage, StageFlags};
use crate::ports::{Slot, SlotStatus, Tick};

/// Barrier and cancellation flags of one run, shared by the operation handle
/// and its executor.
#[derive(Debug)]
pub(crate) struct RunControl {
    start_ordered: Cell<bool>,
    delivery_released: Cell<bool>,
    cancelled: Cell<bool>,
}

impl RunControl {
    pub(crate) fn new(hold_start: bool) -> Self {
        Self {
            start_ordered: Cell::new(!hold_start),
            delivery_released: Cell::new(true),
            cancelled: Cell::new(false),
        }
    }

    /// Returns `false` if the start was already ordered.
    pub(crate) fn order_start(&self) -> bool {
        !self.start_ordered.replace(true)
    }

    pub(crate) fn is_start_ordered(&self) -> bool {
        self.start_ordered.get()
    }

    pub(crate) fn hold_delivery(&self) {
        self.delivery_released.set(false);
    }

    pub(crate) fn release_delivery(&self) {
        self.delivery_released.set(true);
    }

    pub(crate) fn is_delivery_released(&self) -> bool {
        self.delivery_released.get()
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

pub(crate) struct Executor<O, E, P> {
    op: Rc<OperationInner<O, E, P>>,
    body: Box<dyn Body<O, E, P>>,
    launch: Launch,
    control: Rc<RunControl>,
    flags: StageFlags,
    /// Progress raised by the body and not yet emitted.
    progress: VecDeque<P>,
    label: String,
}

impl<O, E, P> Executor<O, E, P>
where
    O: OutputPayload,
    E: ErrorPayload,
    P: ProgressPayload,
{
    pub(crate) fn new(
        op: Rc<OperationInner<O, E, P>>,
        body: Box<dyn Body<O, E, P>>,
        launch: Launch,
        control: Rc<RunControl>,
    ) -> Self {
        let label = op.name().to_string();
        Self {
            op,
            body,
            launch,
            control,
            flags: StageFlags::default(),
            progress: VecDeque::new(),
            label,
        }
    }

    fn run_body(&mut self, tick: &Tick) -> Step {
        let mut progress = Vec::new();
        let outcome = {
            let mut cx = BodyContext::new(
                tick,
                &self.launch,
                &self.op,
                &self.control,
                &mut progress,
            );
            let body = &mut self.body;
            panic::catch_unwind(AssertUnwindSafe(|| body.poll(&mut cx)))
        };
        self.progress.extend(progress);

        match outcome {
            Ok(Ok(step)) => step,
            Ok(Err(fault)) => {
                self.capture(fault);
                Step::Done
            }
            Err(payload) => {
                self.capture(Fault::from_panic(payload));
                Step::Done
            }
        }
    }

    /// Emit buffered progress, oldest first.
    ///
    /// Subscribers run outside `catch_unwind`. If one panics, the rest of the
    /// batch stays buffered for the next poll.
    fn flush_progress(&mut self) {
        while let Some(progress) = self.progress.pop_front() {
            if self.control.is_cancelled() {
                self.progress.clear();
                return;
            }
            self.op.emit_progress(&progress);
        }
    }

    fn capture(&self, fault: Fault) {
        if self.control.is_cancelled() {
            return;
        }
        warn!(
            operation = %self.label,
            run = %self.launch.run_id,
            %fault,
            "body fault captured as exception error"
        );
        self.op.set_result(OperationResult::error(E::exception(fault)));
        self.control.release_delivery();
    }
}

impl<O, E, P> Slot for Executor<O, E, P>
where
    O: OutputPayload,
    E: ErrorPayload,
    P: ProgressPayload,
{
    fn label(&self) -> &str {
        &self.label
    }

    fn poll(&mut self, tick: &Tick) -> SlotStatus {
        self.flush_progress();
        loop {
            if self.control.is_cancelled() {
                return SlotStatus::Cancelled;
            }

            let stage = self.flags.current();
            match stage {
                Stage::AwaitingStartBarrier => {
                    if !self.control.is_start_ordered() {
                        return SlotStatus::Pending;
                    }
                }
                Stage::RunningBody => {
                    // 進捗を流す前に stage を確定させる
                    let step = self.run_body(tick);
                    if step == Step::Done {
                        self.flags.mark(stage);
                    }
                    self.flush_progress();
                    if step == Step::Yield {
                        return SlotStatus::Pending;
                    }
                    continue;
                }
                Stage::AwaitingDeliveryBarrier => {
                    if !self.control.is_delivery_released() {
                        return SlotStatus::Pending;
                    }
                }
                Stage::DeliveringResult => {
                    self.op.deliver(&self.control);
                }
                Stage::Destroyed => return SlotStatus::Finished,
            }

            self.flags.mark(stage);
            trace!(operation = %self.label, ?stage, frame = tick.frame, "stage processed");
        }
    }

    fn close(self: Box<Self>, reason: Reclaim) {
        if self.flags.is_completed() {
            return;
        }
        match reason {
            Reclaim::Destroyed => {
                debug!(
                    operation = %self.label,
                    stage = ?self.flags.current(),
                    "destroyed before completion, aborting"
                );
                self.op.abort(&self.control, false);
            }
            Reclaim::Shutdown => {
                debug!(
                    operation = %self.label,
                    stage = ?self.flags.current(),
                    "shutdown before completion, abort suppressed"
                );
                self.op.abort(&self.control, true);
            }
            Reclaim::Cancelled | Reclaim::Completed => {
                trace!(operation = %self.label, ?reason, "closed without delivery");
            }
        }
    }
}
