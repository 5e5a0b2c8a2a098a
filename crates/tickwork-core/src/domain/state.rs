//! State - Operation と Executor の状態
//!
//! # Operation の状態遷移
//! - Idle → Running → Succeeded / Failed
//! - Running → Cancelled（呼び出し側の cancel、通知なし）
//! - Running → Aborted（外部からの破棄、error チャンネルで通知）
//!
//! 完了後は再度 execute できます（Running に戻る）。

use serde::{Deserialize, Serialize};

/// Caller-visible state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Never executed.
    Idle,

    /// An executor is live for the current run.
    Running,

    /// Last run delivered through the success channel.
    Succeeded,

    /// Last run delivered through the error channel.
    Failed,

    /// Last run was cancelled by the caller (nothing delivered).
    Cancelled,

    /// Last run's executor was destroyed before it completed.
    Aborted,
}

impl OperationState {
    /// Is this a terminal state for the last run?
    pub fn is_terminal(self) -> bool {
        !matches!(self, OperationState::Idle | OperationState::Running)
    }
}

/// Executor lifecycle stage.
///
/// Stages run strictly in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    AwaitingStartBarrier,
    RunningBody,
    AwaitingDeliveryBarrier,
    DeliveringResult,
    Destroyed,
}

/// The four "processed" flags of an executor.
///
/// Each stage is marked exactly once; marking out of order is refused, so a
/// stage can never be processed twice or skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageFlags {
    start_barrier: bool,
    body: bool,
    delivery_barrier: bool,
    delivery: bool,
}

impl StageFlags {
    /// The first stage whose flag is not yet set.
    pub fn current(&self) -> Stage {
        if !self.start_barrier {
            Stage::AwaitingStartBarrier
        } else if !self.body {
            Stage::RunningBody
        } else if !self.delivery_barrier {
            Stage::AwaitingDeliveryBarrier
        } else if !self.delivery {
            Stage::DeliveringResult
        } else {
            Stage::Destroyed
        }
    }

    /// Mark `stage` as processed. Returns `false` if it is not the current stage.
    pub fn mark(&mut self, stage: Stage) -> bool {
        if stage != self.current() {
            return false;
        }
        match stage {
            Stage::AwaitingStartBarrier => self.start_barrier = true,
            Stage::RunningBody => self.body = true,
            Stage::AwaitingDeliveryBarrier => self.delivery_barrier = true,
            Stage::DeliveringResult => self.delivery = true,
            Stage::Destroyed => return false,
        }
        true
    }

    /// All four flags set.
    pub fn is_completed(&self) -> bool {
        self.start_barrier && self.body && self.delivery_barrier && self.delivery
    }
}

/// Why a slot left the scheduler registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reclaim {
    /// The slot reported it finished on its own.
    Completed,

    /// The owning operation asked for a silent teardown.
    Cancelled,

    /// The host removed the slot out of band (teardown of its context).
    Destroyed,

    /// The whole process is shutting down.
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn stages_advance_in_order() {
        let mut flags = StageFlags::default();
        assert_eq!(flags.current(), Stage::AwaitingStartBarrier);

        assert!(flags.mark(Stage::AwaitingStartBarrier));
        assert_eq!(flags.current(), Stage::RunningBody);
        assert!(flags.mark(Stage::RunningBody));
        assert!(flags.mark(Stage::AwaitingDeliveryBarrier));
        assert!(!flags.is_completed());
        assert!(flags.mark(Stage::DeliveringResult));

        assert!(flags.is_completed());
        assert_eq!(flags.current(), Stage::Destroyed);
    }

    #[rstest]
    #[case::skip_start(Stage::RunningBody)]
    #[case::skip_to_delivery(Stage::DeliveringResult)]
    #[case::destroyed(Stage::Destroyed)]
    fn out_of_order_mark_is_refused(#[case] stage: Stage) {
        let mut flags = StageFlags::default();
        assert!(!flags.mark(stage));
        assert_eq!(flags, StageFlags::default());
    }

    #[test]
    fn stage_cannot_be_processed_twice() {
        let mut flags = StageFlags::default();
        assert!(flags.mark(Stage::AwaitingStartBarrier));
        assert!(!flags.mark(Stage::AwaitingStartBarrier));
    }

    #[rstest]
    #[case(OperationState::Idle, false)]
    #[case(OperationState::Running, false)]
    #[case(OperationState::Succeeded, true)]
    #[case(OperationState::Failed, true)]
    #[case(OperationState::Cancelled, true)]
    #[case(OperationState::Aborted, true)]
    fn terminal_states(#[case] state: OperationState, #[case] terminal: bool) {
        assert_eq!(state.is_terminal(), terminal);
    }
}
