//! Errors - 利用側のプログラミングエラー
//!
//! body 内の失敗は `Fault` → `exception-error` として配送されるので、ここには
//! 含まれません。ここにあるのは API の使い方の誤りだけです。

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TickworkError {
    #[error("operation '{operation}' is already executing")]
    AlreadyExecuting { operation: String },

    #[error("operation '{operation}' was already ordered to start")]
    StartAlreadyOrdered { operation: String },

    #[error("operation '{operation}' has no live executor")]
    NotRunning { operation: String },

    #[error("the scheduler that owned this operation is gone")]
    SchedulerUnavailable,

    #[error("the scheduler is shutting down")]
    SchedulerShutDown,

    #[error("scheduler slot limit reached (max_slots={limit})")]
    SlotLimitReached { limit: usize },

    #[error("tick() called re-entrantly from inside a tick")]
    ReentrantTick,
}
