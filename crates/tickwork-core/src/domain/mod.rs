//! Domain model (ids, payloads, result, fault, state, errors).

pub mod errors;
pub mod fault;
pub mod ids;
pub mod payload;
pub mod result;
pub mod state;

pub use errors::TickworkError;
pub use fault::{Fault, FaultOrigin};
pub use ids::{OperationId, RunId, SlotId};
pub use payload::{
    ErrorPayload, OperationErrors, OperationOutputs, OperationProgress, OutputPayload,
    ProgressPayload, ReservedErrors,
};
pub use result::{OperationResult, ResultKind};
pub use state::{OperationState, Reclaim, Stage, StageFlags};
