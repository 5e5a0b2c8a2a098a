//! Payload capability contracts (outputs / errors / progress).
//!
//! Payload types are open: callers define their own. The engine only needs
//! to build default values and to raise the three reserved error signals, so
//! that is all these traits ask for.

use serde::{Deserialize, Serialize};

use super::fault::Fault;

/// Success payload of an operation.
///
/// `Default` is used when a body finishes without a result and the
/// operation treats that as success.
pub trait OutputPayload: Default + 'static {}

/// The three signals the engine itself may raise on any error payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReservedErrors {
    /// An unhandled fault escaped the body.
    pub exception_error: bool,

    #[serde(skip)]
    pub exception_cause: Option<Fault>,

    /// The body finished without a result and null means error.
    pub result_was_null_error: bool,

    /// The executor was destroyed before its run completed.
    pub aborted_error: bool,
}

/// Error payload of an operation.
///
/// Implementors embed a [`ReservedErrors`] block and may add their own
/// fields next to it.
pub trait ErrorPayload: Default + 'static {
    fn reserved(&self) -> &ReservedErrors;

    fn reserved_mut(&mut self) -> &mut ReservedErrors;

    fn exception(cause: Fault) -> Self {
        let mut errors = Self::default();
        let reserved = errors.reserved_mut();
        reserved.exception_error = true;
        reserved.exception_cause = Some(cause);
        errors
    }

    fn result_was_null() -> Self {
        let mut errors = Self::default();
        errors.reserved_mut().result_was_null_error = true;
        errors
    }

    fn aborted() -> Self {
        let mut errors = Self::default();
        errors.reserved_mut().aborted_error = true;
        errors
    }

    fn is_exception_error(&self) -> bool {
        self.reserved().exception_error
    }

    fn exception_cause(&self) -> Option<&Fault> {
        self.reserved().exception_cause.as_ref()
    }

    fn is_result_was_null_error(&self) -> bool {
        self.reserved().result_was_null_error
    }

    fn is_aborted_error(&self) -> bool {
        self.reserved().aborted_error
    }
}

/// Progress payload of an operation.
pub trait ProgressPayload: 'static {
    fn from_value(value: f32) -> Self;
}

/// Base success payload: carries nothing, only "it succeeded".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutputs;

impl OutputPayload for OperationOutputs {}

/// Base error payload: exactly the reserved signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationErrors {
    #[serde(flatten)]
    pub reserved: ReservedErrors,
}

impl ErrorPayload for OperationErrors {
    fn reserved(&self) -> &ReservedErrors {
        &self.reserved
    }

    fn reserved_mut(&mut self) -> &mut ReservedErrors {
        &mut self.reserved
    }
}

/// Base progress payload: a single scalar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationProgress {
    pub value: f32,
}

impl ProgressPayload for OperationProgress {
    fn from_value(value: f32) -> Self {
        Self { value }
    }
}
