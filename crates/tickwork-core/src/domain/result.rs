//! Operation result: exactly one of outputs or errors.

use serde::{Deserialize, Serialize};

/// Which channel a result is delivered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Success,
    Error,
}

/// The buffered result of one run.
///
/// A sum type: a result holding both payloads, or neither, cannot be built.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult<O, E> {
    Success(O),
    Error(E),
}

impl<O, E> OperationResult<O, E> {
    pub fn success(outputs: O) -> Self {
        Self::Success(outputs)
    }

    pub fn error(errors: E) -> Self {
        Self::Error(errors)
    }

    pub fn kind(&self) -> ResultKind {
        match self {
            Self::Success(_) => ResultKind::Success,
            Self::Error(_) => ResultKind::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn outputs(&self) -> Option<&O> {
        match self {
            Self::Success(o) => Some(o),
            Self::Error(_) => None,
        }
    }

    pub fn errors(&self) -> Option<&E> {
        match self {
            Self::Success(_) => None,
            Self::Error(e) => Some(e),
        }
    }
}

impl<O, E> From<OperationResult<O, E>> for Result<O, E> {
    fn from(result: OperationResult<O, E>) -> Self {
        match result {
            OperationResult::Success(o) => Ok(o),
            OperationResult::Error(e) => Err(e),
        }
    }
}
