//! Fault - body が処理しきれなかった失敗の捕捉
//!
//! body が `Err(Fault)` を返した場合も panic した場合も、エンジンは
//! `Fault` に変換して `exception-error` として配送します。
//! スケジューラまで失敗が漏れることはありません。

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Where a fault came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOrigin {
    /// The body returned `Err(..)`.
    Returned,

    /// The body (or a leaf callback) panicked.
    Panicked,
}

/// Captured cause of an unhandled failure inside an operation body.
#[derive(Debug, Clone)]
pub struct Fault {
    message: String,
    origin: FaultOrigin,
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            origin: FaultOrigin::Returned,
            source: None,
        }
    }

    /// Wrap any error; its `Display` becomes the fault message.
    pub fn from_error<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: error.to_string(),
            origin: FaultOrigin::Returned,
            source: Some(Arc::new(error)),
        }
    }

    /// Build a fault from a `catch_unwind` payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with non-string payload".to_string()
        };
        Self {
            message,
            origin: FaultOrigin::Panicked,
            source: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn origin(&self) -> FaultOrigin {
        self.origin
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            FaultOrigin::Returned => write!(f, "{}", self.message),
            FaultOrigin::Panicked => write!(f, "panicked: {}", self.message),
        }
    }
}

impl StdError for Fault {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

// source は比較しない（dyn Error は PartialEq を持たない）
impl PartialEq for Fault {
    fn eq(&self, other: &Self) -> bool {
        self.message == other.message && self.origin == other.origin
    }
}
