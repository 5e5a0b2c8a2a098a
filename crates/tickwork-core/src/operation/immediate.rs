//! ImmediateOperation - 同期版の操作
//!
//! スケジューラもバリアもキャンセルもありません。`execute()` の中で
//! 本体を最後まで実行し、戻る前に結果を配送します。

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

use super::channel::{Channel, SubscriptionId};
use crate::domain::fault::Fault;
use crate::domain::payload::{ErrorPayload, OutputPayload};
use crate::domain::result::OperationResult;

type Routine<O, E> = Box<dyn FnMut() -> Result<OperationResult<O, E>, Fault>>;

/// Synchronous operation: runs and delivers inside `execute`.
pub struct ImmediateOperation<O, E> {
    name: String,
    routine: RefCell<Routine<O, E>>,
    success: Channel<O>,
    error: Channel<E>,
}

impl<O, E> ImmediateOperation<O, E>
where
    O: OutputPayload,
    E: ErrorPayload,
{
    pub fn new<F>(name: impl Into<String>, routine: F) -> Self
    where
        F: FnMut() -> Result<OperationResult<O, E>, Fault> + 'static,
    {
        Self {
            name: name.into(),
            routine: RefCell::new(Box::new(routine)),
            success: Channel::new(),
            error: Channel::new(),
        }
    }

    /// Run the routine and deliver its result before returning.
    ///
    /// A routine that is already running (re-entrant `execute` from a
    /// subscriber of its own result is fine; from inside the routine it is not)
    /// is reported as an exception error.
    pub fn execute(&self) {
        let outcome = match self.routine.try_borrow_mut() {
            Ok(mut routine) => panic::catch_unwind(AssertUnwindSafe(|| (*routine)())),
            Err(_) => Ok(Err(Fault::new(format!(
                "operation '{}' executed from inside itself",
                self.name
            )))),
        };

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(fault)) => self.capture(fault),
            Err(payload) => self.capture(Fault::from_panic(payload)),
        };

        match &result {
            OperationResult::Success(outputs) => self.success.emit(outputs),
            OperationResult::Error(errors) => self.error.emit(errors),
        }
    }

    fn capture(&self, fault: Fault) -> OperationResult<O, E> {
        warn!(operation = %self.name, %fault, "routine fault captured as exception error");
        OperationResult::error(E::exception(fault))
    }

    pub fn on_success(&self, handler: impl Fn(&O) + 'static) -> SubscriptionId {
        self.success.subscribe(handler)
    }

    pub fn on_error(&self, handler: impl Fn(&E) + 'static) -> SubscriptionId {
        self.error.subscribe(handler)
    }

    pub fn success_channel(&self) -> &Channel<O> {
        &self.success
    }

    pub fn error_channel(&self) -> &Channel<E> {
        &self.error
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<O, E> fmt::Debug for ImmediateOperation<O, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImmediateOperation")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payload::{OperationErrors, OperationOutputs};
    use std::cell::Cell;
    use std::rc::Rc;

    type Basic = ImmediateOperation<OperationOutputs, OperationErrors>;

    #[test]
    fn delivers_before_execute_returns() {
        let op = Basic::new("sum", || Ok(OperationResult::success(OperationOutputs)));
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        op.on_success(move |_| h.set(h.get() + 1));
        let e = Rc::clone(&hits);
        op.on_error(move |_| e.set(e.get() + 100));

        op.execute();
        assert_eq!(hits.get(), 1);

        op.execute();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn explicit_error_goes_to_error_channel_only() {
        let op = Basic::new("deny", || Ok(OperationResult::error(OperationErrors::default())));
        let errors = Rc::new(Cell::new(0));
        let e = Rc::clone(&errors);
        op.on_error(move |err| {
            assert!(!err.is_exception_error());
            e.set(e.get() + 1);
        });
        op.on_success(|_| panic!("success must not fire"));

        op.execute();
        assert_eq!(errors.get(), 1);
    }

    #[test]
    fn returned_fault_becomes_exception_error() {
        let op = Basic::new("parse", || Err(Fault::new("bad header")));
        let cause = Rc::new(RefCell::new(None));
        let c = Rc::clone(&cause);
        op.on_error(move |err| *c.borrow_mut() = err.exception_cause().cloned());

        op.execute();
        assert_eq!(*cause.borrow(), Some(Fault::new("bad header")));
    }

    #[test]
    fn panic_becomes_exception_error() {
        let op = Basic::new("explode", || panic!("kaboom"));
        let seen = Rc::new(Cell::new(false));
        let s = Rc::clone(&seen);
        op.on_error(move |err| {
            assert!(err.is_exception_error());
            assert_eq!(err.exception_cause().unwrap().message(), "kaboom");
            s.set(true);
        });

        op.execute();
        assert!(seen.get());
    }
}
