//! InvokeNextFrame - 次のフレームでコールバック

use crate::domain::errors::TickworkError;
use crate::impls::frame_scheduler::FrameScheduler;
use crate::operation::{BasicContext, BasicOperation};

/// Builder for an operation that calls back on the first tick after `execute`.
pub struct InvokeNextFrame<F> {
    name: String,
    callback: F,
}

impl<F> InvokeNextFrame<F>
where
    F: FnMut() + 'static,
{
    pub const DEFAULT_NAME: &'static str = "InvokeNextFrame";

    pub fn new(callback: F) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            callback,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn build(self, scheduler: &FrameScheduler) -> BasicOperation {
        super::waiting_leaf(scheduler, self.name, self.callback, |cx: &BasicContext<'_>| {
            cx.frames_since_launch() > 0
        })
    }

    pub fn call(self, scheduler: &FrameScheduler) -> Result<BasicOperation, TickworkError> {
        let op = self.build(scheduler);
        op.execute()?;
        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::OperationState;
    use crate::ops::testing::{manual_scheduler, marker, outcomes};

    #[test]
    fn fires_on_the_next_tick() {
        let (scheduler, _clock) = manual_scheduler();
        let (hits, callback) = marker();
        let op = InvokeNextFrame::new(callback).call(&scheduler).unwrap();
        let events = outcomes(&op);
        assert_eq!(op.name(), "InvokeNextFrame");

        scheduler.tick().unwrap();
        assert_eq!(hits.get(), 1);
        assert_eq!(*events.borrow(), vec!["success"]);

        scheduler.tick().unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn scheduled_from_a_tick_fires_on_the_following_one() {
        let (scheduler, _clock) = manual_scheduler();
        let (hits, callback) = marker();
        let second = InvokeNextFrame::new(callback).name("second").build(&scheduler);

        let chained = second.clone();
        InvokeNextFrame::new(move || chained.execute().unwrap())
            .name("first")
            .call(&scheduler)
            .unwrap();

        scheduler.tick().unwrap();
        assert_eq!(hits.get(), 0);
        assert!(second.is_running());

        scheduler.tick().unwrap();
        assert_eq!(hits.get(), 1);
        assert_eq!(second.state(), OperationState::Succeeded);
    }

    #[test]
    fn cancel_before_the_tick_skips_the_callback() {
        let (scheduler, _clock) = manual_scheduler();
        let (hits, callback) = marker();
        let op = InvokeNextFrame::new(callback).call(&scheduler).unwrap();
        let events = outcomes(&op);

        op.cancel();
        scheduler.tick().unwrap();

        assert_eq!(hits.get(), 0);
        assert!(events.borrow().is_empty());
    }
}
