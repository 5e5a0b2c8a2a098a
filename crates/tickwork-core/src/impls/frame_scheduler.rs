//! FrameScheduler - フレーム駆動のホストスケジューラ
//!
//! # 実装詳細
//! - `BTreeMap<SlotId, Box<dyn Slot>>` を登録簿（arena）として使う
//! - SlotId は連番なので、キー順 = 作成順 = tick 内のポーリング順
//! - ポーリング中の slot は登録簿から一時的に取り出す。
//!   その間に届いた解放要求は `deferred` に積み、poll が返ってから処理する
//!   （複数届いたら最初の要求が勝つ。shutdown も同じ）
//! - poll が panic で巻き戻った場合、slot は登録簿に戻す（close されないまま
//!   捨てない）
//! - RefCell の借用を保持したまま slot のコールバックを呼ばない
//!   （コールバック内から acquire / release が再入してくるため）
//!
//! # 使用例
//! ```ignore
//! let scheduler = FrameScheduler::new(SchedulerConfig::default());
//! let op = InvokeAfterFrame::new(|| println!("hi")).frames(3).call(&scheduler)?;
//! for _ in 0..3 {
//!     scheduler.tick()?;
//! }
//! ```

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use crate::config::SchedulerConfig;
use crate::domain::errors::TickworkError;
use crate::domain::ids::{OperationId, RunId, SlotId};
use crate::domain::state::Reclaim;
use crate::observability::SchedulerCounts;
use crate::ports::{Clock, IdGenerator, Slot, SlotStatus, SystemClock, Tick, UlidGenerator};

/// Frame-driven host scheduler: a registry of in-flight slots.
///
/// The host calls [`FrameScheduler::tick`] once per frame. Dropping the
/// scheduler is treated as process shutdown.
pub struct FrameScheduler {
    core: Rc<SchedulerCore>,
}

pub(crate) struct SchedulerCore {
    config: SchedulerConfig,
    clock: Rc<dyn Clock>,
    ids: UlidGenerator<Rc<dyn Clock>>,
    frame: Cell<u64>,
    next_slot: Cell<u64>,
    slots: RefCell<BTreeMap<SlotId, Box<dyn Slot>>>,
    /// The slot currently taken out of `slots` for polling.
    in_flight: Cell<Option<SlotId>>,
    /// Release requested for the in-flight slot.
    deferred: Cell<Option<Reclaim>>,
    /// Releases deferred for slots whose poll unwound.
    unwound: RefCell<Vec<(SlotId, Reclaim)>>,
    ticking: Cell<bool>,
    shutting_down: Cell<bool>,
    counts: RefCell<SchedulerCounts>,
}

impl FrameScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }

    pub fn with_clock(config: SchedulerConfig, clock: impl Clock + 'static) -> Self {
        let clock: Rc<dyn Clock> = Rc::new(clock);
        Self {
            core: Rc::new(SchedulerCore {
                config,
                ids: UlidGenerator::new(Rc::clone(&clock)),
                clock,
                frame: Cell::new(0),
                next_slot: Cell::new(1),
                slots: RefCell::new(BTreeMap::new()),
                in_flight: Cell::new(None),
                deferred: Cell::new(None),
                unwound: RefCell::new(Vec::new()),
                ticking: Cell::new(false),
                shutting_down: Cell::new(false),
                counts: RefCell::new(SchedulerCounts::default()),
            }),
        }
    }

    /// Advance one frame, polling every slot that was live when the tick began.
    ///
    /// Returns the new frame number.
    pub fn tick(&self) -> Result<u64, TickworkError> {
        self.core.tick()
    }

    /// Register a slot; it is first polled on the next tick.
    pub fn acquire(&self, slot: Box<dyn Slot>) -> Result<SlotId, TickworkError> {
        self.core.acquire(slot)
    }

    /// Remove one slot out of band. Returns `false` if it is not live.
    ///
    /// A slot that had not completed reports an abort from its `close`.
    pub fn destroy(&self, slot: SlotId) -> bool {
        self.core.release(slot, Reclaim::Destroyed)
    }

    /// Ordinary teardown: destroy every live slot.
    pub fn destroy_all(&self) {
        self.core.destroy_all();
    }

    /// Process-wide shutdown: every slot closes with abort suppressed, and
    /// nothing can be acquired afterwards.
    pub fn shutdown(&self) {
        self.core.shutdown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.core.shutting_down.get()
    }

    pub fn frame(&self) -> u64 {
        self.core.frame()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.core.now()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.core.config
    }

    pub fn live_slots(&self) -> usize {
        self.core.live_slots()
    }

    pub fn contains(&self, slot: SlotId) -> bool {
        self.core.in_flight.get() == Some(slot) || self.core.slots.borrow().contains_key(&slot)
    }

    pub fn counts(&self) -> SchedulerCounts {
        let mut counts = self.core.counts.borrow().clone();
        counts.frame = self.core.frame();
        counts.live = self.core.live_slots();
        counts
    }

    pub(crate) fn downgrade(&self) -> Weak<SchedulerCore> {
        Rc::downgrade(&self.core)
    }

    pub(crate) fn core(&self) -> &SchedulerCore {
        &self.core
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}

/// Resets the tick bookkeeping even if a subscriber panics mid-poll.
struct TickGuard<'a>(&'a SchedulerCore);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.set(None);
        self.0.deferred.set(None);
        self.0.ticking.set(false);
    }
}

/// The slot being polled.
///
/// If the poll unwinds (a subscriber panicked), the slot goes back into the
/// registry, and a release requested during that poll is applied on the next
/// scheduler call.
struct InFlight<'a> {
    core: &'a SchedulerCore,
    id: SlotId,
    slot: Option<Box<dyn Slot>>,
}

impl<'a> InFlight<'a> {
    fn enter(core: &'a SchedulerCore, id: SlotId, slot: Box<dyn Slot>) -> Self {
        core.in_flight.set(Some(id));
        Self {
            core,
            id,
            slot: Some(slot),
        }
    }

    fn poll(&mut self, tick: &Tick) -> SlotStatus {
        match self.slot.as_mut() {
            Some(slot) => slot.poll(tick),
            None => SlotStatus::Pending,
        }
    }

    fn leave(mut self) -> Option<Box<dyn Slot>> {
        self.core.in_flight.set(None);
        self.slot.take()
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        let core = self.core;
        core.in_flight.set(None);
        warn!(slot = %self.id, label = slot.label(), "poll unwound, slot kept");
        core.slots.borrow_mut().insert(self.id, slot);
        if let Some(reason) = core.deferred.take() {
            core.unwound.borrow_mut().push((self.id, reason));
        }
    }
}

impl SchedulerCore {
    pub(crate) fn frame(&self) -> u64 {
        self.frame.get()
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn generate_operation_id(&self) -> OperationId {
        self.ids.generate_operation_id()
    }

    pub(crate) fn generate_run_id(&self) -> RunId {
        self.ids.generate_run_id()
    }

    fn live_slots(&self) -> usize {
        self.slots.borrow().len() + usize::from(self.in_flight.get().is_some())
    }

    fn tick(&self) -> Result<u64, TickworkError> {
        if self.ticking.get() {
            return Err(TickworkError::ReentrantTick);
        }
        self.apply_unwound_releases();
        if self.shutting_down.get() {
            return Err(TickworkError::SchedulerShutDown);
        }
        self.ticking.set(true);
        let _guard = TickGuard(self);

        let frame = self.frame.get() + 1;
        self.frame.set(frame);
        let tick = Tick {
            frame,
            now: self.clock.now(),
        };

        // tick 開始時点の slot だけを対象にする（途中で増えた分は次の tick から）
        let ids: Vec<SlotId> = self.slots.borrow().keys().copied().collect();
        trace!(frame, slots = ids.len(), "tick");

        for id in ids {
            let taken = self.slots.borrow_mut().remove(&id);
            let Some(slot) = taken else {
                // この tick の途中で解放済み
                continue;
            };

            let mut in_flight = InFlight::enter(self, id, slot);
            let status = in_flight.poll(&tick);
            let Some(slot) = in_flight.leave() else {
                continue;
            };

            let reason = match (self.deferred.take(), status) {
                (Some(reason), _) => reason,
                (None, SlotStatus::Pending) => {
                    self.slots.borrow_mut().insert(id, slot);
                    continue;
                }
                (None, SlotStatus::Finished) => Reclaim::Completed,
                (None, SlotStatus::Cancelled) => Reclaim::Cancelled,
            };
            self.close(id, slot, reason);
        }

        Ok(frame)
    }

    pub(crate) fn acquire(&self, slot: Box<dyn Slot>) -> Result<SlotId, TickworkError> {
        if self.shutting_down.get() {
            return Err(TickworkError::SchedulerShutDown);
        }
        if let Some(limit) = self.config.max_slots
            && self.live_slots() >= limit
        {
            return Err(TickworkError::SlotLimitReached { limit });
        }

        let id = SlotId::new(self.next_slot.get());
        self.next_slot.set(id.get() + 1);
        debug!(slot = %id, label = slot.label(), frame = self.frame(), "slot acquired");

        self.slots.borrow_mut().insert(id, slot);
        self.counts.borrow_mut().acquired += 1;
        Ok(id)
    }

    pub(crate) fn release(&self, id: SlotId, reason: Reclaim) -> bool {
        if self.in_flight.get() == Some(id) {
            // 最初の要求を優先（cancel の後の destroy で abort しない）
            if self.deferred.get().is_none() {
                self.deferred.set(Some(reason));
            }
            return true;
        }

        let removed = self.slots.borrow_mut().remove(&id);
        match removed {
            Some(slot) => {
                self.close(id, slot, reason);
                true
            }
            None => false,
        }
    }

    fn destroy_all(&self) {
        self.apply_unwound_releases();
        if let Some(id) = self.in_flight.get() {
            self.release(id, Reclaim::Destroyed);
        }
        let ids: Vec<SlotId> = self.slots.borrow().keys().copied().collect();
        for id in ids {
            self.release(id, Reclaim::Destroyed);
        }
    }

    fn shutdown(&self) {
        self.apply_unwound_releases();
        if self.shutting_down.replace(true) {
            return;
        }
        debug!(frame = self.frame(), live = self.live_slots(), "scheduler shutting down");

        // 先に届いた解放要求（cancel / destroy）を優先する
        if self.in_flight.get().is_some() && self.deferred.get().is_none() {
            self.deferred.set(Some(Reclaim::Shutdown));
        }
        let drained = std::mem::take(&mut *self.slots.borrow_mut());
        for (id, slot) in drained {
            self.close(id, slot, Reclaim::Shutdown);
        }
    }

    /// Apply releases that were deferred for a slot whose poll unwound.
    fn apply_unwound_releases(&self) {
        let pending = std::mem::take(&mut *self.unwound.borrow_mut());
        for (id, reason) in pending {
            self.release(id, reason);
        }
    }

    fn close(&self, id: SlotId, slot: Box<dyn Slot>, reason: Reclaim) {
        self.counts.borrow_mut().record_close(reason);
        debug!(slot = %id, label = slot.label(), ?reason, "slot closed");
        slot.close(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ManualClock;
    use chrono::TimeZone;
    use std::panic::{self, AssertUnwindSafe};

    type Log = Rc<RefCell<Vec<String>>>;

    /// Records every poll / close; finishes after `polls_left` polls.
    struct ProbeSlot {
        name: String,
        polls_left: u32,
        log: Log,
    }

    impl ProbeSlot {
        fn boxed(name: &str, polls_left: u32, log: &Log) -> Box<dyn Slot> {
            Box::new(Self {
                name: name.to_string(),
                polls_left,
                log: Rc::clone(log),
            })
        }
    }

    impl Slot for ProbeSlot {
        fn label(&self) -> &str {
            &self.name
        }

        fn poll(&mut self, tick: &Tick) -> SlotStatus {
            self.log
                .borrow_mut()
                .push(format!("{}@{}", self.name, tick.frame));
            self.polls_left = self.polls_left.saturating_sub(1);
            if self.polls_left == 0 {
                SlotStatus::Finished
            } else {
                SlotStatus::Pending
            }
        }

        fn close(self: Box<Self>, reason: Reclaim) {
            self.log
                .borrow_mut()
                .push(format!("{}:{:?}", self.name, reason));
        }
    }

    /// Runs a closure against the scheduler from inside its poll.
    struct HookSlot {
        scheduler: Weak<SchedulerCore>,
        hook: Box<dyn FnMut(&SchedulerCore)>,
    }

    impl Slot for HookSlot {
        fn label(&self) -> &str {
            "hook"
        }

        fn poll(&mut self, _tick: &Tick) -> SlotStatus {
            if let Some(core) = self.scheduler.upgrade() {
                (self.hook)(&core);
            }
            SlotStatus::Pending
        }

        fn close(self: Box<Self>, _reason: Reclaim) {}
    }

    fn log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn slots_are_polled_in_creation_order() {
        let scheduler = FrameScheduler::default();
        let log = log();
        scheduler.acquire(ProbeSlot::boxed("a", 2, &log)).unwrap();
        scheduler.acquire(ProbeSlot::boxed("b", 1, &log)).unwrap();

        assert_eq!(scheduler.tick().unwrap(), 1);
        assert_eq!(scheduler.tick().unwrap(), 2);

        assert_eq!(
            *log.borrow(),
            vec!["a@1", "b@1", "b:Completed", "a@2", "a:Completed"]
        );
        assert_eq!(scheduler.live_slots(), 0);
    }

    #[test]
    fn slot_acquired_during_tick_starts_next_tick() {
        let scheduler = FrameScheduler::default();
        let log = log();
        let inner_log = Rc::clone(&log);
        let mut spawned = false;
        scheduler
            .acquire(Box::new(HookSlot {
                scheduler: scheduler.downgrade(),
                hook: Box::new(move |core| {
                    if !spawned {
                        spawned = true;
                        core.acquire(ProbeSlot::boxed("late", 1, &inner_log))
                            .unwrap();
                    }
                }),
            }))
            .unwrap();

        scheduler.tick().unwrap();
        assert!(log.borrow().is_empty());

        scheduler.tick().unwrap();
        assert_eq!(*log.borrow(), vec!["late@2", "late:Completed"]);
    }

    #[test]
    fn destroy_closes_with_destroyed() {
        let scheduler = FrameScheduler::default();
        let log = log();
        let id = scheduler.acquire(ProbeSlot::boxed("a", 5, &log)).unwrap();

        assert!(scheduler.contains(id));
        assert!(scheduler.destroy(id));
        assert!(!scheduler.destroy(id));
        assert!(!scheduler.contains(id));
        assert_eq!(*log.borrow(), vec!["a:Destroyed"]);
        assert_eq!(scheduler.counts().destroyed, 1);
    }

    #[test]
    fn release_of_in_flight_slot_is_deferred_until_poll_returns() {
        let scheduler = FrameScheduler::default();
        let id = Rc::new(Cell::new(None));
        let seen = Rc::clone(&id);
        let contains_during_poll = Rc::new(Cell::new(false));
        let flag = Rc::clone(&contains_during_poll);
        let slot = scheduler
            .acquire(Box::new(HookSlot {
                scheduler: scheduler.downgrade(),
                hook: Box::new(move |core| {
                    let me = seen.get().unwrap();
                    assert!(core.release(me, Reclaim::Cancelled));
                    flag.set(core.in_flight.get() == Some(me));
                }),
            }))
            .unwrap();
        id.set(Some(slot));

        scheduler.tick().unwrap();
        assert!(contains_during_poll.get());
        assert!(!scheduler.contains(slot));
        assert_eq!(scheduler.counts().cancelled, 1);
    }

    #[test]
    fn panicking_poll_keeps_the_slot_registered() {
        let scheduler = FrameScheduler::default();
        let polls = Rc::new(Cell::new(0));
        let p = Rc::clone(&polls);
        let slot = scheduler
            .acquire(Box::new(HookSlot {
                scheduler: scheduler.downgrade(),
                hook: Box::new(move |_| {
                    p.set(p.get() + 1);
                    if p.get() == 1 {
                        panic!("subscriber failed");
                    }
                }),
            }))
            .unwrap();

        let unwound = panic::catch_unwind(AssertUnwindSafe(|| scheduler.tick()));
        assert!(unwound.is_err());
        assert!(scheduler.contains(slot));
        assert_eq!(scheduler.live_slots(), 1);

        scheduler.tick().unwrap();
        assert_eq!(polls.get(), 2);
        assert!(scheduler.destroy(slot));
    }

    #[test]
    fn release_requested_before_an_unwind_is_applied_later() {
        let scheduler = FrameScheduler::default();
        let id = Rc::new(Cell::new(None));
        let seen = Rc::clone(&id);
        let polls = Rc::new(Cell::new(0));
        let p = Rc::clone(&polls);
        let slot = scheduler
            .acquire(Box::new(HookSlot {
                scheduler: scheduler.downgrade(),
                hook: Box::new(move |core| {
                    p.set(p.get() + 1);
                    core.release(seen.get().unwrap(), Reclaim::Destroyed);
                    panic!("subscriber failed");
                }),
            }))
            .unwrap();
        id.set(Some(slot));

        let unwound = panic::catch_unwind(AssertUnwindSafe(|| scheduler.tick()));
        assert!(unwound.is_err());

        scheduler.tick().unwrap();
        assert!(!scheduler.contains(slot));
        assert_eq!(polls.get(), 1);
        assert_eq!(scheduler.counts().destroyed, 1);
    }

    #[test]
    fn shutdown_does_not_override_an_earlier_release() {
        let scheduler = FrameScheduler::default();
        let id = Rc::new(Cell::new(None));
        let seen = Rc::clone(&id);
        let slot = scheduler
            .acquire(Box::new(HookSlot {
                scheduler: scheduler.downgrade(),
                hook: Box::new(move |core| {
                    core.release(seen.get().unwrap(), Reclaim::Cancelled);
                    core.shutdown();
                }),
            }))
            .unwrap();
        id.set(Some(slot));

        scheduler.tick().unwrap();

        let counts = scheduler.counts();
        assert_eq!(counts.cancelled, 1);
        assert_eq!(counts.shutdown, 0);
        assert!(scheduler.is_shut_down());
    }

    #[test]
    fn reentrant_tick_is_refused() {
        let scheduler = FrameScheduler::default();
        let result = Rc::new(RefCell::new(None));
        let out = Rc::clone(&result);
        scheduler
            .acquire(Box::new(HookSlot {
                scheduler: scheduler.downgrade(),
                hook: Box::new(move |core| {
                    *out.borrow_mut() = Some(core.tick());
                }),
            }))
            .unwrap();

        scheduler.tick().unwrap();
        assert_eq!(
            *result.borrow(),
            Some(Err(TickworkError::ReentrantTick))
        );
        // 再入拒否の後も通常の tick は続けられる
        assert_eq!(scheduler.tick().unwrap(), 2);
    }

    #[test]
    fn shutdown_closes_everything_and_refuses_new_slots() {
        let scheduler = FrameScheduler::default();
        let log = log();
        scheduler.acquire(ProbeSlot::boxed("a", 5, &log)).unwrap();
        scheduler.acquire(ProbeSlot::boxed("b", 5, &log)).unwrap();

        scheduler.shutdown();

        assert_eq!(*log.borrow(), vec!["a:Shutdown", "b:Shutdown"]);
        assert!(scheduler.is_shut_down());
        assert_eq!(
            scheduler.acquire(ProbeSlot::boxed("c", 1, &log)).unwrap_err(),
            TickworkError::SchedulerShutDown
        );
        assert_eq!(
            scheduler.tick().unwrap_err(),
            TickworkError::SchedulerShutDown
        );
    }

    #[test]
    fn dropping_the_scheduler_is_a_shutdown() {
        let log = log();
        {
            let scheduler = FrameScheduler::default();
            scheduler.acquire(ProbeSlot::boxed("a", 5, &log)).unwrap();
        }
        assert_eq!(*log.borrow(), vec!["a:Shutdown"]);
    }

    #[test]
    fn destroy_all_destroys_each_slot() {
        let scheduler = FrameScheduler::default();
        let log = log();
        scheduler.acquire(ProbeSlot::boxed("a", 5, &log)).unwrap();
        scheduler.acquire(ProbeSlot::boxed("b", 5, &log)).unwrap();

        scheduler.destroy_all();

        assert_eq!(*log.borrow(), vec!["a:Destroyed", "b:Destroyed"]);
        assert_eq!(scheduler.live_slots(), 0);
        // destroy_all は shutdown ではない
        scheduler.acquire(ProbeSlot::boxed("c", 1, &log)).unwrap();
    }

    #[test]
    fn max_slots_limits_live_slots() {
        let scheduler = FrameScheduler::new(SchedulerConfig::default().with_max_slots(1));
        let log = log();
        scheduler.acquire(ProbeSlot::boxed("a", 1, &log)).unwrap();

        let err = scheduler
            .acquire(ProbeSlot::boxed("b", 1, &log))
            .unwrap_err();
        assert_eq!(err, TickworkError::SlotLimitReached { limit: 1 });

        scheduler.tick().unwrap();
        scheduler.acquire(ProbeSlot::boxed("b", 1, &log)).unwrap();
    }

    #[test]
    fn now_follows_the_injected_clock() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        let scheduler = FrameScheduler::with_clock(SchedulerConfig::default(), clock.clone());

        clock.advance(chrono::Duration::seconds(2));
        assert_eq!(scheduler.now(), start + chrono::Duration::seconds(2));

        let counts = scheduler.counts();
        assert_eq!(counts.frame, 0);
        assert_eq!(counts.live, 0);
    }
}
