//! Slot port - ホストスケジューラとの境界
//!
//! スケジューラは `Slot` を登録簿（registry）に保持し、tick ごとに一度だけ
//! `poll` します。登録簿から外すときは理由（`Reclaim`）付きで必ず一度だけ
//! `close` を呼びます。完了前に外された slot はそこで abort を報告できます。

use chrono::{DateTime, Utc};

use crate::domain::state::Reclaim;

/// One scheduler tick, as seen by a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Frame counter; the first tick is frame 1.
    pub frame: u64,

    /// Clock reading taken once at the start of the tick.
    pub now: DateTime<Utc>,
}

/// What a slot reports after being polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// Keep me; poll me again next tick.
    Pending,

    /// I reached my terminal stage.
    Finished,

    /// I was cancelled while being polled; drop me silently.
    Cancelled,
}

/// A schedulable unit of work that occupies one registry slot.
pub trait Slot {
    /// Human-readable name for diagnostics.
    fn label(&self) -> &str;

    /// Advance by one tick.
    fn poll(&mut self, tick: &Tick) -> SlotStatus;

    /// Called exactly once, when the slot leaves the registry.
    fn close(self: Box<Self>, reason: Reclaim);
}
