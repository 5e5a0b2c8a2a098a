//! Observability - スケジューラのカウンタ
//!
//! `FrameScheduler::counts()` がスナップショットを返します（JSON で出力可能）。

use serde::{Deserialize, Serialize};

use crate::domain::state::Reclaim;

/// Scheduler counters, for status output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerCounts {
    pub frame: u64,
    pub live: usize,
    pub acquired: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub destroyed: u64,
    pub shutdown: u64,
}

impl SchedulerCounts {
    pub(crate) fn record_close(&mut self, reason: Reclaim) {
        match reason {
            Reclaim::Completed => self.completed += 1,
            Reclaim::Cancelled => self.cancelled += 1,
            Reclaim::Destroyed => self.destroyed += 1,
            Reclaim::Shutdown => self.shutdown += 1,
        }
    }
}
