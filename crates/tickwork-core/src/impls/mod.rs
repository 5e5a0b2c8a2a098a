//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **FrameScheduler**: フレーム駆動のホストスケジューラ（slot の登録簿）
//!
//! 時計と ID 生成の実装は ports 側（`SystemClock`, `ManualClock`, `UlidGenerator`）にあります。

pub mod frame_scheduler;

pub use self::frame_scheduler::FrameScheduler;
