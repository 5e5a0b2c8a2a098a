//! Ports - 抽象化レイヤー
//!
//! エンジンが外部（ホストの時計・ID 生成・スケジューラ）に依存する箇所を
//! trait として切り出しています。

pub mod clock;
pub mod id_generator;
pub mod slot;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::slot::{Slot, SlotStatus, Tick};
