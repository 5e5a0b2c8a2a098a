//! Operation - 遅延実行される操作と、その実行器
//!
//! # 構成
//! - **handle**: 呼び出し側が持つ `Operation`（execute / cancel / バリア / 購読）
//! - **executor**: 1 回の run を駆動する slot（スケジューラに登録される）
//! - **body**: tick ごとに poll される本体と、その `BodyContext`
//! - **channel**: success / error / progress の購読者リスト
//! - **immediate**: スケジューラを使わない同期版

pub mod body;
pub mod channel;
pub(crate) mod executor;
pub mod handle;
pub mod immediate;

pub use self::body::{BasicContext, Body, BodyContext, Launch, Step};
pub use self::channel::{Channel, SubscriptionId};
pub use self::handle::{BasicOperation, Operation};
pub use self::immediate::ImmediateOperation;
