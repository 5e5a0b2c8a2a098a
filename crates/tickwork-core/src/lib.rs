//! tickwork-core
//!
//! Deferred operations driven by a single-threaded, frame-ticked scheduler.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, payload, result, fault, state, errors）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, Slot）
//! - **impls**: 実装（FrameScheduler）
//! - **operation**: 操作ハンドル・実行器・body・購読チャンネル・同期版
//! - **ops**: leaf operation（InvokeAfterDelay, InvokeAfterFrame, InvokeNextFrame, Delegate, Collective）
//! - **config**: スケジューラ設定（JSON）
//! - **observability**: カウンタ（status 出力用）
//!
//! # 流れ
//! 1. `Operation` を作って購読する
//! 2. `execute()` で executor がスケジューラの slot に載る
//! 3. ホストが `FrameScheduler::tick()` を毎フレーム呼ぶ
//! 4. body 完了後、バリアが開いていれば結果を一度だけ配送して slot を返す

pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod operation;
pub mod ops;
pub mod ports;

pub use config::{ConfigError, SchedulerConfig};
pub use domain::{
    ErrorPayload, Fault, OperationErrors, OperationOutputs, OperationProgress, OperationResult,
    OperationState, OutputPayload, ProgressPayload, TickworkError,
};
pub use impls::FrameScheduler;
pub use observability::SchedulerCounts;
pub use operation::{
    BasicContext, BasicOperation, Body, BodyContext, ImmediateOperation, Launch, Operation, Step,
};
