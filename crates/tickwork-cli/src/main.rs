use std::cell::Cell;
use std::error::Error;
use std::rc::Rc;

use serde::Serialize;
use tickwork_core::ops::{Delegate, InvokeAfterDelay, InvokeAfterFrame, InvokeNextFrame};
use tickwork_core::{
    BasicContext, BasicOperation, ErrorPayload, Fault, FrameScheduler, ImmediateOperation,
    Launch, OperationErrors, OperationOutputs, OperationResult, OperationState,
    SchedulerConfig, SchedulerCounts, Step,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// loader が届かないときのフレーム上限
const MAX_FRAMES: u64 = 600;

/// 終了時に標準出力へ出す JSON
#[derive(Debug, Serialize)]
struct Report {
    loader: OperationState,
    doomed: OperationState,
    counts: SchedulerCounts,
}

/// loader: 5 フレームかけて進捗を出し、配送バリアを掛けたまま完了する
fn loader(scheduler: &FrameScheduler) -> BasicOperation {
    Delegate::new(|_: &Launch| {
        |cx: &mut BasicContext<'_>| -> Result<Step, Fault> {
            if cx.frames_since_launch() == 1 {
                cx.hold_delivery();
            }
            let done = cx.frames_since_launch().min(5);
            cx.notify_progress_value(done as f32 / 5.0);
            if done < 5 {
                return Ok(Step::Yield);
            }
            cx.succeed(OperationOutputs);
            Ok(Step::Done)
        }
    })
    .name("loader")
    .build(scheduler)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // (A) 設定（引数があれば JSON ファイルから）
    let config = match std::env::args().nth(1) {
        Some(path) => SchedulerConfig::load(path)?,
        None => SchedulerConfig::default(),
    };
    let interval = config.tick_interval();
    let scheduler = FrameScheduler::new(config);

    // (B) 同期版：その場で配送される
    let check = ImmediateOperation::<OperationOutputs, OperationErrors>::new("preflight", || {
        Ok(OperationResult::success(OperationOutputs))
    });
    check.on_success(|_| info!("preflight ok"));
    check.execute();

    // (C) loader の結果は gate が開くまで届かない
    let loader = loader(&scheduler);
    loader.on_progress(|p| info!(progress = p.value, "loader progress"));
    let loaded = Rc::new(Cell::new(false));
    let l = Rc::clone(&loaded);
    loader.on_success(move |_| {
        info!("loader delivered");
        l.set(true);
    });
    loader.execute()?;

    let held = loader.clone();
    InvokeAfterDelay::new(move || {
        if let Err(err) = held.release_delivery_barrier() {
            warn!(%err, "gate could not release loader");
        }
    })
    .name("gate")
    .seconds(0.2)
    .call(&scheduler)?;

    InvokeNextFrame::new(|| info!("first frame")).call(&scheduler)?;
    InvokeAfterFrame::new(|| info!("three frames later"))
        .frames(3)
        .call(&scheduler)?;

    // 終わらない操作：最後に destroy して abort を確認する
    let doomed = InvokeAfterFrame::new(|| {})
        .name("doomed")
        .frames(u64::MAX)
        .call(&scheduler)?;
    doomed.on_error(|err| {
        if err.is_aborted_error() {
            info!("doomed aborted");
        }
    });

    // (D) ホストのフレームループ
    let mut ticker = tokio::time::interval(interval);
    while !loaded.get() {
        ticker.tick().await;
        let frame = scheduler.tick()?;
        if frame >= MAX_FRAMES {
            warn!(frame, "giving up before loader delivered");
            break;
        }
    }

    if let Some(slot) = doomed.slot() {
        scheduler.destroy(slot);
    }

    let report = Report {
        loader: loader.state(),
        doomed: doomed.state(),
        counts: scheduler.counts(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
