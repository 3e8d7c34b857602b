use std::path::PathBuf;
use std::rc::Rc;

use cadence_core::impls::TokioHost;
use cadence_core::observability::QueueStats;
use cadence_core::queue::ConfigError;
use cadence_core::{BuildError, QueueConfig, TaskError, TaskQueue, Tier};
use clap::Parser;
use tokio::task::LocalSet;
use tokio::time::{Duration, sleep};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// アイドル待ちのポーリング上限（10ms × 200 = 2s）
const MAX_IDLE_POLLS: usize = 200;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Run the two-tier task queue demo on a tokio host", long_about = None)]
#[command(version)]
struct Cli {
    /// Queue config (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Attach causal stacks to enqueued tasks
    #[arg(long)]
    long_stacks: bool,

    /// Make the nested micro task fail
    #[arg(long)]
    fail: bool,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("failed to encode stats: {0}")]
    Encode(#[from] serde_json::Error),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => QueueConfig::load(path)?,
        None => QueueConfig::default(),
    };
    if cli.long_stacks {
        config.long_stacks = true;
    }

    let stats = LocalSet::new().run_until(run_demo(config, cli.fail)).await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// macro に A, B, C を積み、A の中から micro に D を積む
async fn run_demo(config: QueueConfig, fail: bool) -> Result<QueueStats, BuildError> {
    // (A) tokio ホストの上に TaskQueue を構築
    let host = TokioHost::new();
    let queue = TaskQueue::builder(host.host()).config(config).build()?;

    // (B) タスク投入
    let nested = queue.clone();
    queue.enqueue_macro(move || -> Result<(), TaskError> {
        info!(task = "A", "running; queueing D on the micro tier");
        nested.enqueue_micro(move || -> Result<(), TaskError> {
            if fail {
                return Err(TaskError::new("D failed on purpose"));
            }
            info!(task = "D", "running");
            Ok(())
        });
        Ok(())
    });
    for name in ["B", "C"] {
        queue.enqueue_macro(move || -> Result<(), TaskError> {
            info!(task = name, "running");
            Ok(())
        });
    }

    // (C) 両方の tier が空になり、タイマーも残っていないのを待つ
    wait_for_idle(&queue, &host).await;
    Ok(queue.stats())
}

async fn wait_for_idle(queue: &TaskQueue, host: &Rc<TokioHost>) {
    for _ in 0..MAX_IDLE_POLLS {
        sleep(Duration::from_millis(10)).await;
        let idle = !queue.is_flushing()
            && queue.is_empty(Tier::Micro)
            && queue.is_empty(Tier::Macro)
            && host.pending_timers() == 0;
        if idle {
            return;
        }
    }
    info!("queue still busy; reporting stats anyway");
}
