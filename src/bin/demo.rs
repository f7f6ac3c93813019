//! Demo binary for taskout.
//!
//! Replays the basic timeout/interval scenarios against a live
//! [`TaskManager`] and prints each invocation with its offset from start.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use taskout::{SchedulerConfig, TaskContext, TaskEvent, TaskId, TaskManager, TaskOutcome};
use tokio::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// taskout: cancelable, extendable timeouts and intervals.
#[derive(Parser)]
#[command(name = "taskout-demo", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scenario to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available scenarios.
#[derive(Subcommand)]
enum Command {
    /// Run an interval for a while, then cancel it.
    Interval {
        /// Period between invocations, in milliseconds.
        #[arg(long, default_value_t = 2000)]
        period_ms: u64,

        /// How long to let the interval run before canceling, in milliseconds.
        #[arg(long, default_value_t = 7000)]
        run_ms: u64,
    },

    /// Schedule a single timeout and wait for it to fire.
    Timeout {
        /// Delay before the callback runs, in milliseconds.
        #[arg(long, default_value_t = 2000)]
        delay_ms: u64,
    },

    /// Schedule a timeout, then extend it part-way through.
    Extend {
        /// Initial delay, in milliseconds.
        #[arg(long, default_value_t = 4000)]
        delay_ms: u64,

        /// When to send the extend, in milliseconds after scheduling.
        #[arg(long, default_value_t = 1000)]
        after_ms: u64,

        /// New delay measured from the extend, in milliseconds.
        #[arg(long, default_value_t = 2000)]
        extend_ms: u64,
    },

    /// Schedule a timeout, then force it to run early.
    Execute {
        /// Initial delay, in milliseconds.
        #[arg(long, default_value_t = 5000)]
        delay_ms: u64,

        /// When to force execution, in milliseconds after scheduling.
        #[arg(long, default_value_t = 1000)]
        after_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskout=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.config {
        SchedulerConfig::from_file(path)?
    } else {
        SchedulerConfig::default()
    };
    let manager = TaskManager::from_config(config)?;

    match cli.command.unwrap_or(Command::Interval {
        period_ms: 2000,
        run_ms: 7000,
    }) {
        Command::Interval { period_ms, run_ms } => run_interval(&manager, period_ms, run_ms).await,
        Command::Timeout { delay_ms } => run_timeout(&manager, delay_ms).await,
        Command::Extend {
            delay_ms,
            after_ms,
            extend_ms,
        } => run_extend(&manager, delay_ms, after_ms, extend_ms).await,
        Command::Execute { delay_ms, after_ms } => {
            run_execute(&manager, delay_ms, after_ms).await
        }
    }
}

/// Callback that prints the invocation and its offset from `start`.
fn report(start: Instant) -> impl Fn(TaskContext) -> std::future::Ready<()> + Send + Sync + 'static {
    move |ctx: TaskContext| {
        println!(
            "[{:>8.3}s] {} #{} ({:?})",
            start.elapsed().as_secs_f64(),
            ctx.id(),
            ctx.invocation(),
            ctx.trigger(),
        );
        std::future::ready(())
    }
}

async fn run_interval(manager: &TaskManager, period_ms: u64, run_ms: u64) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut events = manager.subscribe();
    let id = manager.set_interval(report(start), Duration::from_millis(period_ms))?;
    info!(task_id = %id, period_ms, "interval scheduled");

    tokio::time::sleep(Duration::from_millis(run_ms)).await;
    manager.cancel_with(&id, || println!("interval canceled"));

    let outcome = wait_finished(&mut events, &id).await?;
    println!("outcome: {outcome:?}");
    Ok(())
}

async fn run_timeout(manager: &TaskManager, delay_ms: u64) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut events = manager.subscribe();
    let id = manager.set_timeout(report(start), Duration::from_millis(delay_ms))?;
    info!(task_id = %id, delay_ms, "timeout scheduled");

    let outcome = wait_finished(&mut events, &id).await?;
    println!("outcome: {outcome:?}");
    Ok(())
}

async fn run_extend(
    manager: &TaskManager,
    delay_ms: u64,
    after_ms: u64,
    extend_ms: u64,
) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut events = manager.subscribe();
    let id = manager.set_timeout(report(start), Duration::from_millis(delay_ms))?;
    info!(task_id = %id, delay_ms, "timeout scheduled");

    tokio::time::sleep(Duration::from_millis(after_ms)).await;
    manager.extend(&id, Duration::from_millis(extend_ms))?;
    info!(task_id = %id, extend_ms, "timeout extended");

    let outcome = wait_finished(&mut events, &id).await?;
    println!("outcome: {outcome:?}");
    Ok(())
}

async fn run_execute(manager: &TaskManager, delay_ms: u64, after_ms: u64) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut events = manager.subscribe();
    let id = manager.set_timeout(report(start), Duration::from_millis(delay_ms))?;
    info!(task_id = %id, delay_ms, "timeout scheduled");

    tokio::time::sleep(Duration::from_millis(after_ms)).await;
    manager.execute(&id)?;

    let outcome = wait_finished(&mut events, &id).await?;
    println!("outcome: {outcome:?}");
    Ok(())
}

async fn wait_finished(
    events: &mut tokio::sync::broadcast::Receiver<TaskEvent>,
    id: &TaskId,
) -> anyhow::Result<TaskOutcome> {
    loop {
        match events.recv().await {
            Ok(TaskEvent::Finished { id: done, outcome }) if &done == id => return Ok(outcome),
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event stream lagged");
            }
            Err(e) => anyhow::bail!("event stream closed: {e}"),
        }
    }
}
