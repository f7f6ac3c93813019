//! Per-task control loops.
//!
//! Every scheduled task gets one [`TaskRunner`] spawned as its own tokio
//! task. The runner owns the timing primitive (a deadline for one-shot tasks,
//! an [`Interval`] for recurring ones) and the work callback, and waits on
//! four event sources at once:
//!
//! ```text
//!   cancel token ──┐
//!   execute slot ──┤                 ┌─► Canceled        (no invocation)
//!   extend slot  ──┼─► select! ──────┼─► ForcedExecuted  (one invocation)
//!   timer        ──┘                 └─► Fired           (one-shot only)
//! ```
//!
//! Sources are polled in that order (`biased`), so a cancel that races a
//! firing timer wins. Extend re-arms the timer and keeps looping. On any
//! terminal transition the runner removes its own registry record.

use crate::scheduler::registry::TaskRegistry;
use crate::scheduler::tasks::{
    TaskCallback, TaskContext, TaskEvent, TaskId, TaskKind, TaskOutcome, Trigger,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Deadline used when `now + duration` does not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Control loop state for one task. Consumed by [`run`](Self::run).
pub(crate) struct TaskRunner {
    pub(crate) id: TaskId,
    pub(crate) kind: TaskKind,
    pub(crate) duration: Duration,
    pub(crate) work: TaskCallback,
    pub(crate) cancel: CancellationToken,
    pub(crate) extend_rx: mpsc::Receiver<Duration>,
    pub(crate) execute_rx: mpsc::Receiver<()>,
    pub(crate) registry: Arc<dyn TaskRegistry>,
    pub(crate) events: broadcast::Sender<TaskEvent>,
    pub(crate) missed_tick: MissedTickBehavior,
    pub(crate) invocations: u64,
}

impl TaskRunner {
    /// Drive the task to a terminal transition, then deregister it.
    pub(crate) async fn run(mut self) -> TaskOutcome {
        let outcome = match self.kind {
            TaskKind::OneShot => self.run_one_shot().await,
            TaskKind::Recurring => self.run_recurring().await,
        };

        // May already be gone if `cancel` removed it first.
        self.registry.remove(&self.id);

        debug!(
            task_id = %self.id,
            kind = %self.kind,
            ?outcome,
            invocations = self.invocations,
            "task finished"
        );
        let _ = self.events.send(TaskEvent::Finished {
            id: self.id.clone(),
            outcome,
        });
        outcome
    }

    async fn run_one_shot(&mut self) -> TaskOutcome {
        let deadline = tokio::time::sleep(self.duration);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return TaskOutcome::Canceled;
                }
                Some(()) = self.execute_rx.recv() => {
                    self.invoke(Trigger::Forced).await;
                    return TaskOutcome::ForcedExecuted;
                }
                Some(delay) = self.extend_rx.recv() => {
                    // Measured from now, not from the original schedule time.
                    deadline.set(tokio::time::sleep(delay));
                    self.extended(delay);
                }
                () = &mut deadline => {
                    self.invoke(Trigger::Expired).await;
                    return TaskOutcome::Fired;
                }
            }
        }
    }

    async fn run_recurring(&mut self) -> TaskOutcome {
        let mut ticker = self.ticker(self.duration);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return TaskOutcome::Canceled;
                }
                Some(()) = self.execute_rx.recv() => {
                    self.invoke(Trigger::Forced).await;
                    return TaskOutcome::ForcedExecuted;
                }
                Some(period) = self.extend_rx.recv() => {
                    ticker = self.ticker(period);
                    self.extended(period);
                }
                _ = ticker.tick() => {
                    self.invoke(Trigger::Tick).await;
                }
            }
        }
    }

    /// A ticker whose first tick is one full `period` from now.
    ///
    /// `period` must be non-zero. Periods too large to represent never tick.
    fn ticker(&self, period: Duration) -> Interval {
        let now = Instant::now();
        let start = now
            .checked_add(period)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(self.missed_tick);
        ticker
    }

    fn extended(&self, duration: Duration) {
        debug!(task_id = %self.id, ?duration, "task timer re-armed");
        let _ = self.events.send(TaskEvent::Extended {
            id: self.id.clone(),
            duration,
        });
    }

    /// Run the work callback to completion.
    ///
    /// The callback is called and awaited on its own tokio task, so a panic
    /// in either part is contained and the record is still removed afterwards.
    async fn invoke(&mut self, trigger: Trigger) {
        self.invocations += 1;
        let ctx = TaskContext::new(
            self.id.clone(),
            self.kind,
            trigger,
            self.invocations,
            self.cancel.clone(),
        );

        let work = Arc::clone(&self.work);
        let panicked = match tokio::spawn(async move { work(ctx).await }).await {
            Ok(()) => false,
            Err(e) => {
                error!(task_id = %self.id, ?trigger, error = %e, "task callback panicked");
                true
            }
        };

        let _ = self.events.send(TaskEvent::Invoked {
            id: self.id.clone(),
            trigger,
            invocation: self.invocations,
            panicked,
        });
    }
}
