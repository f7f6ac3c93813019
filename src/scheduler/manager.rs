//! Caller-facing task manager.
//!
//! [`TaskManager`] schedules timeouts and intervals, and forwards extend,
//! execute and cancel requests to the owning control loop through the
//! task's registry record. Scheduling returns as soon as the loop is
//! spawned; it never waits for a firing.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use taskout::TaskManager;
//!
//! # async fn demo() -> taskout::Result<()> {
//! let manager = TaskManager::new();
//! let id = manager.set_timeout(
//!     |ctx| async move { println!("{} fired", ctx.id()) },
//!     Duration::from_secs(3),
//! )?;
//! manager.extend(&id, Duration::from_secs(5))?;
//! # Ok(())
//! # }
//! ```

use crate::config::SchedulerConfig;
use crate::error::{Result, TaskError};
use crate::scheduler::id::{IdGenerator, TimestampIdGenerator};
use crate::scheduler::registry::{InMemoryRegistry, SignalDelivery, TaskEntry, TaskRegistry};
use crate::scheduler::runner::TaskRunner;
use crate::scheduler::tasks::{
    TaskCallback, TaskContext, TaskEvent, TaskFuture, TaskId, TaskKind,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Schedules and controls one-shot and recurring tasks.
///
/// Cloning is cheap; clones share the same registry and tasks.
#[derive(Clone)]
pub struct TaskManager {
    registry: Arc<dyn TaskRegistry>,
    ids: Arc<dyn IdGenerator>,
    config: SchedulerConfig,
    /// Parent of every task's cancellation token.
    root: CancellationToken,
    events: broadcast::Sender<TaskEvent>,
    runtime: Option<Handle>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskManager {
    /// Create a manager with an in-memory registry and default configuration.
    pub fn new() -> Self {
        let config = SchedulerConfig::default();
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            registry: Arc::new(InMemoryRegistry::new()),
            ids: Arc::new(TimestampIdGenerator),
            config,
            root: CancellationToken::new(),
            events,
            runtime: None,
        }
    }

    /// Create a manager from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Config`] if the configuration is invalid.
    pub fn from_config(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);
        Ok(Self {
            config,
            events,
            ..Self::new()
        })
    }

    /// Use a custom registry. Call before scheduling any task.
    pub fn with_registry(mut self, registry: Arc<dyn TaskRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Use a custom identifier supplier.
    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    /// Spawn control loops on `handle`, allowing scheduling from outside a runtime.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Schedule `work` to run once after `duration`.
    ///
    /// # Errors
    ///
    /// Fails closed (no task is created) if no identifier can be generated,
    /// no tokio runtime is available, or the manager has been shut down.
    pub fn set_timeout<F, Fut>(&self, work: F, duration: Duration) -> Result<TaskId>
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.schedule(TaskKind::OneShot, boxed(work), duration)
    }

    /// Schedule `work` to run every `period`, first after one full period.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::InvalidDuration`] for a zero period, otherwise
    /// fails closed like [`set_timeout`](Self::set_timeout).
    pub fn set_interval<F, Fut>(&self, work: F, period: Duration) -> Result<TaskId>
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        ensure_period(period)?;
        self.schedule(TaskKind::Recurring, boxed(work), period)
    }

    /// Like [`set_timeout`](Self::set_timeout) for blocking work, run on the
    /// blocking thread pool.
    ///
    /// # Errors
    ///
    /// Same as [`set_timeout`](Self::set_timeout).
    pub fn set_timeout_fn<F>(&self, work: F, duration: Duration) -> Result<TaskId>
    where
        F: Fn(TaskContext) + Send + Sync + 'static,
    {
        self.schedule(TaskKind::OneShot, blocking(work), duration)
    }

    /// Like [`set_interval`](Self::set_interval) for blocking work, run on the
    /// blocking thread pool.
    ///
    /// # Errors
    ///
    /// Same as [`set_interval`](Self::set_interval).
    pub fn set_interval_fn<F>(&self, work: F, period: Duration) -> Result<TaskId>
    where
        F: Fn(TaskContext) + Send + Sync + 'static,
    {
        ensure_period(period)?;
        self.schedule(TaskKind::Recurring, blocking(work), period)
    }

    /// Reset a live task's delay (one-shot) or period (recurring), measured
    /// from when its control loop processes the request.
    ///
    /// If an extend is already pending for the task the request is dropped
    /// and logged; that is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::InvalidIdentifier`] if `id` is not live, or
    /// [`TaskError::InvalidDuration`] for a zero period on a recurring task.
    pub fn extend(&self, id: &TaskId, duration: Duration) -> Result<()> {
        let entry = self.live_entry(id)?;
        if entry.kind() == TaskKind::Recurring {
            ensure_period(duration)?;
        }

        match entry.request_extend(duration) {
            SignalDelivery::Sent => {
                debug!(task_id = %id, ?duration, "extend requested");
                Ok(())
            }
            SignalDelivery::Pending => {
                warn!(task_id = %id, ?duration, "failed to extend duration, channel busy");
                self.signal_dropped(id, "extend");
                Ok(())
            }
            SignalDelivery::Closed => Err(TaskError::InvalidIdentifier(id.clone())),
        }
    }

    /// Run a live task's callback now and retire the task.
    ///
    /// The record is removed by the control loop once the callback has run.
    /// An execute that is already pending counts as satisfied.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::InvalidIdentifier`] if `id` is not live.
    pub fn execute(&self, id: &TaskId) -> Result<()> {
        let entry = self.live_entry(id)?;

        match entry.request_execute() {
            SignalDelivery::Sent => {
                debug!(task_id = %id, "execute requested");
                Ok(())
            }
            SignalDelivery::Pending => {
                debug!(task_id = %id, "execute already pending");
                self.signal_dropped(id, "execute");
                Ok(())
            }
            SignalDelivery::Closed => Err(TaskError::InvalidIdentifier(id.clone())),
        }
    }

    /// Cancel a task. Returns `true` if a live task was canceled.
    ///
    /// Unknown or already finished ids are a no-op. A callback that is
    /// already running is not interrupted but can observe the cancellation
    /// through its [`TaskContext`].
    pub fn cancel(&self, id: &TaskId) -> bool {
        self.cancel_inner(id, None::<fn()>)
    }

    /// Cancel a task and run `on_cancel` if it was live.
    ///
    /// `on_cancel` runs synchronously on the caller's thread, after the
    /// record has left the registry, so it may safely call back into the
    /// manager.
    pub fn cancel_with<F>(&self, id: &TaskId, on_cancel: F) -> bool
    where
        F: FnOnce(),
    {
        self.cancel_inner(id, Some(on_cancel))
    }

    /// Cancel every live task and refuse further scheduling.
    pub fn shutdown(&self) {
        let live = self.registry.len();
        self.root.cancel();
        info!(live, "task manager shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Whether `id` refers to a live task.
    pub fn contains(&self, id: &TaskId) -> bool {
        self.registry.lookup(id).is_some()
    }

    /// Kind of a live task.
    pub fn kind(&self, id: &TaskId) -> Option<TaskKind> {
        self.registry.lookup(id).map(|entry| entry.kind())
    }

    /// Number of live tasks.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Whether no task is live.
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Identifiers of all live tasks, in no particular order.
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.registry.ids()
    }

    /// Subscribe to lifecycle events for all tasks.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    fn schedule(&self, kind: TaskKind, work: TaskCallback, duration: Duration) -> Result<TaskId> {
        if self.is_shut_down() {
            return Err(TaskError::ShutDown);
        }
        let runtime = self.runtime_handle()?;
        let id = self.ids.generate()?;

        let cancel = self.root.child_token();
        let (extend_tx, extend_rx) = mpsc::channel(1);
        let (execute_tx, execute_rx) = mpsc::channel(1);
        self.registry.insert(
            id.clone(),
            TaskEntry::new(kind, cancel.clone(), extend_tx, execute_tx),
        )?;

        let runner = TaskRunner {
            id: id.clone(),
            kind,
            duration,
            work,
            cancel,
            extend_rx,
            execute_rx,
            registry: Arc::clone(&self.registry),
            events: self.events.clone(),
            missed_tick: self.config.missed_tick.into(),
            invocations: 0,
        };

        debug!(task_id = %id, %kind, ?duration, "task scheduled");
        let _ = self.events.send(TaskEvent::Scheduled {
            id: id.clone(),
            kind,
            duration,
        });
        runtime.spawn(runner.run());

        Ok(id)
    }

    fn cancel_inner<F>(&self, id: &TaskId, on_cancel: Option<F>) -> bool
    where
        F: FnOnce(),
    {
        // Removal and lookup are one registry call, so a second cancel
        // never sees the record and never reruns `on_cancel`.
        let Some(entry) = self.registry.remove(id) else {
            debug!(task_id = %id, "cancel ignored: task not live");
            return false;
        };

        entry.request_cancel();
        debug!(
            task_id = %id,
            kind = %entry.kind(),
            age = ?entry.created_at().elapsed(),
            "task canceled"
        );

        if let Some(on_cancel) = on_cancel {
            on_cancel();
        }
        true
    }

    fn live_entry(&self, id: &TaskId) -> Result<TaskEntry> {
        self.registry
            .lookup(id)
            .ok_or_else(|| TaskError::InvalidIdentifier(id.clone()))
    }

    fn signal_dropped(&self, id: &TaskId, signal: &'static str) {
        let _ = self.events.send(TaskEvent::SignalDropped {
            id: id.clone(),
            signal,
        });
    }

    fn runtime_handle(&self) -> Result<Handle> {
        match &self.runtime {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current().map_err(|e| TaskError::Runtime(e.to_string())),
        }
    }
}

fn ensure_period(period: Duration) -> Result<()> {
    if period.is_zero() {
        return Err(TaskError::InvalidDuration(
            "interval period must be greater than zero".into(),
        ));
    }
    Ok(())
}

fn boxed<F, Fut>(work: F) -> TaskCallback
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |ctx: TaskContext| -> TaskFuture { Box::pin(work(ctx)) })
}

fn blocking<F>(work: F) -> TaskCallback
where
    F: Fn(TaskContext) + Send + Sync + 'static,
{
    let work = Arc::new(work);
    Arc::new(move |ctx: TaskContext| -> TaskFuture {
        let work = Arc::clone(&work);
        Box::pin(async move {
            let id = ctx.id().clone();
            if let Err(e) = tokio::task::spawn_blocking(move || work(ctx)).await {
                error!(task_id = %id, error = %e, "blocking task callback failed");
            }
        })
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn(TaskContext) -> TaskFuture + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&count);
        let work = move |_ctx: TaskContext| -> TaskFuture {
            let hits = Arc::clone(&hits);
            Box::pin(async move {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        (count, work)
    }

    #[test]
    fn scheduling_outside_runtime_fails_closed() {
        let manager = TaskManager::new();
        let (_count, work) = counter();
        let err = manager
            .set_timeout(work, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, TaskError::Runtime(_)));
        assert!(manager.is_empty());
    }

    #[test]
    fn explicit_runtime_allows_scheduling_from_plain_threads() {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        let manager = TaskManager::new().with_runtime(rt.handle().clone());
        let (count, work) = counter();

        let id = manager
            .set_timeout(work, Duration::from_millis(10))
            .expect("schedule");
        assert!(manager.contains(&id) || count.load(Ordering::SeqCst) == 1);

        rt.block_on(async { tokio::time::sleep(Duration::from_millis(200)).await });
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!manager.contains(&id));
    }

    #[tokio::test]
    async fn id_generation_failure_creates_no_task() {
        let manager = TaskManager::new().with_id_generator(|| -> Result<TaskId> {
            Err(TaskError::IdGeneration("entropy source unavailable".into()))
        });
        let (_count, work) = counter();

        let err = manager
            .set_interval(work, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, TaskError::IdGeneration(_)));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn duplicate_generated_id_fails_closed() {
        let manager =
            TaskManager::new().with_id_generator(|| -> Result<TaskId> { Ok(TaskId::from("same")) });
        let (_c1, first) = counter();
        let (_c2, second) = counter();

        manager
            .set_timeout(first, Duration::from_secs(60))
            .expect("first schedule");
        let err = manager
            .set_timeout(second, Duration::from_secs(60))
            .unwrap_err();
        assert!(matches!(err, TaskError::IdCollision(_)));
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn zero_period_is_rejected() {
        let manager = TaskManager::new();
        let (_count, work) = counter();
        assert!(matches!(
            manager.set_interval(work, Duration::ZERO),
            Err(TaskError::InvalidDuration(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_extend_is_rejected_for_intervals() {
        let manager = TaskManager::new();
        let (_count, work) = counter();
        let id = manager
            .set_interval(work, Duration::from_secs(1))
            .expect("schedule");

        assert!(matches!(
            manager.extend(&id, Duration::ZERO),
            Err(TaskError::InvalidDuration(_))
        ));
        assert!(manager.cancel(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_ids_are_reported() {
        let manager = TaskManager::new();
        let ghost = TaskId::from("ghost");

        assert!(matches!(
            manager.extend(&ghost, Duration::from_secs(1)),
            Err(TaskError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            manager.execute(&ghost),
            Err(TaskError::InvalidIdentifier(_))
        ));
        assert!(!manager.cancel(&ghost));
    }

    #[tokio::test(start_paused = true)]
    async fn second_extend_while_pending_is_dropped_not_failed() {
        let manager = TaskManager::new();
        let mut events = manager.subscribe();
        let (_count, work) = counter();
        let id = manager
            .set_timeout(work, Duration::from_secs(10))
            .expect("schedule");

        // The loop has not run yet, so the first extend is still pending.
        manager.extend(&id, Duration::from_secs(1)).expect("first");
        manager.extend(&id, Duration::from_secs(20)).expect("second");

        assert!(matches!(events.try_recv(), Ok(TaskEvent::Scheduled { .. })));
        assert!(matches!(
            events.try_recv(),
            Ok(TaskEvent::SignalDropped {
                signal: "extend",
                ..
            })
        ));
        manager.cancel(&id);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_with_runs_cleanup_once_and_allows_reentry() {
        let manager = TaskManager::new();
        let (_count, work) = counter();
        let id = manager
            .set_timeout(work, Duration::from_secs(5))
            .expect("schedule");

        let cleanups = AtomicUsize::new(0);
        let inner = manager.clone();
        let canceled = manager.cancel_with(&id, || {
            cleanups.fetch_add(1, Ordering::SeqCst);
            // Re-entering the manager from the cleanup must not deadlock.
            assert!(!inner.contains(&id));
            assert_eq!(inner.len(), 0);
        });
        assert!(canceled);
        assert!(!manager.cancel_with(&id, || {
            cleanups.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_everything_and_refuses_new_work() {
        let manager = TaskManager::new();
        let (count, work) = counter();
        let (_other, interval) = counter();
        manager
            .set_timeout(work, Duration::from_secs(1))
            .expect("timeout");
        manager
            .set_interval(interval, Duration::from_secs(1))
            .expect("interval");
        assert_eq!(manager.len(), 2);

        manager.shutdown();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(manager.is_shut_down());
        assert!(manager.is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let (_late, late_work) = counter();
        assert!(matches!(
            manager.set_timeout(late_work, Duration::from_secs(1)),
            Err(TaskError::ShutDown)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_callbacks_run_on_blocking_pool() {
        let manager = TaskManager::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&hits);
        let id = manager
            .set_timeout_fn(
                move |ctx| {
                    assert!(ctx.deadline_exceeded());
                    sink.fetch_add(1, Ordering::SeqCst);
                },
                Duration::from_secs(1),
            )
            .expect("schedule");

        let mut events = manager.subscribe();
        loop {
            match events.recv().await.expect("event") {
                TaskEvent::Finished { id: done, .. } if done == id => break,
                _ => {}
            }
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn from_config_validates() {
        let bad = SchedulerConfig {
            event_capacity: 0,
            ..SchedulerConfig::default()
        };
        assert!(matches!(
            TaskManager::from_config(bad),
            Err(TaskError::Config(_))
        ));
        assert!(TaskManager::from_config(SchedulerConfig::default()).is_ok());
    }
}
