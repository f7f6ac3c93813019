//! Task definitions shared by the registry, the control loops and callers.
//!
//! Defines the [`TaskId`] key, the [`TaskKind`] of a task, the
//! [`TaskContext`] handed to work callbacks, and the [`TaskEvent`]s
//! broadcast while tasks move through their lifecycle.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Opaque identifier of one scheduled task.
///
/// Valid for the lifetime of exactly one task record and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(String);

impl TaskId {
    /// Wrap a raw identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Whether a task fires once or repeatedly. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Fires at most once, after a delay.
    OneShot,
    /// Fires every period until canceled or force-executed.
    Recurring,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneShot => f.write_str("timeout"),
            Self::Recurring => f.write_str("interval"),
        }
    }
}

/// Why the work callback is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A one-shot deadline elapsed.
    Expired,
    /// A recurring ticker fired.
    Tick,
    /// The caller forced execution ahead of schedule.
    Forced,
}

/// How a task's control loop terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// A one-shot task reached its deadline and ran.
    Fired,
    /// The task was canceled (explicitly or by shutdown).
    Canceled,
    /// The task was executed on demand and then retired.
    ForcedExecuted,
}

/// Lifecycle notifications broadcast by the [`TaskManager`](crate::TaskManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// A task was registered and its control loop started.
    Scheduled {
        /// Task identifier.
        id: TaskId,
        /// Task kind.
        kind: TaskKind,
        /// Initial delay or period.
        duration: Duration,
    },
    /// A control loop re-armed its timer with a new duration.
    Extended {
        /// Task identifier.
        id: TaskId,
        /// New delay or period.
        duration: Duration,
    },
    /// An extend or execute signal was dropped because one was already pending.
    SignalDropped {
        /// Task identifier.
        id: TaskId,
        /// Which signal was dropped (`"extend"` or `"execute"`).
        signal: &'static str,
    },
    /// The work callback finished an invocation, normally or by panicking.
    Invoked {
        /// Task identifier.
        id: TaskId,
        /// What caused the invocation.
        trigger: Trigger,
        /// 1-based invocation count for this task.
        invocation: u64,
        /// Whether the callback panicked instead of returning.
        panicked: bool,
    },
    /// The control loop reached a terminal transition and exited.
    Finished {
        /// Task identifier.
        id: TaskId,
        /// Terminal outcome.
        outcome: TaskOutcome,
    },
}

/// Execution context passed to every callback invocation.
///
/// Carries the cancellation token of the task so long-running work can
/// observe [`TaskManager::cancel`](crate::TaskManager::cancel) cooperatively.
#[derive(Debug, Clone)]
pub struct TaskContext {
    id: TaskId,
    kind: TaskKind,
    trigger: Trigger,
    invocation: u64,
    cancel: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(
        id: TaskId,
        kind: TaskKind,
        trigger: Trigger,
        invocation: u64,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            kind,
            trigger,
            invocation,
            cancel,
        }
    }

    /// Identifier of the task being run.
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Kind of the task being run.
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// What caused this invocation.
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// 1-based invocation count for this task.
    pub fn invocation(&self) -> u64 {
        self.invocation
    }

    /// `true` when a one-shot deadline elapsed naturally.
    pub fn deadline_exceeded(&self) -> bool {
        self.trigger == Trigger::Expired
    }

    /// `true` once the task has been canceled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the task is canceled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

/// Boxed future returned by a work callback.
pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Work callback shared between a task's control loop and its invocations.
pub type TaskCallback = Arc<dyn Fn(TaskContext) -> TaskFuture + Send + Sync>;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn context(trigger: Trigger, cancel: CancellationToken) -> TaskContext {
        TaskContext::new(TaskId::from("t-1"), TaskKind::OneShot, trigger, 1, cancel)
    }

    #[test]
    fn task_id_display_and_as_str_agree() {
        let id = TaskId::new("18c2f-7a1b");
        assert_eq!(id.to_string(), "18c2f-7a1b");
        assert_eq!(id.as_str(), "18c2f-7a1b");
        assert_eq!(id, TaskId::from(String::from("18c2f-7a1b")));
    }

    #[test]
    fn kind_display() {
        assert_eq!(TaskKind::OneShot.to_string(), "timeout");
        assert_eq!(TaskKind::Recurring.to_string(), "interval");
    }

    #[test]
    fn expired_context_reports_deadline_exceeded() {
        let ctx = context(Trigger::Expired, CancellationToken::new());
        assert!(ctx.deadline_exceeded());
        assert_eq!(ctx.kind(), TaskKind::OneShot);
        assert_eq!(ctx.invocation(), 1);

        let forced = context(Trigger::Forced, CancellationToken::new());
        assert!(!forced.deadline_exceeded());
    }

    #[test]
    fn context_observes_cancellation() {
        let token = CancellationToken::new();
        let ctx = context(Trigger::Tick, token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let token = CancellationToken::new();
        let ctx = context(Trigger::Tick, token.clone());
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), ctx.cancelled())
            .await
            .expect("cancelled() should resolve");
    }
}
