//! Thread-safe task registry.
//!
//! Maps live [`TaskId`]s to the caller-facing half of each task record: the
//! cancellation token and the single-slot extend/execute senders. The timer
//! and the work callback stay inside the task's control loop and are never
//! reachable through the registry.

use crate::error::{Result, TaskError};
use crate::scheduler::tasks::{TaskId, TaskKind};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Result of a non-blocking signal send into a control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignalDelivery {
    /// The signal was placed in the slot.
    Sent,
    /// A signal of the same kind was already pending; this one was dropped.
    Pending,
    /// The control loop has exited.
    Closed,
}

impl<T> From<std::result::Result<(), TrySendError<T>>> for SignalDelivery {
    fn from(result: std::result::Result<(), TrySendError<T>>) -> Self {
        match result {
            Ok(()) => Self::Sent,
            Err(TrySendError::Full(_)) => Self::Pending,
            Err(TrySendError::Closed(_)) => Self::Closed,
        }
    }
}

/// Registry record for one live task.
///
/// Cloning is cheap; every clone signals the same control loop.
#[derive(Debug, Clone)]
pub struct TaskEntry {
    kind: TaskKind,
    created_at: Instant,
    cancel: CancellationToken,
    extend_tx: mpsc::Sender<Duration>,
    execute_tx: mpsc::Sender<()>,
}

impl TaskEntry {
    pub(crate) fn new(
        kind: TaskKind,
        cancel: CancellationToken,
        extend_tx: mpsc::Sender<Duration>,
        execute_tx: mpsc::Sender<()>,
    ) -> Self {
        Self {
            kind,
            created_at: Instant::now(),
            cancel,
            extend_tx,
            execute_tx,
        }
    }

    /// Kind of the task.
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// When the task was scheduled.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// `true` once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn request_extend(&self, duration: Duration) -> SignalDelivery {
        self.extend_tx.try_send(duration).into()
    }

    pub(crate) fn request_execute(&self) -> SignalDelivery {
        self.execute_tx.try_send(()).into()
    }

    pub(crate) fn request_cancel(&self) {
        self.cancel.cancel();
    }
}

/// Storage for live task records.
///
/// Implementations must be internally synchronized. Callbacks are never run
/// while an implementation holds its lock.
pub trait TaskRegistry: Send + Sync {
    /// Add a record under a fresh identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::IdCollision`] if `id` is already registered; the
    /// existing record is left untouched.
    fn insert(&self, id: TaskId, entry: TaskEntry) -> Result<()>;

    /// Remove a record, returning it if it was present.
    fn remove(&self, id: &TaskId) -> Option<TaskEntry>;

    /// Look up a record by identifier.
    fn lookup(&self, id: &TaskId) -> Option<TaskEntry>;

    /// Number of live records.
    fn len(&self) -> usize;

    /// Identifiers of all live records, in no particular order.
    fn ids(&self) -> Vec<TaskId>;

    /// Whether no task is live.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Default registry: a mutex-guarded hash map.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
}

impl InMemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, TaskEntry>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl TaskRegistry for InMemoryRegistry {
    fn insert(&self, id: TaskId, entry: TaskEntry) -> Result<()> {
        let mut tasks = self.tasks();
        if tasks.contains_key(&id) {
            return Err(TaskError::IdCollision(id));
        }
        tasks.insert(id, entry);
        Ok(())
    }

    fn remove(&self, id: &TaskId) -> Option<TaskEntry> {
        self.tasks().remove(id)
    }

    fn lookup(&self, id: &TaskId) -> Option<TaskEntry> {
        self.tasks().get(id).cloned()
    }

    fn len(&self) -> usize {
        self.tasks().len()
    }

    fn ids(&self) -> Vec<TaskId> {
        self.tasks().keys().cloned().collect()
    }
}
