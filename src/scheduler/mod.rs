//! Timeout and interval scheduling.
//!
//! Each scheduled task runs its own control loop that owns its timer and
//! reacts to extend, execute and cancel signals sent through the registry.

pub mod id;
pub mod manager;
pub mod registry;
mod runner;
pub mod tasks;

pub use id::{IdGenerator, TimestampIdGenerator};
pub use manager::TaskManager;
pub use registry::{InMemoryRegistry, TaskEntry, TaskRegistry};
pub use tasks::{TaskContext, TaskEvent, TaskFuture, TaskId, TaskKind, TaskOutcome, Trigger};
