//! taskout: in-process timeouts and intervals.
//!
//! Two primitives are offered, both independently cancelable, extendable and
//! force-executable:
//!
//! - **Timeout**: runs a callback once after a delay ([`TaskManager::set_timeout`])
//! - **Interval**: runs a callback every period ([`TaskManager::set_interval`])
//!
//! # Architecture
//!
//! - **Registry**: a synchronized map from [`TaskId`] to the signaling half of
//!   each task ([`TaskRegistry`], default [`InMemoryRegistry`])
//! - **Control loops**: one tokio task per live task, owning its timer and
//!   callback and reacting to extend / execute / cancel signals
//!
//! A loop removes its own registry record when it reaches a terminal
//! transition: a timeout firing, a forced execution, or a cancellation.

pub mod config;
pub mod error;
pub mod scheduler;

pub use config::{MissedTickPolicy, SchedulerConfig};
pub use error::{Result, TaskError};
pub use scheduler::{
    IdGenerator, InMemoryRegistry, TaskContext, TaskEntry, TaskEvent, TaskFuture, TaskId,
    TaskKind, TaskManager, TaskOutcome, TaskRegistry, TimestampIdGenerator, Trigger,
};
