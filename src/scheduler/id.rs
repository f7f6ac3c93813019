//! Task identifier generation.
//!
//! The default [`TimestampIdGenerator`] produces lightweight ids of the form
//! `<unix-nanos-hex>-<random-u32-hex>`. Any `Fn() -> Result<TaskId>` closure
//! can be used in its place.

use crate::error::{Result, TaskError};
use crate::scheduler::tasks::TaskId;
use rand::RngCore;
use rand::rngs::OsRng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Supplier of unique task identifiers.
pub trait IdGenerator: Send + Sync {
    /// Produce a fresh identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::IdGeneration`] when no identifier can be produced.
    fn generate(&self) -> Result<TaskId>;
}

impl<F> IdGenerator for F
where
    F: Fn() -> Result<TaskId> + Send + Sync,
{
    fn generate(&self) -> Result<TaskId> {
        self()
    }
}

/// Timestamp plus OS randomness.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampIdGenerator;

impl IdGenerator for TimestampIdGenerator {
    fn generate(&self) -> Result<TaskId> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| TaskError::IdGeneration(format!("system clock before epoch: {e}")))?
            .as_nanos();

        let mut bytes = [0u8; 4];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| TaskError::IdGeneration(e.to_string()))?;
        let rand_part = u32::from_be_bytes(bytes);

        Ok(TaskId::new(format!("{nanos:x}-{rand_part:x}")))
    }
}
