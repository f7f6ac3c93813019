//! Configuration for the task manager.

use crate::error::{Result, TaskError};
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;

/// Default capacity of the lifecycle event broadcast channel.
const DEFAULT_EVENT_CAPACITY: usize = 64;

/// What a recurring task does with ticks that come due while its callback is
/// still running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedTickPolicy {
    /// Drop missed ticks and stay aligned to the original phase.
    #[default]
    Skip,
    /// Fire once as soon as possible, then shift the phase to that moment.
    Delay,
    /// Fire every missed tick back to back until caught up.
    Burst,
}

impl From<MissedTickPolicy> for MissedTickBehavior {
    fn from(policy: MissedTickPolicy) -> Self {
        match policy {
            MissedTickPolicy::Skip => MissedTickBehavior::Skip,
            MissedTickPolicy::Delay => MissedTickBehavior::Delay,
            MissedTickPolicy::Burst => MissedTickBehavior::Burst,
        }
    }
}

/// Top-level scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Missed-tick policy applied to every recurring task.
    pub missed_tick: MissedTickPolicy,
    /// Buffer size of the [`TaskEvent`](crate::TaskEvent) broadcast channel.
    ///
    /// Slow subscribers that fall further behind than this lose the oldest events.
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            missed_tick: MissedTickPolicy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// parsed values fail [`validate`](Self::validate).
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| TaskError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Config`] if `event_capacity` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(TaskError::Config(
                "event_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
