//! Reconciler tuning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-operation deadlines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub create_secs: u64,
    pub read_secs: u64,
    pub update_secs: u64,
    pub delete_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create_secs: 120,
            read_secs: 60,
            update_secs: 120,
            delete_secs: 120,
        }
    }
}

impl Timeouts {
    pub fn create(&self) -> Duration {
        Duration::from_secs(self.create_secs)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn update(&self) -> Duration {
        Duration::from_secs(self.update_secs)
    }

    pub fn delete(&self) -> Duration {
        Duration::from_secs(self.delete_secs)
    }
}

/// Spacing of state probes while waiting for an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollTiming {
    /// Wait before the first probe.
    pub delay_ms: u64,
    /// First wait between probes.
    pub min_interval_ms: u64,
    /// Upper bound the wait grows towards.
    pub interval_ms: u64,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            delay_ms: 0,
            min_interval_ms: 2_000,
            interval_ms: 10_000,
        }
    }
}

impl PollTiming {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Retry policy of the connectivity validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub timeout_secs: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl ValidationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Backoff before retry number `attempt` (0-based), capped at `max_backoff_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = if self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0 {
            self.backoff_multiplier
        } else {
            1.0
        };
        let delay = self.initial_backoff_ms as f64 * multiplier.powi(attempt as i32);
        Duration::from_millis(delay.min(self.max_backoff_ms as f64) as u64)
    }
}

/// Everything the reconcilers can be tuned with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub timeouts: Timeouts,
    pub poll: PollTiming,
    pub validation: ValidationSettings,
    /// Check types, schemes and keys against the remote type catalog before create.
    pub check_types: bool,
}
