//! Sync engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of mutations drained per push
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default upper bound on a full bootstrap
pub const DEFAULT_BOOTSTRAP_DEADLINE: Duration = Duration::from_secs(30);

/// Default period of the background retry sweep
pub const DEFAULT_RETRY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for push, bootstrap and background sweeps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Mutations read from the queue per push
    pub batch_size: usize,
    /// Transient failures tolerated before a mutation is quarantined.
    /// `None` retries forever.
    pub max_retries: Option<u32>,
    /// Upper bound on `pull_all_data`
    pub bootstrap_deadline: Duration,
    /// Attempt a push right after every local save
    pub push_on_save: bool,
    /// Period of `spawn_retry_sweep`
    pub retry_sweep_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: None,
            bootstrap_deadline: DEFAULT_BOOTSTRAP_DEADLINE,
            push_on_save: true,
            retry_sweep_interval: DEFAULT_RETRY_SWEEP_INTERVAL,
        }
    }
}

impl SyncConfig {
    /// Set the push batch size (at least one)
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Quarantine mutations after `max_retries` transient failures
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set the bootstrap deadline
    #[must_use]
    pub const fn with_bootstrap_deadline(mut self, deadline: Duration) -> Self {
        self.bootstrap_deadline = deadline;
        self
    }

    /// Only push when asked (sweep or explicit call)
    #[must_use]
    pub const fn without_push_on_save(mut self) -> Self {
        self.push_on_save = false;
        self
    }

    /// Set the background sweep period
    #[must_use]
    pub const fn with_retry_sweep_interval(mut self, interval: Duration) -> Self {
        self.retry_sweep_interval = interval;
        self
    }

    /// Whether `retry_count` has reached the configured cap
    pub fn retries_exhausted(&self, retry_count: u32) -> bool {
        self.max_retries.is_some_and(|max| retry_count >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_retry_forever() {
        let config = SyncConfig::default();
        assert_eq!(config.max_retries, None);
        assert!(!config.retries_exhausted(u32::MAX));
        assert!(config.push_on_save);
    }

    #[test]
    fn builder_sets_fields() {
        let config = SyncConfig::default()
            .with_batch_size(0)
            .with_max_retries(3)
            .with_bootstrap_deadline(Duration::from_millis(250))
            .without_push_on_save();

        assert_eq!(config.batch_size, 1);
        assert!(!config.retries_exhausted(2));
        assert!(config.retries_exhausted(3));
        assert_eq!(config.bootstrap_deadline, Duration::from_millis(250));
        assert!(!config.push_on_save);
    }
}
