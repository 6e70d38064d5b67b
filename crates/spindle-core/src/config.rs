use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// How fetchers learn that a queue may have work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WakeStrategy {
    /// In-process signal fed only by local writers.
    #[default]
    Local,
    /// Notifications are written to the store and tailed by every process.
    TailNotifications,
}

/// Storage behaviour consumed by the fetcher, the lease and the batcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageOptions {
    /// Age after which an unacknowledged lease is reclaimable.
    /// `None` disables reclamation: a lease is held until released.
    pub invisibility_timeout: Option<Duration>,

    pub wake_strategy: WakeStrategy,

    /// Longest single wait on the wake signal before queues are swept again.
    pub queue_poll_interval: Duration,

    /// How often the notification tailer reads the feed.
    pub notification_poll_interval: Duration,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            invisibility_timeout: None,
            wake_strategy: WakeStrategy::Local,
            queue_poll_interval: Duration::from_secs(15),
            notification_poll_interval: Duration::from_millis(100),
        }
    }
}

impl StorageOptions {
    pub fn with_invisibility_timeout(mut self, timeout: Duration) -> Self {
        self.invisibility_timeout = Some(timeout);
        self
    }

    pub fn with_wake_strategy(mut self, strategy: WakeStrategy) -> Self {
        self.wake_strategy = strategy;
        self
    }

    pub fn with_queue_poll_interval(mut self, interval: Duration) -> Self {
        self.queue_poll_interval = interval;
        self
    }

    pub fn with_notification_poll_interval(mut self, interval: Duration) -> Self {
        self.notification_poll_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        if self.queue_poll_interval.is_zero() {
            return Err(StorageError::invalid_argument(
                "queue_poll_interval",
                "must be greater than zero",
            ));
        }
        if self.notification_poll_interval.is_zero() {
            return Err(StorageError::invalid_argument(
                "notification_poll_interval",
                "must be greater than zero",
            ));
        }
        if self.invisibility_timeout.is_some_and(|t| t.is_zero()) {
            return Err(StorageError::invalid_argument(
                "invisibility_timeout",
                "must be greater than zero when set",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_hold_leases_forever() {
        let options = StorageOptions::default();

        assert_eq!(options.invisibility_timeout, None);
        assert_eq!(options.wake_strategy, WakeStrategy::Local);
        assert!(options.validate().is_ok());
    }

    #[rstest]
    #[case(StorageOptions::default().with_queue_poll_interval(Duration::ZERO))]
    #[case(StorageOptions::default().with_notification_poll_interval(Duration::ZERO))]
    #[case(StorageOptions::default().with_invisibility_timeout(Duration::ZERO))]
    fn zero_durations_are_rejected(#[case] options: StorageOptions) {
        assert!(options.validate().is_err());
    }

    #[test]
    fn options_deserialize_from_json() {
        let json = r#"{
            "invisibility_timeout": { "secs": 1800, "nanos": 0 },
            "wake_strategy": "TailNotifications",
            "queue_poll_interval": { "secs": 1, "nanos": 0 },
            "notification_poll_interval": { "secs": 0, "nanos": 50000000 }
        }"#;

        let options: StorageOptions = serde_json::from_str(json).unwrap();

        assert_eq!(options.invisibility_timeout, Some(Duration::from_secs(1800)));
        assert_eq!(options.wake_strategy, WakeStrategy::TailNotifications);
        assert_eq!(options.notification_poll_interval, Duration::from_millis(50));
    }
}
