//! Tunables shared by the host-side providers and transports.

use std::time::Duration;

use crate::error::{BridgeError, Result};

/// Runtime configuration for the bridge.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use fsbridge::BridgeConfig;
///
/// let config = BridgeConfig::default()
///     .with_poll_interval(Duration::from_millis(250))
///     .with_stat_concurrency(4);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Period between scans of a polling watcher
    pub poll_interval: Duration,
    /// Scan the tree periodically instead of using OS notifications
    pub use_polling: bool,
    /// Bytes moved per read/write step; cancellation is checked between steps
    pub io_chunk_size: usize,
    /// Entries stat'ed concurrently while listing a directory
    pub stat_concurrency: usize,
    /// Capacity of the bounded message channels
    pub channel_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            use_polling: true,
            io_chunk_size: 64 * 1024,
            stat_concurrency: 16,
            channel_capacity: 256,
        }
    }
}

impl BridgeConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_polling(mut self, enabled: bool) -> Self {
        self.use_polling = enabled;
        self
    }

    pub fn with_io_chunk_size(mut self, size: usize) -> Self {
        self.io_chunk_size = size;
        self
    }

    pub fn with_stat_concurrency(mut self, workers: usize) -> Self {
        self.stat_concurrency = workers;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Reject values the providers cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(BridgeError::InvalidConfig(
                "poll_interval must be non-zero".to_string(),
            ));
        }
        if self.io_chunk_size == 0 {
            return Err(BridgeError::InvalidConfig(
                "io_chunk_size must be at least 1".to_string(),
            ));
        }
        if self.stat_concurrency == 0 {
            return Err(BridgeError::InvalidConfig(
                "stat_concurrency must be at least 1".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(BridgeError::InvalidConfig(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert!(config.use_polling);
        assert_eq!(config.io_chunk_size, 65536);
        assert_eq!(config.stat_concurrency, 16);
        assert_eq!(config.channel_capacity, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let config = BridgeConfig::default()
            .with_polling(false)
            .with_io_chunk_size(10)
            .with_channel_capacity(8);
        assert!(!config.use_polling);
        assert_eq!(config.io_chunk_size, 10);
        assert_eq!(config.channel_capacity, 8);
    }

    #[test]
    fn test_validate_rejects_zero() {
        assert!(BridgeConfig::default()
            .with_poll_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(BridgeConfig::default()
            .with_io_chunk_size(0)
            .validate()
            .is_err());
        assert!(BridgeConfig::default()
            .with_stat_concurrency(0)
            .validate()
            .is_err());
        assert!(BridgeConfig::default()
            .with_channel_capacity(0)
            .validate()
            .is_err());
    }
}
