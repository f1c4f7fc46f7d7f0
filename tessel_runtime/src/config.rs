//! Storage engine configuration.
//!
//! All thresholds are resolved once, when a `ShapeTrie` is built. The
//! process-global trie reads them from the environment on first use.

use std::time::Duration;
use thiserror::Error;

/// Number of values a keyed container stores directly in the instance.
///
/// Fixed by the container layout; only the packed threshold above it is tunable.
pub const INLINE_SLOTS: usize = 3;

/// Environment variable overriding `packed_threshold`.
pub const ENV_PACKED_THRESHOLD: &str = "TESSEL_PACKED_THRESHOLD";

/// Environment variable overriding `purge_interval`, in milliseconds.
pub const ENV_PURGE_MS: &str = "TESSEL_SHAPE_PURGE_MS";

/// Configuration for the shape trie and the containers built on it.
///
/// # Example
///
/// ```
/// use tessel_runtime::config::RuntimeConfig;
/// use std::time::Duration;
///
/// let config = RuntimeConfig {
///     packed_threshold: 16,
///     purge_interval: Duration::from_millis(10),
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    // =========================================================================
    // Storage Regimes
    // =========================================================================
    /// Largest key count tracked by shapes.
    ///
    /// Keyed containers with more keys than this switch to dictionary mode and
    /// the shape becomes the shared dictionary sentinel.
    ///
    /// Default: 8
    pub packed_threshold: usize,

    // =========================================================================
    // Purging
    // =========================================================================
    /// Minimum wall-clock time between two purge steps on the same shape.
    ///
    /// Each step inspects at most one cached child. `Duration::ZERO` purges on
    /// every child lookup.
    ///
    /// Default: 100ms
    pub purge_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            packed_threshold: 8,
            purge_interval: Duration::from_millis(100),
        }
    }
}

impl RuntimeConfig {
    /// Smallest accepted packed threshold.
    pub const MIN_PACKED_THRESHOLD: usize = INLINE_SLOTS + 1;

    /// Largest accepted packed threshold.
    pub const MAX_PACKED_THRESHOLD: usize = 1024;

    /// Configuration that enters dictionary mode as early as possible.
    pub fn compact() -> Self {
        Self {
            packed_threshold: Self::MIN_PACKED_THRESHOLD,
            ..Default::default()
        }
    }

    /// Configuration for workloads with wide records.
    pub fn wide() -> Self {
        Self {
            packed_threshold: 32,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.packed_threshold < Self::MIN_PACKED_THRESHOLD {
            return Err(ConfigError::ThresholdTooSmall(self.packed_threshold));
        }
        if self.packed_threshold > Self::MAX_PACKED_THRESHOLD {
            return Err(ConfigError::ThresholdTooLarge(self.packed_threshold));
        }
        Ok(())
    }

    /// Resolve the configuration from environment variables.
    ///
    /// Missing variables keep their defaults. Unparsable or out-of-range values
    /// are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve the configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_PACKED_THRESHOLD) {
            match raw.trim().parse::<usize>() {
                Ok(threshold) => {
                    let candidate = Self {
                        packed_threshold: threshold,
                        ..config.clone()
                    };
                    match candidate.validate() {
                        Ok(()) => config = candidate,
                        Err(err) => {
                            tracing::warn!(variable = ENV_PACKED_THRESHOLD, %err, "ignoring value")
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(variable = ENV_PACKED_THRESHOLD, value = %raw, %err, "ignoring value")
                }
            }
        }

        if let Some(raw) = lookup(ENV_PURGE_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => config.purge_interval = Duration::from_millis(ms),
                Err(err) => {
                    tracing::warn!(variable = ENV_PURGE_MS, value = %raw, %err, "ignoring value")
                }
            }
        }

        config
    }
}

/// Configuration validation errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Packed threshold does not leave room beyond the inline slots.
    #[error("packed threshold {0} must be at least {min}", min = RuntimeConfig::MIN_PACKED_THRESHOLD)]
    ThresholdTooSmall(usize),
    /// Packed threshold exceeds what shapes are allowed to track.
    #[error("packed threshold {0} must be at most {max}", max = RuntimeConfig::MAX_PACKED_THRESHOLD)]
    ThresholdTooLarge(usize),
    /// The global trie was already built with another configuration.
    #[error("global shape trie is already initialized")]
    AlreadyInitialized,
}
