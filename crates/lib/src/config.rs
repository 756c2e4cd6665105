//! Positioning configuration.
//!
//! Every constant that shapes key allocation is a tunable here rather than a
//! hidden literal: the step used at either end of a container, the minimum
//! gap below which a midpoint counts as exhausted, the spacing a rebalance
//! lays keys out with, and the retry policy for conflicting writes.
//!
//! Every field has a default, so a partial JSON document is valid:
//!
//! ```
//! use ordinal::Config;
//!
//! let config: Config = serde_json::from_str(r#"{ "rebalance_spacing": 64.0 }"#).unwrap();
//! assert_eq!(config.rebalance_spacing, 64.0);
//! assert_eq!(config.retry.max_attempts, 5);
//! config.validate().unwrap();
//! ```

use std::path::Path;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::position::{AllocatorConfig, PositionError};
use crate::rebalance::DEFAULT_SPACING;

/// Bounded retry with exponential backoff and full jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Backoff ceiling before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for any single backoff, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 2,
            max_delay_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// Retry immediately, never sleep. Handy in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Backoff to wait after `attempt` (1-based) failed.
    ///
    /// Drawn uniformly from `[0, min(max, base * 2^(attempt-1))]`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let ceiling = self
            .base_delay_ms
            .saturating_mul(1 << exp)
            .min(self.max_delay_ms);
        if ceiling == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
    }
}

/// Configuration for an [`OrderedCollection`](crate::OrderedCollection).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub allocator: AllocatorConfig,
    /// Key distance between neighbours right after a rebalance.
    pub rebalance_spacing: f64,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allocator: AllocatorConfig::default(),
            rebalance_spacing: DEFAULT_SPACING,
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Loads a configuration from a JSON file.
    pub async fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the settings can work together.
    pub fn validate(&self) -> std::result::Result<(), PositionError> {
        self.allocator.validate()?;
        let spacing = self.rebalance_spacing;
        if !spacing.is_finite() || spacing <= 0.0 {
            return Err(PositionError::InvalidConfig {
                reason: format!("rebalance_spacing must be finite and positive, got {spacing}"),
            });
        }
        if self.allocator.min_gap * 2.0 >= spacing {
            return Err(PositionError::InvalidConfig {
                reason: format!(
                    "min_gap ({}) leaves no room inside a rebalanced gap of {spacing}",
                    self.allocator.min_gap
                ),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(PositionError::InvalidConfig {
                reason: "retry.max_attempts must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
