//! Configuration types for the dispatch core

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::adapter::{parse_expires_in, Timing};
use crate::{PollyError, Result};

/// Session-wide operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Perform requests live and persist them
    Record,
    /// Serve requests from stored recordings
    #[default]
    Replay,
    /// Let every request reach the network untouched
    Passthrough,
    /// Session has been stopped; no request is handled
    #[serde(skip)]
    Stopped,
}

impl Mode {
    /// Check if mode is Record
    #[must_use]
    pub fn is_record(&self) -> bool {
        matches!(self, Mode::Record)
    }

    /// Check if mode is Replay
    #[must_use]
    pub fn is_replay(&self) -> bool {
        matches!(self, Mode::Replay)
    }

    /// Check if mode is Passthrough
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Mode::Passthrough)
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Operating mode
    #[serde(default)]
    pub mode: Mode,
    /// Record when no stored entry matches a replayed request
    #[serde(default = "default_true")]
    pub record_if_missing: bool,
    /// Re-record entries older than `expires_in`
    #[serde(default)]
    pub record_if_expired: bool,
    /// Maximum entry age, e.g. `"30d"` or `"1h 30m"`
    #[serde(default)]
    pub expires_in: Option<String>,
    /// Simulated replay latency
    #[serde(default)]
    pub timing: Option<TimingConfig>,
}

/// Serializable timing options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingConfig {
    /// Wait a constant number of milliseconds
    FixedMs(u64),
    /// Scale the recorded latency by a ratio
    Relative(f64),
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Replay,
            record_if_missing: true,
            record_if_expired: false,
            expires_in: None,
            timing: None,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PollyError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be parsed or is invalid
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PollyError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.mode == Mode::Stopped {
            return Err(PollyError::ConfigError(
                "Mode `stopped` cannot be configured".to_string(),
            ));
        }

        self.expires_in_duration()?;

        match self.timing {
            Some(TimingConfig::Relative(ratio)) if !ratio.is_finite() || ratio < 0.0 => {
                Err(PollyError::ConfigError(format!(
                    "timing.relative must be a non-negative number, got {ratio}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Parsed `expires_in`, `None` when entries never expire
    ///
    /// # Errors
    ///
    /// Returns error if `expires_in` is not a valid duration string
    pub fn expires_in_duration(&self) -> Result<Option<Duration>> {
        self.expires_in
            .as_deref()
            .map(|raw| {
                parse_expires_in(raw).ok_or_else(|| {
                    PollyError::ConfigError(format!("Invalid expires_in: {raw:?}"))
                })
            })
            .transpose()
    }

    /// Timing policy described by this configuration
    #[must_use]
    pub fn timing_policy(&self) -> Timing {
        match self.timing {
            None => Timing::None,
            Some(TimingConfig::FixedMs(ms)) => Timing::Fixed(Duration::from_millis(ms)),
            Some(TimingConfig::Relative(ratio)) => Timing::Relative(ratio),
        }
    }
}
