//! Task configuration.
//!
//! [`TaskConfig`] collects the knobs shared by every control block: how its
//! thread is named and sized, how fast the escort guard polls, and what
//! happens when a finished notification panics.
//!
//! With the `config-file` feature the configuration can be loaded from TOML:
//!
//! ```toml
//! thread_name_prefix = "ingest"
//! escort_poll_interval_us = 250
//! finished_panic_policy = "capture"
//! ```

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Smallest stack a task thread may be configured with.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Errors produced while loading or validating a [`TaskConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration text is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(String),
    /// A field holds a value the runtime cannot honour.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        Self::from_source(crate::error::ErrorKind::InvalidOperation, e)
    }
}

/// What to do when a finished notification panics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishedPanicPolicy {
    /// Log the panic and keep the task's own outcome.
    #[default]
    Log,
    /// Record the panic as the task's failure when the body itself succeeded.
    Capture,
}

/// Configuration shared by control blocks.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Prefix for task thread names; the task id is appended.
    pub thread_name_prefix: String,
    /// Stack size for task threads. `None` uses the platform default.
    pub stack_size: Option<usize>,
    /// Escort guard backoff while the escorted worker is running, in µs.
    pub escort_poll_interval_us: u64,
    /// Pulse the escorting task before and after a wrapped region.
    pub pulse_around_escort: bool,
    /// Policy for panics raised by finished notifications.
    pub finished_panic_policy: FinishedPanicPolicy,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: "taskward".to_string(),
            stack_size: None,
            escort_poll_interval_us: 500,
            pulse_around_escort: true,
            finished_panic_policy: FinishedPanicPolicy::Log,
        }
    }
}

impl TaskConfig {
    /// Returns the escort poll interval as a `Duration`.
    #[must_use]
    pub fn escort_poll_interval(&self) -> Duration {
        Duration::from_micros(self.escort_poll_interval_us)
    }

    /// Sets the escort poll interval.
    #[must_use]
    pub fn with_escort_poll_interval(mut self, interval: Duration) -> Self {
        self.escort_poll_interval_us = u64::try_from(interval.as_micros()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the finished-notification panic policy.
    #[must_use]
    pub fn with_finished_panic_policy(mut self, policy: FinishedPanicPolicy) -> Self {
        self.finished_panic_policy = policy;
        self
    }

    /// Checks that every field holds a usable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.escort_poll_interval_us == 0 {
            return Err(ConfigError::Invalid {
                field: "escort_poll_interval_us",
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(size) = self.stack_size {
            if size < MIN_STACK_SIZE {
                return Err(ConfigError::Invalid {
                    field: "stack_size",
                    reason: format!("{size} is below the minimum of {MIN_STACK_SIZE}"),
                });
            }
        }
        if self.thread_name_prefix.contains('\0') {
            return Err(ConfigError::Invalid {
                field: "thread_name_prefix",
                reason: "must not contain NUL bytes".to_string(),
            });
        }
        Ok(())
    }

    /// Parses and validates a configuration from TOML text.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML configuration file.
    #[cfg(feature = "config-file")]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TaskConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.escort_poll_interval(), Duration::from_micros(500));
        assert!(config.pulse_around_escort);
        assert_eq!(config.finished_panic_policy, FinishedPanicPolicy::Log);
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let config = TaskConfig::default().with_escort_poll_interval(Duration::ZERO);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("escort_poll_interval_us"), "{err}");
    }

    #[test]
    fn tiny_stack_rejected() {
        let config = TaskConfig {
            stack_size: Some(1024),
            ..TaskConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "stack_size", .. }));
    }

    #[test]
    fn config_error_converts_to_invalid_operation() {
        let err: crate::error::Error = ConfigError::Parse("bad".into()).into();
        assert!(err.is_invalid_operation());
        assert!(err.to_string().contains("bad"));
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn parses_partial_toml() {
        let config = TaskConfig::from_toml_str(
            r#"
            thread_name_prefix = "ingest"
            escort_poll_interval_us = 250
            finished_panic_policy = "capture"
            "#,
        )
        .unwrap();
        assert_eq!(config.thread_name_prefix, "ingest");
        assert_eq!(config.escort_poll_interval(), Duration::from_micros(250));
        assert_eq!(config.finished_panic_policy, FinishedPanicPolicy::Capture);
        assert!(config.pulse_around_escort, "unset fields use defaults");
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn rejects_invalid_toml_values() {
        let err = TaskConfig::from_toml_str("escort_poll_interval_us = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let err = TaskConfig::from_toml_str("stack_size = \"big\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
