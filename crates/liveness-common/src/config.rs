//! Configuration structures for the liveness daemon.
//!
//! Supports TOML deserialization with defaults matching the operational
//! deployment, plus environment overrides for the health-check settings
//! an orchestrator injects into the container.

use crate::normalize::InputTimestampMode;
use crate::time::CanonicalTimestamp;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Largest idle threshold the nanosecond idle clock can represent.
pub const MAX_IDLE_THRESHOLD: Duration = Duration::from_nanos(i64::MAX.unsigned_abs());

/// Environment variable enabling the health check endpoint.
pub const ENV_HEALTH_CHECK_ENABLED: &str = "HEALTH_CHECK_ENABLED";
/// Environment variable holding the idle threshold in (fractional) seconds.
pub const ENV_HEALTH_CHECK_IDLE_SECONDS: &str = "HEALTH_CHECK_IDLE_SECONDS";
/// Environment variable overriding the bind host.
pub const ENV_HEALTH_CHECK_HOST: &str = "HEALTH_CHECK_HOST";
/// Environment variable overriding the bind port.
pub const ENV_HEALTH_CHECK_PORT: &str = "HEALTH_CHECK_PORT";

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Liveness endpoint configuration.
    pub health_check: HealthCheckConfig,

    /// Simulated pipeline configuration.
    pub pipeline: PipelineConfig,
}

/// Health check endpoint configuration. Immutable once the supervisor starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Bind the liveness listener at all.
    pub enabled: bool,

    /// Maximum tolerated gap between observed data units.
    #[serde(with = "humantime_serde")]
    pub idle_threshold: Duration,

    /// Host or address to bind.
    pub bind_host: String,

    /// Port to bind.
    pub bind_port: u16,

    /// How probes map onto idle trackers.
    pub binding: TrackerBinding,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            idle_threshold: Duration::from_secs(120),
            bind_host: String::from("0.0.0.0"),
            bind_port: 8080,
            binding: TrackerBinding::Shared,
        }
    }
}

/// How activity probes map onto idle trackers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackerBinding {
    /// Every probe feeds one tracker: alive if data passes any point.
    #[default]
    Shared,
    /// Each probe gets its own tracker: alive only if data passes every point.
    PerProbe,
}

/// Simulated media pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Observation points to probe, as `element` or `element:pad`.
    pub observe: Vec<String>,

    /// Interval between generated data units.
    #[serde(with = "humantime_serde")]
    pub unit_interval: Duration,

    /// How the source's raw timestamps are interpreted.
    pub timestamp_mode: InputTimestampMode,

    /// RFC 3339 start time for `start_at_fixed_time`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_utc: Option<String>,

    /// Stop producing data after this long, to exercise the liveness check.
    #[serde(
        with = "humantime_serde_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub stall_after: Option<Duration>,

    /// Number of leading units stamped with stream-relative PTS instead of
    /// NTP capture time, as RTSP sources do before the first sender report.
    /// These cannot be converted and are dropped. Only valid in `ntp` mode.
    pub invalid_warmup_units: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            observe: vec![String::from("sink:sink")],
            unit_interval: Duration::from_millis(40),
            timestamp_mode: InputTimestampMode::Ntp,
            start_utc: None,
            stall_after: None,
            invalid_warmup_units: 0,
        }
    }
}

impl PipelineConfig {
    /// Start timestamp for `start_at_fixed_time`, or the sentinel if unset.
    ///
    /// # Errors
    ///
    /// Returns an error if `start_utc` is set but not RFC 3339.
    pub fn start_timestamp(&self) -> Result<CanonicalTimestamp, ConfigError> {
        match &self.start_utc {
            Some(s) => CanonicalTimestamp::parse_rfc3339(s).map_err(|e| ConfigError::Invalid {
                key: "pipeline.start_utc",
                reason: e.to_string(),
            }),
            None => Ok(CanonicalTimestamp::INVALID),
        }
    }
}

impl HealthCheckConfig {
    /// `host:port` string for binding, bracketing IPv6 literals.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        if self.bind_host.contains(':') && !self.bind_host.starts_with('[') {
            format!("[{}]:{}", self.bind_host, self.bind_port)
        } else {
            format!("{}:{}", self.bind_host, self.bind_port)
        }
    }

    /// Apply `HEALTH_CHECK_*` overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable value.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply `HEALTH_CHECK_*` overrides from an arbitrary lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable value.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_HEALTH_CHECK_ENABLED) {
            self.enabled = parse_bool(&value).ok_or_else(|| ConfigError::Invalid {
                key: ENV_HEALTH_CHECK_ENABLED,
                reason: format!("{value:?} is not a boolean"),
            })?;
        }
        if let Some(value) = lookup(ENV_HEALTH_CHECK_IDLE_SECONDS) {
            self.idle_threshold = parse_idle_seconds(&value)?;
        }
        if let Some(value) = lookup(ENV_HEALTH_CHECK_HOST) {
            self.bind_host = value;
        }
        if let Some(value) = lookup(ENV_HEALTH_CHECK_PORT) {
            self.bind_port = value.trim().parse().map_err(|e| ConfigError::Invalid {
                key: ENV_HEALTH_CHECK_PORT,
                reason: format!("{value:?}: {e}"),
            })?;
        }
        Ok(())
    }

    /// Check invariants that must hold before the supervisor starts.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_threshold.is_zero() {
            return Err(ConfigError::Invalid {
                key: "health_check.idle_threshold",
                reason: "must be greater than zero".into(),
            });
        }
        if self.idle_threshold > MAX_IDLE_THRESHOLD {
            return Err(ConfigError::Invalid {
                key: "health_check.idle_threshold",
                reason: format!(
                    "must not exceed {}",
                    humantime::format_duration(MAX_IDLE_THRESHOLD)
                ),
            });
        }
        if self.bind_host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "health_check.bind_host",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.health_check.validate()?;
        if self.pipeline.unit_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "pipeline.unit_interval",
                reason: "must be greater than zero".into(),
            });
        }
        if self.pipeline.timestamp_mode == InputTimestampMode::StartAtFixedTime
            && self.pipeline.start_utc.is_none()
        {
            return Err(ConfigError::Invalid {
                key: "pipeline.start_utc",
                reason: "required when timestamp_mode is start_at_fixed_time".into(),
            });
        }
        if self.pipeline.invalid_warmup_units > 0
            && self.pipeline.timestamp_mode != InputTimestampMode::Ntp
        {
            return Err(ConfigError::Invalid {
                key: "pipeline.invalid_warmup_units",
                reason: format!(
                    "only supported with timestamp_mode ntp, not {}",
                    self.pipeline.timestamp_mode
                ),
            });
        }
        self.pipeline.start_timestamp()?;
        Ok(())
    }
}

/// Parse a boolean the way command-line flags and environment variables spell them.
///
/// Accepts `y`, `yes`, `t`, `true`, `on`, `1` and `n`, `no`, `f`, `false`,
/// `off`, `0`, case-insensitively.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Some(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Parse an idle threshold given as (fractional) seconds.
///
/// # Errors
///
/// Returns an error unless the value is a positive, finite number of
/// seconds no larger than [`MAX_IDLE_THRESHOLD`].
pub fn parse_idle_seconds(value: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        key: ENV_HEALTH_CHECK_IDLE_SECONDS,
        reason,
    };
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|e| invalid(format!("{value:?}: {e}")))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(invalid(format!("{value:?} must be a positive number of seconds")));
    }
    let threshold =
        Duration::try_from_secs_f64(secs).map_err(|e| invalid(format!("{value:?}: {e}")))?;
    if threshold > MAX_IDLE_THRESHOLD {
        return Err(invalid(format!(
            "{value:?} exceeds the maximum of {} seconds",
            MAX_IDLE_THRESHOLD.as_secs()
        )));
    }
    Ok(threshold)
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is present but unusable.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Configuration key or environment variable.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

/// Same as `humantime_serde`, for optional durations.
mod humantime_serde_opt {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_str(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
