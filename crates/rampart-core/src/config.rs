//! Rampart configuration
//!
//! One serde-backed struct per component, every field defaulted so partial
//! files are valid. Loaded from TOML, YAML or JSON.

use crate::backoff::{Backoff, DEFAULT_JITTER_RATIO};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Recovery orchestration settings
    pub recovery: RecoveryConfig,
    /// Diagnostic context store settings
    pub context: ContextConfig,
    /// Lifecycle store settings
    pub lifecycle: LifecycleConfig,
    /// Streaming guardian settings
    pub stream: StreamConfig,
}

impl ResilienceConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With recovery section
    #[inline]
    #[must_use]
    pub fn with_recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = recovery;
        self
    }

    /// With context section
    #[inline]
    #[must_use]
    pub fn with_context(mut self, context: ContextConfig) -> Self {
        self.context = context;
        self
    }

    /// With lifecycle section
    #[inline]
    #[must_use]
    pub fn with_lifecycle(mut self, lifecycle: LifecycleConfig) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// With stream section
    #[inline]
    #[must_use]
    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    /// Parse and validate TOML
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate YAML
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate JSON
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, choosing the format by extension
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        tracing::debug!(path = %path.display(), format = %extension, "loading config");

        match extension.as_str() {
            "toml" => Self::from_toml_str(&contents),
            "yaml" | "yml" => Self::from_yaml_str(&contents),
            "json" => Self::from_json_str(&contents),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Reject values that would break invariants downstream
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.recovery;
        validate_backoff(
            "recovery",
            r.default_base_delay_ms,
            r.default_max_delay_ms,
            r.default_backoff_multiplier,
        )?;
        if !(0.0..1.0).contains(&r.jitter_ratio) {
            return Err(ConfigError::invalid(
                "recovery.jitter_ratio",
                format!("{} is outside [0, 1)", r.jitter_ratio),
            ));
        }

        if self.context.capacity == 0 {
            return Err(ConfigError::invalid(
                "context.capacity",
                "must be greater than zero",
            ));
        }
        if self.context.ttl_ms == 0 {
            return Err(ConfigError::invalid("context.ttl_ms", "must be greater than zero"));
        }
        if self.context.sweep_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "context.sweep_interval_ms",
                "must be greater than zero",
            ));
        }

        if self.lifecycle.max_retained_terminal == Some(0) {
            return Err(ConfigError::invalid(
                "lifecycle.max_retained_terminal",
                "must be greater than zero when set",
            ));
        }

        let s = &self.stream;
        if s.buffer_capacity == 0 {
            return Err(ConfigError::invalid(
                "stream.buffer_capacity",
                "must be greater than zero",
            ));
        }
        if s.staleness_window_ms == 0 || s.heartbeat_check_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "stream.staleness_window_ms",
                "heartbeat window and check interval must be greater than zero",
            ));
        }
        validate_backoff(
            "stream",
            s.reconnect_base_delay_ms,
            s.reconnect_max_delay_ms,
            s.reconnect_multiplier,
        )
    }
}

fn validate_backoff(
    section: &'static str,
    base_ms: u64,
    max_ms: u64,
    multiplier: f64,
) -> Result<(), ConfigError> {
    if !multiplier.is_finite() || multiplier < 1.0 {
        return Err(ConfigError::invalid(
            section,
            format!("backoff multiplier {multiplier} must be >= 1.0"),
        ));
    }
    if base_ms > max_ms {
        return Err(ConfigError::invalid(
            section,
            format!("base delay {base_ms}ms exceeds max delay {max_ms}ms"),
        ));
    }
    Ok(())
}

/// Recovery orchestration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Attempts for categories without a registered policy
    pub default_max_attempts: u32,
    /// Base delay of the fallback policy
    pub default_base_delay_ms: u64,
    /// Delay ceiling of the fallback policy
    pub default_max_delay_ms: u64,
    /// Growth factor of the fallback policy
    pub default_backoff_multiplier: f64,
    /// Symmetric jitter applied to every recovery wait
    pub jitter_ratio: f64,
    /// Pre-register the taxonomy policies
    pub builtin_policies: bool,
}

impl RecoveryConfig {
    /// Backoff curve of the fallback policy
    #[must_use]
    pub fn default_backoff(&self) -> Backoff {
        Backoff::new(
            self.default_base_delay_ms,
            self.default_max_delay_ms,
            self.default_backoff_multiplier,
        )
        .with_jitter(self.jitter_ratio)
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: 3,
            default_base_delay_ms: 1_000,
            default_max_delay_ms: 30_000,
            default_backoff_multiplier: 2.0,
            jitter_ratio: DEFAULT_JITTER_RATIO,
            builtin_policies: true,
        }
    }
}

/// Diagnostic context store settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum retained contexts
    pub capacity: usize,
    /// Retention window
    pub ttl_ms: u64,
    /// Period of the background sweep
    pub sweep_interval_ms: u64,
}

impl ContextConfig {
    /// Retention window
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Sweep period
    #[inline]
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl_ms: 5 * 60 * 1_000,
            sweep_interval_ms: 60 * 1_000,
        }
    }
}

/// Lifecycle store settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Cap on terminal occurrences kept for summaries; `None` keeps all
    pub max_retained_terminal: Option<usize>,
}

/// Streaming guardian settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Silence after which a connected session is considered dead
    pub staleness_window_ms: u64,
    /// How often staleness is checked
    pub heartbeat_check_interval_ms: u64,
    /// Reconnect attempts before giving up
    pub max_reconnect_attempts: u32,
    /// Ring buffer capacity while disconnected
    pub buffer_capacity: usize,
    /// Reconnect backoff base
    pub reconnect_base_delay_ms: u64,
    /// Reconnect backoff ceiling
    pub reconnect_max_delay_ms: u64,
    /// Reconnect backoff growth
    pub reconnect_multiplier: f64,
    /// Reconnect jitter ratio
    pub jitter_ratio: f64,
}

impl StreamConfig {
    /// Staleness window
    #[inline]
    #[must_use]
    pub fn staleness_window(&self) -> Duration {
        Duration::from_millis(self.staleness_window_ms)
    }

    /// Heartbeat check period
    #[inline]
    #[must_use]
    pub fn heartbeat_check_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_check_interval_ms)
    }

    /// Reconnect backoff curve
    #[must_use]
    pub fn reconnect_backoff(&self) -> Backoff {
        Backoff::new(
            self.reconnect_base_delay_ms,
            self.reconnect_max_delay_ms,
            self.reconnect_multiplier,
        )
        .with_jitter(self.jitter_ratio)
    }

    /// With buffer capacity
    #[inline]
    #[must_use]
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// With max reconnect attempts
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Without reconnect jitter
    #[inline]
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter_ratio = 0.0;
        self
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            staleness_window_ms: 60_000,
            heartbeat_check_interval_ms: 5_000,
            max_reconnect_attempts: 5,
            buffer_capacity: 100,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            reconnect_multiplier: 2.0,
            jitter_ratio: DEFAULT_JITTER_RATIO,
        }
    }
}
