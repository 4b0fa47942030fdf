use serde::{Deserialize, Serialize};

/// Main configuration structure for stepwise
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Engine limits
    #[serde(default)]
    pub engine: EngineConfig,

    /// Retry delay configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Engine limits applied to every run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Step failures tolerated per task
    #[serde(default = "default_max_errors")]
    pub max_errors: u32,

    /// Retry decisions tolerated per task
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Retry budget given to generated steps
    #[serde(default = "default_step_max_retries")]
    pub step_max_retries: u32,

    /// Timeout for steps that do not carry their own
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,

    /// Capacity of the engine event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

const fn default_max_errors() -> u32 {
    5
}

const fn default_max_retries() -> u32 {
    10
}

const fn default_step_max_retries() -> u32 {
    3
}

const fn default_event_buffer() -> usize {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_errors: default_max_errors(),
            max_retries: default_max_retries(),
            step_max_retries: default_step_max_retries(),
            step_timeout_secs: None,
            event_buffer: default_event_buffer(),
        }
    }
}

/// Delay applied before a retry is dispatched
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Growth factor between consecutive delays
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

const fn default_initial_backoff_ms() -> u64 {
    100
}

const fn default_max_backoff_ms() -> u64 {
    5_000
}

const fn default_multiplier() -> f64 {
    2.0
}

impl RetryConfig {
    /// No delay between attempts.
    pub const fn immediate() -> Self {
        Self {
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 1.0,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
