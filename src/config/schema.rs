//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.
//!
//! ```toml
//! [defaults]
//! timeout_ms = 1000
//! max_concurrent_requests = 10
//!
//! [circuits.payments]
//! timeout_ms = 250
//! error_percent_threshold = 25
//!
//! [observability]
//! log_level = "info"
//! ```

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GuardConfig {
    /// Overrides applied on top of the built-in global defaults.
    pub defaults: CommandConfig,

    /// Per-circuit overrides keyed by circuit name.
    pub circuits: HashMap<String, CommandConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Tunables for one circuit.
///
/// Numeric fields use `0` as "not set": the previously configured value (or
/// the global default) is kept. Boolean fields have no unset state and are
/// applied as given.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CommandConfig {
    /// Deadline for the wrapped work in milliseconds.
    pub timeout_ms: u64,

    /// Executor pool capacity (clamped to 1000).
    pub max_concurrent_requests: usize,

    /// Minimum calls in the rolling window before the circuit may trip.
    pub request_volume_threshold: u64,

    /// Minimum interval between recovery probes while open, in milliseconds.
    pub sleep_window_ms: u64,

    /// Error percentage at which the circuit trips.
    pub error_percent_threshold: u32,

    /// Span of the rolling statistics window in milliseconds.
    pub rolling_window_ms: u64,

    /// Number of buckets the rolling window is split into.
    pub rolling_buckets: usize,

    /// Enforce `timeout_ms`; when false the guard waits for the work to finish.
    pub timeout_enabled: bool,

    /// Consult the breaker before admitting calls.
    pub circuit_breaker_enabled: bool,

    /// Skip the work entirely and go straight to the fallback.
    pub force_fallback: bool,

    /// Deny every call (checked before `force_close`).
    pub force_open: bool,

    /// Admit every call regardless of health.
    pub force_close: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 0,
            max_concurrent_requests: 0,
            request_volume_threshold: 0,
            sleep_window_ms: 0,
            error_percent_threshold: 0,
            rolling_window_ms: 0,
            rolling_buckets: 0,
            timeout_enabled: true,
            circuit_breaker_enabled: true,
            force_fallback: false,
            force_open: false,
            force_close: false,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
