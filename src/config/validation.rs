//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (percentages, bucket geometry, addresses)
//! - Warn about overlapping governance flags (force_open wins over force_close)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{CommandConfig, GuardConfig};
use crate::resilience::pool::MAX_CONCURRENT_CEILING;
use crate::rolling::window::MAX_ROLLING_BUCKETS;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{scope}: error_percent_threshold {value} is above 100")]
    ErrorPercentOutOfRange { scope: String, value: u32 },

    #[error("{scope}: max_concurrent_requests {value} exceeds the ceiling of {}", MAX_CONCURRENT_CEILING)]
    ConcurrencyAboveCeiling { scope: String, value: usize },

    #[error("{scope}: rolling_window_ms {window_ms} is shorter than one millisecond per bucket ({buckets} buckets)")]
    BucketTooNarrow { scope: String, window_ms: u64, buckets: usize },

    #[error("{scope}: rolling_buckets {value} exceeds the ceiling of {}", MAX_ROLLING_BUCKETS)]
    TooManyBuckets { scope: String, value: usize },

    #[error("circuit name must not be empty")]
    EmptyCircuitName,

    #[error("observability: invalid metrics_address '{0}'")]
    InvalidMetricsAddress(String),
}

/// Validate a whole configuration, collecting every error.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_command("defaults", &config.defaults, &mut errors);

    let mut names: Vec<&String> = config.circuits.keys().collect();
    names.sort();
    for name in names {
        if name.trim().is_empty() {
            errors.push(ValidationError::EmptyCircuitName);
            continue;
        }
        validate_command(&format!("circuits.{}", name), &config.circuits[name], &mut errors);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn validate_command(scope: &str, config: &CommandConfig, errors: &mut Vec<ValidationError>) {
    if config.error_percent_threshold > 100 {
        errors.push(ValidationError::ErrorPercentOutOfRange {
            scope: scope.to_string(),
            value: config.error_percent_threshold,
        });
    }

    if config.max_concurrent_requests > MAX_CONCURRENT_CEILING {
        errors.push(ValidationError::ConcurrencyAboveCeiling {
            scope: scope.to_string(),
            value: config.max_concurrent_requests,
        });
    }

    if config.rolling_window_ms != 0
        && config.rolling_buckets != 0
        && config.rolling_window_ms < config.rolling_buckets as u64
    {
        errors.push(ValidationError::BucketTooNarrow {
            scope: scope.to_string(),
            window_ms: config.rolling_window_ms,
            buckets: config.rolling_buckets,
        });
    }

    if config.rolling_buckets > MAX_ROLLING_BUCKETS {
        errors.push(ValidationError::TooManyBuckets {
            scope: scope.to_string(),
            value: config.rolling_buckets,
        });
    }

    if config.force_open && config.force_close {
        tracing::warn!(scope, "force_open and force_close are both set; force_open wins");
    }
}
