//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (rates within 0..=100, status codes, timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("bad {field}: {value} is outside the range [0, 100]")]
    RateOutOfRange { field: &'static str, value: u8 },

    #[error("bad status code {code} for prefix {prefix:?}: expected a value in [100, 599]")]
    InvalidStatusCode { prefix: String, code: u16 },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let rates = [
        ("failure_rate", config.faults.failure_rate),
        ("transfer_failure_rate", config.faults.transfer_failure_rate),
    ];
    for (field, value) in rates {
        if value > 100 {
            errors.push(ValidationError::RateOutOfRange { field, value });
        }
    }

    for (prefix, code) in config.faults.fail_with_prefix.iter() {
        if !(100..=599).contains(&code) {
            errors.push(ValidationError::InvalidStatusCode {
                prefix: prefix.to_string(),
                code,
            });
        }
    }

    let positive = [
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.upstream_secs", config.timeouts.upstream_secs),
        ("observability.counters_interval_secs", config.observability.counters_interval_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
