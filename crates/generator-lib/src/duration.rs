//! Duration strings used throughout the topology document (`250ms`, `5m`, `1h 30m`)

use crate::error::ConfigError;
use std::time::Duration;

/// Parse a human-readable duration, naming `field` in the error
pub fn parse_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|e| ConfigError::InvalidDuration {
        field: field.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Parse an optional duration, falling back to `default` when absent
pub fn parse_optional(
    field: &str,
    value: Option<&str>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => parse_duration(field, v),
        _ => Ok(default),
    }
}

pub fn to_chrono(duration: Duration) -> chrono::Duration {
    // Out-of-range durations saturate at roughly a millennium
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(52 * 1000))
}
