//! Error taxonomy for the generation engine
//!
//! Configuration and validation errors are fatal at load time. Generation
//! errors are reported by sinks and are logged and dropped by the scheduler.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error returned by engine construction and flag control
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Flag(#[from] FlagError),
}

/// Malformed input detected while loading a topology document
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON topology: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse YAML topology: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("cannot infer topology format from {0} (expected .json, .yaml or .yml)")]
    UnsupportedFormat(PathBuf),

    #[error("invalid duration {value:?} for {field}: {reason}")]
    InvalidDuration {
        field: String,
        value: String,
        reason: String,
    },

    #[error("route {service}/{route} must set maxLatencyMillis or latencyConfigs")]
    MissingLatency { service: String, route: String },

    #[error("route {service}/{route} sets both maxLatencyMillis and latencyConfigs")]
    ConflictingLatency { service: String, route: String },

    #[error("route {service}/{route} needs exactly one latencyConfigs entry without flags, found {found}")]
    DefaultLatency {
        service: String,
        route: String,
        found: usize,
    },

    #[error("latency percentiles for {field} are not ascending")]
    UnorderedPercentiles { field: String },

    #[error("metric {metric} of service {service} has unknown type {kind:?}")]
    UnknownMetricType {
        service: String,
        metric: String,
        kind: String,
    },

    #[error("metric {metric} of service {service} has invalid range min {min}, max {max}")]
    InvalidMetricRange {
        service: String,
        metric: String,
        min: f64,
        max: f64,
    },

    #[error("metric {metric} of service {service} has invalid jitter {jitter}")]
    InvalidMetricJitter {
        service: String,
        metric: String,
        jitter: f64,
    },

    #[error("flag {flag} has invalid cron expression {expression:?}: {reason}")]
    InvalidCron {
        flag: String,
        expression: String,
        reason: String,
    },

    #[error("csv tag {key} from {}: {reason}", path.display())]
    CsvTags {
        key: String,
        path: PathBuf,
        reason: String,
    },
}

/// A single structural problem found by validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{referenced_by} references unknown service {service}")]
    UnknownService {
        service: String,
        referenced_by: String,
    },

    #[error("{referenced_by} references unknown route {service}/{route}")]
    UnknownRoute {
        service: String,
        route: String,
        referenced_by: String,
    },

    #[error("{referenced_by} references unknown flag {flag}")]
    UnknownFlag {
        flag: String,
        referenced_by: String,
    },

    #[error("cycle detected at {edge}: {path}")]
    CyclicGraph { edge: String, path: String },

    #[error("cyclic flag parents: {path}")]
    CyclicFlags { path: String },

    #[error("flag {flag} has unknown parent flag {parent}")]
    MissingParentFlag { flag: String, parent: String },

    #[error("incident of flag {flag} is invalid: {reason}")]
    InvalidIncident { flag: String, reason: String },

    #[error("flag {flag} is declared more than once")]
    DuplicateFlag { flag: String },

    #[error("root route {service}/{route} is invalid: {reason}")]
    InvalidRootRoute {
        service: String,
        route: String,
        reason: String,
    },
}

/// Every validation failure found in one pass, reported as a single error
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    /// Ok when nothing was collected
    pub fn into_result(self) -> std::result::Result<(), ValidationErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "topology validation failed: ")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self(vec![error])
    }
}

/// Failure to hand a finished batch to the downstream sink
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("sink rejected {signal} batch: {reason}")]
    SinkRejected {
        signal: &'static str,
        reason: String,
    },

    #[error("sink channel closed")]
    SinkClosed,

    #[error("failed to encode {signal} batch: {source}")]
    Encode {
        signal: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Rejected flag control request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagError {
    #[error("unknown flag {0}")]
    Unknown(String),

    #[error("flag {0} follows its incident parent and cannot be toggled directly")]
    Derived(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_join_messages() {
        let mut errors = ValidationErrors::new();
        errors.push(ValidationError::UnknownFlag {
            flag: "deploy".to_string(),
            referenced_by: "route frontend/product".to_string(),
        });
        errors.push(ValidationError::CyclicFlags {
            path: "a -> b -> a".to_string(),
        });

        let message = errors.to_string();
        assert!(message.contains("unknown flag deploy"));
        assert!(message.contains("; cyclic flag parents: a -> b -> a"));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_empty_validation_errors_is_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }
}
