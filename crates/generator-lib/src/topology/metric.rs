//! Metric definitions and their resolved runtime form

use crate::duration::parse_optional;
use crate::error::ConfigError;
use crate::flags::{FlagEngine, FlagGate};
use crate::models::MetricKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::time::Duration;

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60 * 60);

/// Waveform a metric follows over its period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    #[default]
    Sine,
    Sawtooth,
    Square,
    Triangle,
    Average,
    /// Grows every tick until the bound pod restarts
    Leaking,
}

impl Shape {
    /// Factor in `[0, 1]` for a phase in `[0, 1)`. `Leaking` has no
    /// phase-only value and yields `None`.
    pub fn periodic_factor(self, phase: f64) -> Option<f64> {
        let factor = match self {
            Shape::Sine => ((2.0 * PI * phase).sin() + 1.0) / 2.0,
            Shape::Sawtooth => phase,
            Shape::Square => {
                if phase < 0.5 {
                    0.0
                } else {
                    1.0
                }
            }
            Shape::Triangle => 1.0 - 2.0 * (0.5 - phase).abs(),
            Shape::Average => 0.5,
            Shape::Leaking => return None,
        };
        Some(factor)
    }
}

/// A metric as declared under a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricConfig {
    pub name: String,

    /// `Gauge` or `Sum`, case-insensitive
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub min: f64,

    #[serde(default)]
    pub max: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,

    #[serde(default)]
    pub shape: Shape,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,

    #[serde(default)]
    pub jitter: f64,

    #[serde(flatten)]
    pub gate: FlagGate,
}

impl MetricConfig {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            min,
            max,
            period: None,
            offset: None,
            shape: Shape::default(),
            tags: BTreeMap::new(),
            jitter: 0.0,
            gate: FlagGate::default(),
        }
    }

    pub fn resolve(&self, service: &str) -> Result<MetricSeries, ConfigError> {
        let kind = match self.kind.to_ascii_lowercase().as_str() {
            "gauge" => MetricKind::Gauge,
            "sum" => MetricKind::Sum,
            _ => {
                return Err(ConfigError::UnknownMetricType {
                    service: service.to_string(),
                    metric: self.name.clone(),
                    kind: self.kind.clone(),
                })
            }
        };

        // NaN fails every comparison, so test for the good case
        let ordered = self.min.is_finite() && self.max.is_finite() && self.min <= self.max;
        if !ordered {
            return Err(ConfigError::InvalidMetricRange {
                service: service.to_string(),
                metric: self.name.clone(),
                min: self.min,
                max: self.max,
            });
        }
        if !self.jitter.is_finite() {
            return Err(ConfigError::InvalidMetricJitter {
                service: service.to_string(),
                metric: self.name.clone(),
                jitter: self.jitter,
            });
        }

        let field = |what: &str| format!("metric {} of service {} {}", self.name, service, what);
        let mut period = parse_optional(&field("period"), self.period.as_deref(), DEFAULT_PERIOD)?;
        if period.is_zero() {
            period = DEFAULT_PERIOD;
        }
        let offset = parse_optional(&field("offset"), self.offset.as_deref(), Duration::ZERO)?;

        Ok(MetricSeries {
            name: self.name.clone(),
            kind,
            min: self.min,
            max: self.max,
            period,
            offset,
            shape: self.shape,
            tags: self.tags.clone(),
            jitter: self.jitter.max(0.0),
            gate: self.gate.clone(),
            leak_interval: None,
        })
    }
}

/// A metric ready for generation
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    pub name: String,
    pub kind: MetricKind,
    pub min: f64,
    pub max: f64,
    pub period: Duration,
    pub offset: Duration,
    pub shape: Shape,
    /// Values may carry pod placeholders such as `$pod_name`
    pub tags: BTreeMap<String, String>,
    pub jitter: f64,
    pub gate: FlagGate,
    /// Time a leak takes to fill half of `[min, max]`, twice over a
    /// restart interval; falls back to `period` when unset
    pub leak_interval: Option<Duration>,
}

impl MetricSeries {
    pub fn constant(name: &str, kind: MetricKind, value: f64) -> Self {
        Self {
            name: name.to_string(),
            kind,
            min: value,
            max: value,
            period: DEFAULT_PERIOD,
            offset: Duration::ZERO,
            shape: Shape::Average,
            tags: BTreeMap::new(),
            jitter: 0.0,
            gate: FlagGate::default(),
            leak_interval: None,
        }
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn should_generate(&self, flags: &FlagEngine) -> bool {
        self.gate.should_generate(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveforms() {
        let close = |a: f64, b: f64| (a - b).abs() < 1e-9;

        assert!(close(Shape::Sine.periodic_factor(0.0).unwrap(), 0.5));
        assert!(close(Shape::Sine.periodic_factor(0.25).unwrap(), 1.0));
        assert!(close(Shape::Sine.periodic_factor(0.75).unwrap(), 0.0));
        assert!(close(Shape::Sawtooth.periodic_factor(0.3).unwrap(), 0.3));
        assert_eq!(Shape::Square.periodic_factor(0.49), Some(0.0));
        assert_eq!(Shape::Square.periodic_factor(0.5), Some(1.0));
        assert!(close(Shape::Triangle.periodic_factor(0.5).unwrap(), 1.0));
        assert!(close(Shape::Triangle.periodic_factor(0.0).unwrap(), 0.0));
        assert_eq!(Shape::Average.periodic_factor(0.9), Some(0.5));
        assert_eq!(Shape::Leaking.periodic_factor(0.1), None);
    }

    #[test]
    fn test_resolve_defaults() {
        let series = MetricConfig::new("requests", "gauge", 1.0, 5.0)
            .resolve("api")
            .unwrap();
        assert_eq!(series.kind, MetricKind::Gauge);
        assert_eq!(series.period, DEFAULT_PERIOD);
        assert_eq!(series.offset, Duration::ZERO);
        assert_eq!(series.shape, Shape::Sine);
    }

    #[test]
    fn test_resolve_type_is_case_insensitive() {
        let series = MetricConfig::new("bytes", "Sum", 0.0, 1.0).resolve("api").unwrap();
        assert_eq!(series.kind, MetricKind::Sum);
    }

    #[test]
    fn test_resolve_rejects_unknown_type_and_range() {
        assert!(matches!(
            MetricConfig::new("x", "histogram", 0.0, 1.0).resolve("api"),
            Err(ConfigError::UnknownMetricType { .. })
        ));
        assert!(matches!(
            MetricConfig::new("x", "gauge", 2.0, 1.0).resolve("api"),
            Err(ConfigError::InvalidMetricRange { .. })
        ));
    }

    #[test]
    fn test_resolve_rejects_non_finite_bounds() {
        for (min, max) in [(f64::NAN, 10.0), (0.0, f64::NAN), (f64::NEG_INFINITY, 1.0), (0.0, f64::INFINITY)] {
            let result = MetricConfig::new("x", "gauge", min, max).resolve("api");
            assert!(
                matches!(result, Err(ConfigError::InvalidMetricRange { .. })),
                "min {} max {} accepted",
                min,
                max
            );
        }

        let mut config = MetricConfig::new("x", "gauge", 0.0, 1.0);
        config.jitter = f64::NAN;
        assert!(matches!(
            config.resolve("api"),
            Err(ConfigError::InvalidMetricJitter { .. })
        ));
    }

    #[test]
    fn test_nan_bound_in_document_fails_load() {
        let yaml = r#"
services:
  api:
    metrics:
      - name: load
        type: gauge
        min: .nan
        max: 10
    routes:
      /x:
        maxLatencyMillis: 5
"#;
        let mut topology: crate::topology::Topology = serde_yaml::from_str(yaml).unwrap();
        let err = topology.load(None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMetricRange { ref metric, .. } if metric == "load"));
    }

    #[test]
    fn test_resolve_parses_period() {
        let mut config = MetricConfig::new("x", "gauge", 0.0, 1.0);
        config.period = Some("10m".to_string());
        config.offset = Some("30s".to_string());
        let series = config.resolve("api").unwrap();
        assert_eq!(series.period, Duration::from_secs(600));
        assert_eq!(series.offset, Duration::from_secs(30));

        config.period = Some("often".to_string());
        let err = config.resolve("api").unwrap_err();
        assert!(err.to_string().contains("metric x of service api period"));
    }

    #[test]
    fn test_shape_deserializes_lowercase() {
        let config: MetricConfig =
            serde_yaml::from_str("name: heap\ntype: Gauge\nmax: 10\nshape: leaking\n").unwrap();
        assert_eq!(config.shape, Shape::Leaking);
        assert_eq!(config.min, 0.0);
    }
}
