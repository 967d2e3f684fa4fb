//! Percentile-based latency profiles

use super::pickable::{default_weight, is_default_weight, pick, PickRatio, Pickable};
use crate::duration::parse_duration;
use crate::error::ConfigError;
use crate::flags::{FlagEngine, FlagGate};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parsed percentile cut points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PercentileDurations {
    pub p0: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub p999: Duration,
    pub p100: Duration,
}

impl PercentileDurations {
    /// Choose a bucket by the fixed CDF, then interpolate uniformly inside it
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let (low, high) = match rng.gen::<f64>() {
            x if x <= 0.5 => (self.p0, self.p50),
            x if x <= 0.95 => (self.p50, self.p95),
            x if x <= 0.99 => (self.p95, self.p99),
            x if x <= 0.999 => (self.p99, self.p999),
            _ => (self.p999, self.p100),
        };
        low + high.saturating_sub(low).mul_f64(rng.gen::<f64>())
    }

    fn is_ascending(&self) -> bool {
        let points = [self.p0, self.p50, self.p95, self.p99, self.p999, self.p100];
        points.windows(2).all(|w| w[0] <= w[1])
    }
}

/// One latency profile of a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p0: String,
    pub p50: String,
    pub p95: String,
    pub p99: String,
    #[serde(rename = "p99.9")]
    pub p999: String,
    pub p100: String,

    #[serde(default = "default_weight", skip_serializing_if = "is_default_weight")]
    pub weight: f64,

    #[serde(flatten)]
    pub gate: FlagGate,

    #[serde(skip)]
    pub(crate) durations: Option<PercentileDurations>,
}

impl LatencyPercentiles {
    pub fn new(p0: &str, p50: &str, p95: &str, p99: &str, p999: &str, p100: &str) -> Self {
        Self {
            p0: p0.to_string(),
            p50: p50.to_string(),
            p95: p95.to_string(),
            p99: p99.to_string(),
            p999: p999.to_string(),
            p100: p100.to_string(),
            weight: default_weight(),
            gate: FlagGate::default(),
            durations: None,
        }
    }

    /// Parse the duration strings; `owner` names the route in errors
    pub(crate) fn load(&mut self, owner: &str) -> Result<(), ConfigError> {
        let field = |name: &str| format!("{} latency {}", owner, name);
        let durations = PercentileDurations {
            p0: parse_duration(&field("p0"), &self.p0)?,
            p50: parse_duration(&field("p50"), &self.p50)?,
            p95: parse_duration(&field("p95"), &self.p95)?,
            p99: parse_duration(&field("p99"), &self.p99)?,
            p999: parse_duration(&field("p99.9"), &self.p999)?,
            p100: parse_duration(&field("p100"), &self.p100)?,
        };
        if !durations.is_ascending() {
            return Err(ConfigError::UnorderedPercentiles {
                field: format!("{} latency", owner),
            });
        }
        self.durations = Some(durations);
        Ok(())
    }

    pub fn durations(&self) -> Option<&PercentileDurations> {
        self.durations.as_ref()
    }

    /// Zero until the profile has been loaded
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        self.durations
            .as_ref()
            .map(|d| d.sample(rng))
            .unwrap_or(Duration::ZERO)
    }
}

impl Pickable for LatencyPercentiles {
    fn weight(&self) -> f64 {
        self.weight
    }

    fn gate(&self) -> &FlagGate {
        &self.gate
    }
}

/// Flag-gated profiles win over the default one; among several active
/// profiles the choice is weighted and follows `ratio`
pub fn select_profile<'a>(
    configs: &'a [LatencyPercentiles],
    flags: &FlagEngine,
    ratio: PickRatio,
) -> Option<&'a LatencyPercentiles> {
    let gated = configs.iter().filter(|c| !c.gate.is_default());
    pick(gated, flags, ratio).or_else(|| configs.iter().find(|c| c.gate.is_default()))
}
