//! Routes and their downstream calls

use super::latency::{select_profile, LatencyPercentiles};
use super::pickable::PickRatio;
use super::resource::ResourceAttributeSet;
use super::tags::TagSet;
use crate::error::ConfigError;
use crate::flags::{FlagEngine, FlagGate};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Call from one route into a route of another (or the same) service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DownstreamCall {
    pub service: String,
    pub route: String,
}

impl DownstreamCall {
    pub fn new(service: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            route: route.into(),
        }
    }
}

/// A route served by a service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRoute {
    /// Key of this route in its service's route map
    #[serde(skip)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub downstream_calls: Vec<DownstreamCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency_millis: Option<u64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub latency_configs: Vec<LatencyPercentiles>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_sets: Vec<TagSet>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_attr_sets: Vec<ResourceAttributeSet>,

    #[serde(flatten)]
    pub gate: FlagGate,
}

impl ServiceRoute {
    pub fn with_max_latency(millis: u64) -> Self {
        Self {
            max_latency_millis: Some(millis),
            ..Self::default()
        }
    }

    pub fn calling(mut self, service: &str, route: &str) -> Self {
        self.downstream_calls.push(DownstreamCall::new(service, route));
        self
    }

    pub(crate) fn load(
        &mut self,
        service: &str,
        name: &str,
        base_dir: Option<&Path>,
    ) -> Result<(), ConfigError> {
        self.name = name.to_string();

        match (self.max_latency_millis, self.latency_configs.is_empty()) {
            (None, true) => {
                return Err(ConfigError::MissingLatency {
                    service: service.to_string(),
                    route: name.to_string(),
                })
            }
            (Some(_), false) => {
                return Err(ConfigError::ConflictingLatency {
                    service: service.to_string(),
                    route: name.to_string(),
                })
            }
            _ => {}
        }

        if !self.latency_configs.is_empty() {
            let defaults = self
                .latency_configs
                .iter()
                .filter(|c| c.gate.is_default())
                .count();
            if defaults != 1 {
                return Err(ConfigError::DefaultLatency {
                    service: service.to_string(),
                    route: name.to_string(),
                    found: defaults,
                });
            }
            let owner = format!("{}/{}", service, name);
            for config in &mut self.latency_configs {
                config.load(&owner)?;
            }
        }

        for tag_set in &mut self.tag_sets {
            tag_set.load(base_dir)?;
        }
        for (index, set) in self.resource_attr_sets.iter_mut().enumerate() {
            set.load(&format!("{}/{}#{}", service, name, index))?;
        }
        Ok(())
    }

    pub fn should_generate(&self, flags: &FlagEngine) -> bool {
        self.gate.should_generate(flags)
    }

    /// This route's own latency: percentile profiles when configured,
    /// otherwise uniform in `[0, maxLatencyMillis)`
    pub fn sample_latency<R: Rng + ?Sized>(
        &self,
        flags: &FlagEngine,
        ratio: PickRatio,
        rng: &mut R,
    ) -> Duration {
        if let Some(profile) = select_profile(&self.latency_configs, flags, ratio) {
            return profile.sample(rng);
        }
        match self.max_latency_millis {
            Some(max) if max > 0 => Duration::from_nanos(rng.gen_range(0..max.saturating_mul(1_000_000))),
            _ => Duration::ZERO,
        }
    }
}
