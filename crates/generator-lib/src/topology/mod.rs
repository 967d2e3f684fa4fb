//! Service topology: services, routes, downstream calls and their validation

mod file;
mod latency;
mod metric;
mod pickable;
mod resource;
mod route;
mod tags;
mod words;


pub use file::{RootRoute, TopologyFile};
pub use latency::{select_profile, LatencyPercentiles, PercentileDurations};
pub use metric::{MetricConfig, MetricSeries, Shape, DEFAULT_PERIOD};
pub use pickable::{pick, PickRatio, Pickable, DEFAULT_WEIGHT};
pub use resource::ResourceAttributeSet;
pub use route::{DownstreamCall, ServiceRoute};
pub use tags::{insert_tags, random_tag_name, random_tag_value, TagGenerator, TagMap, TagSet, TagValue};

use crate::error::{ConfigError, ValidationError, ValidationErrors};
use crate::flags::FlagEngine;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// All services, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub services: BTreeMap<String, ServiceTier>,
}

/// One service and everything it exposes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTier {
    #[serde(skip)]
    pub name: String,

    #[serde(default)]
    pub routes: BTreeMap<String, ServiceRoute>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_sets: Vec<TagSet>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_attr_sets: Vec<ResourceAttributeSet>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<MetricConfig>,

    #[serde(skip)]
    metric_series: Vec<MetricSeries>,
}

impl ServiceTier {
    pub fn with_route(mut self, name: &str, route: ServiceRoute) -> Self {
        self.routes.insert(name.to_string(), route);
        self
    }

    fn load(&mut self, name: &str, base_dir: Option<&Path>) -> Result<(), ConfigError> {
        self.name = name.to_string();

        for (route_name, route) in &mut self.routes {
            route.load(name, route_name, base_dir)?;
        }
        for tag_set in &mut self.tag_sets {
            tag_set.load(base_dir)?;
        }
        for (index, set) in self.resource_attr_sets.iter_mut().enumerate() {
            set.load(&format!("{}#{}", name, index))?;
        }
        self.metric_series = self
            .metrics
            .iter()
            .map(|m| m.resolve(name))
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    pub fn route(&self, name: &str) -> Option<&ServiceRoute> {
        self.routes.get(name)
    }

    /// Metrics resolved at load, in declaration order
    pub fn metric_series(&self) -> &[MetricSeries] {
        &self.metric_series
    }

    /// Trace-correlated pick of a service-level tag set
    pub fn pick_tag_set(&self, flags: &FlagEngine, ratio: PickRatio) -> Option<&TagSet> {
        pick(&self.tag_sets, flags, ratio)
    }

    /// Route-level resource sets win whenever one of them is active
    pub fn pick_resource_set<'a>(
        &'a self,
        route: &'a ServiceRoute,
        flags: &FlagEngine,
        ratio: PickRatio,
    ) -> Option<&'a ResourceAttributeSet> {
        pick(&route.resource_attr_sets, flags, ratio)
            .or_else(|| pick(&self.resource_attr_sets, flags, ratio))
    }

    /// Every resource set of this service and its routes
    pub fn all_resource_sets(&self) -> impl Iterator<Item = &ResourceAttributeSet> {
        self.resource_attr_sets
            .iter()
            .chain(self.routes.values().flat_map(|r| r.resource_attr_sets.iter()))
    }

    fn check_flags(&self, flags: &FlagEngine, errors: &mut ValidationErrors) {
        let owner = format!("service {}", self.name);
        for set in &self.tag_sets {
            set.gate.validate(flags, &format!("{} tag set", owner), errors);
        }
        for set in &self.resource_attr_sets {
            set.gate.validate(flags, &format!("{} resource set", owner), errors);
        }
        for metric in &self.metrics {
            metric
                .gate
                .validate(flags, &format!("{} metric {}", owner, metric.name), errors);
        }

        for (name, route) in &self.routes {
            let owner = format!("route {}/{}", self.name, name);
            route.gate.validate(flags, &owner, errors);
            for config in &route.latency_configs {
                config.gate.validate(flags, &format!("{} latency", owner), errors);
            }
            for set in &route.tag_sets {
                set.gate.validate(flags, &format!("{} tag set", owner), errors);
            }
            for set in &route.resource_attr_sets {
                set.gate.validate(flags, &format!("{} resource set", owner), errors);
            }
        }
    }
}

impl Topology {
    pub fn with_service(mut self, name: &str, service: ServiceTier) -> Self {
        self.services.insert(name.to_string(), service);
        self
    }

    /// Name services and routes after their keys and parse every duration,
    /// latency profile, metric and CSV tag list
    ///
    /// Relative CSV paths resolve against `base_dir`.
    pub fn load(&mut self, base_dir: Option<&Path>) -> Result<(), ConfigError> {
        for (name, service) in &mut self.services {
            service.load(name, base_dir)?;
        }
        Ok(())
    }

    pub fn service(&self, name: &str) -> Option<&ServiceTier> {
        self.services.get(name)
    }

    pub fn route(&self, service: &str, route: &str) -> Option<&ServiceRoute> {
        self.service(service).and_then(|s| s.route(route))
    }

    /// Check flag references, downstream targets, root routes and call
    /// cycles, reporting every problem at once
    pub fn validate(
        &self,
        root_routes: &[RootRoute],
        flags: &FlagEngine,
    ) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        for service in self.services.values() {
            service.check_flags(flags, &mut errors);
            for (route_name, route) in &service.routes {
                for call in &route.downstream_calls {
                    self.check_target(
                        &call.service,
                        &call.route,
                        &format!("route {}/{}", service.name, route_name),
                        &mut errors,
                    );
                }
            }
        }

        let mut reported = HashSet::new();
        for root in root_routes {
            let owner = format!("root route {}/{}", root.service, root.route);
            root.gate.validate(flags, &owner, &mut errors);
            if root.traces_per_hour == 0 {
                errors.push(ValidationError::InvalidRootRoute {
                    service: root.service.clone(),
                    route: root.route.clone(),
                    reason: "tracesPerHour must be positive".to_string(),
                });
            }
            if !self.check_target(&root.service, &root.route, &owner, &mut errors) {
                continue;
            }
            for cycle in self.find_cycles(&root.service, &root.route) {
                if reported.insert(cycle.to_string()) {
                    errors.push(cycle);
                }
            }
        }

        errors.into_result()
    }

    fn check_target(
        &self,
        service: &str,
        route: &str,
        referenced_by: &str,
        errors: &mut ValidationErrors,
    ) -> bool {
        match self.service(service) {
            None => {
                errors.push(ValidationError::UnknownService {
                    service: service.to_string(),
                    referenced_by: referenced_by.to_string(),
                });
                false
            }
            Some(tier) if tier.route(route).is_none() => {
                errors.push(ValidationError::UnknownRoute {
                    service: service.to_string(),
                    route: route.to_string(),
                    referenced_by: referenced_by.to_string(),
                });
                false
            }
            Some(_) => true,
        }
    }

    /// Depth-first walk from one root, tracking the current call path
    pub fn find_cycles(&self, service: &str, route: &str) -> Vec<ValidationError> {
        let mut cycles = Vec::new();
        let mut path = Vec::new();
        let mut settled = HashSet::new();
        self.walk(service, route, &mut path, &mut settled, &mut cycles);
        cycles
    }

    fn walk<'a>(
        &'a self,
        service: &'a str,
        route: &'a str,
        path: &mut Vec<(&'a str, &'a str)>,
        settled: &mut HashSet<(&'a str, &'a str)>,
        cycles: &mut Vec<ValidationError>,
    ) {
        let node = (service, route);
        if settled.contains(&node) {
            return;
        }
        if let Some(start) = path.iter().position(|seen| *seen == node) {
            let chain: Vec<String> = path[start..]
                .iter()
                .chain(std::iter::once(&node))
                .map(|(s, r)| format!("{}/{}", s, r))
                .collect();
            cycles.push(ValidationError::CyclicGraph {
                edge: format!("{}/{}", service, route),
                path: chain.join(" -> "),
            });
            return;
        }
        let Some(current) = self.route(service, route) else {
            return;
        };

        path.push(node);
        for call in &current.downstream_calls {
            self.walk(&call.service, &call.route, path, settled, cycles);
        }
        path.pop();
        settled.insert(node);
    }
}
