//! Loaded, validated generation engine
//!
//! Setup runs one way: topology load, flag load, validation of both, pod
//! creation. The result is shared read-only by every scheduler task; flag
//! state and pod pools are the only parts that change afterwards.

use crate::clock::SharedClock;
use crate::error::{Result, ValidationErrors};
use crate::flags::FlagEngine;
use crate::generator::{MetricGenerator, PodBinding, TraceGenerator};
use crate::kubernetes::KubernetesSimulator;
use crate::topology::{RootRoute, Topology, TopologyFile};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug)]
pub struct Engine {
    topology: Topology,
    root_routes: Vec<RootRoute>,
    flags: Arc<FlagEngine>,
    kubernetes: Arc<KubernetesSimulator>,
    clock: SharedClock,
}

impl Engine {
    pub fn from_path(path: impl AsRef<Path>, clock: SharedClock, rng: &mut StdRng) -> Result<Self> {
        let file = TopologyFile::from_path(path)?;
        Self::from_file(file, clock, rng)
    }

    /// Build an engine, failing on the first configuration error or on the
    /// full set of validation errors
    pub fn from_file(file: TopologyFile, clock: SharedClock, rng: &mut StdRng) -> Result<Self> {
        let TopologyFile {
            mut topology,
            flags,
            root_routes,
            base_dir,
        } = file;

        topology.load(base_dir.as_deref())?;
        let flags = FlagEngine::load(&flags, clock.clone())?;

        let mut errors = ValidationErrors::new();
        if let Err(e) = flags.validate() {
            errors.extend(e);
        }
        if let Err(e) = topology.validate(&root_routes, &flags) {
            errors.extend(e);
        }
        errors.into_result()?;

        let kubernetes = KubernetesSimulator::new(clock.clone());
        for service in topology.services.values() {
            for set in service.all_resource_sets() {
                if let (Some(key), Some(config)) = (set.pool_key(), set.kubernetes.as_ref()) {
                    kubernetes.create_pods(key, &service.name, config, &set.gate, rng);
                }
            }
        }

        info!(
            services = topology.services.len(),
            root_routes = root_routes.len(),
            flags = flags.len(),
            pod_pools = kubernetes.pool_keys().len(),
            "Engine loaded"
        );

        Ok(Self {
            topology,
            root_routes,
            flags: Arc::new(flags),
            kubernetes: Arc::new(kubernetes),
            clock,
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn root_routes(&self) -> &[RootRoute] {
        &self.root_routes
    }

    pub fn flags(&self) -> &Arc<FlagEngine> {
        &self.flags
    }

    pub fn kubernetes(&self) -> &Arc<KubernetesSimulator> {
        &self.kubernetes
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn trace_generator(self: &Arc<Self>, service: &str, route: &str, rng: StdRng) -> TraceGenerator {
        TraceGenerator::new(Arc::clone(self), service, route, rng)
    }

    /// One generator per declared metric (per pod when the service has a
    /// Kubernetes-backed resource set) and per catalog series of every pod.
    /// Each carries the resource attributes of the set that owns its pod.
    pub fn metric_generators(self: &Arc<Self>, tick: Duration, rng: &mut StdRng) -> Vec<MetricGenerator> {
        let mut generators = Vec::new();
        let mut child_rng = || StdRng::seed_from_u64(rng.gen());

        for service in self.topology.services.values() {
            let service_pool = service
                .resource_attr_sets
                .iter()
                .find(|set| set.pool_key().is_some());

            let pool_key = service_pool.and_then(|set| set.pool_key());
            for series in service.metric_series() {
                let Some(key) = pool_key else {
                    let resource = service
                        .resource_attr_sets
                        .first()
                        .map(|set| set.attributes(&mut child_rng()))
                        .unwrap_or_default();
                    generators.push(
                        MetricGenerator::new(
                            series.clone(),
                            &service.name,
                            Arc::clone(&self.flags),
                            self.clock.clone(),
                            child_rng(),
                        )
                        .with_tick(tick)
                        .with_resource(resource),
                    );
                    continue;
                };
                let resource = service_pool
                    .map(|set| set.attributes(&mut child_rng()))
                    .unwrap_or_default();
                for index in 0..self.kubernetes.pod_count(key) {
                    let generator = MetricGenerator::new(
                        series.clone(),
                        &service.name,
                        Arc::clone(&self.flags),
                        self.clock.clone(),
                        child_rng(),
                    )
                    .with_tick(tick)
                    .with_resource(resource.clone())
                    .bound_to(self.binding(key, index));
                    generators.push(generator);
                }
            }

            for set in service.all_resource_sets() {
                let Some(key) = set.pool_key() else {
                    continue;
                };
                let resource = set.attributes(&mut child_rng());
                for index in 0..self.kubernetes.pod_count(key) {
                    for series in self.kubernetes.catalog(key) {
                        let generator = MetricGenerator::new(
                            series,
                            &service.name,
                            Arc::clone(&self.flags),
                            self.clock.clone(),
                            child_rng(),
                        )
                        .with_tick(tick)
                        .with_resource(resource.clone())
                        .bound_to(self.binding(key, index));
                        generators.push(generator);
                    }
                }
            }
        }
        generators
    }

    fn binding(&self, pool_key: &str, index: usize) -> PodBinding {
        PodBinding {
            simulator: Arc::clone(&self.kubernetes),
            pool_key: pool_key.to_string(),
            index,
        }
    }

    pub fn active_flag_count(&self) -> usize {
        self.flags.list().iter().filter(|f| f.enabled).count()
    }
}
