use super::catalog::{container_catalog, substitute, PodIdentity};
use super::{KubernetesConfig, RestartPolicy};
use crate::clock::SharedClock;
use crate::duration::to_chrono;
use crate::flags::{FlagEngine, FlagGate};
use crate::observability::GeneratorMetrics;
use crate::topology::{MetricSeries, PickRatio};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info};

const NAME_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";
const REPLICASET_SUFFIX_LEN: usize = 10;
const POD_SUFFIX_LEN: usize = 5;

fn random_suffix<R: Rng + ?Sized>(len: usize, rng: &mut R) -> String {
    (0..len)
        .map(|_| NAME_ALPHABET[rng.gen_range(0..NAME_ALPHABET.len())] as char)
        .collect()
}

/// One simulated pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pod {
    pub name: String,
    pub replicaset: String,
    pub container: String,
    pub started_at: DateTime<Utc>,
    /// Jittered lifetime; `None` when restarts are not configured
    pub restart_after: Option<Duration>,
}

impl Pod {
    fn new<R: Rng + ?Sized>(
        replicaset: &str,
        container: &str,
        policy: Option<RestartPolicy>,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Self {
        Self {
            name: format!("{}-{}", replicaset, random_suffix(POD_SUFFIX_LEN, rng)),
            replicaset: replicaset.to_string(),
            container: container.to_string(),
            started_at: now,
            restart_after: policy.map(|p| jittered(p, rng)),
        }
    }

    fn restart<R: Rng + ?Sized>(&mut self, policy: Option<RestartPolicy>, now: DateTime<Utc>, rng: &mut R) {
        self.name = format!("{}-{}", self.replicaset, random_suffix(POD_SUFFIX_LEN, rng));
        self.started_at = now;
        self.restart_after = policy.map(|p| jittered(p, rng));
    }

    fn is_due(&self, now: DateTime<Utc>, last_toggle: Option<DateTime<Utc>>) -> bool {
        if last_toggle.map_or(false, |t| t > self.started_at) {
            return true;
        }
        match self.restart_after {
            Some(after) => now - self.started_at >= to_chrono(after),
            None => false,
        }
    }
}

/// `every ± jitter`, never below zero
fn jittered<R: Rng + ?Sized>(policy: RestartPolicy, rng: &mut R) -> Duration {
    if policy.jitter.is_zero() {
        return policy.every;
    }
    let every = policy.every.as_secs_f64();
    let jitter = policy.jitter.as_secs_f64();
    Duration::from_secs_f64((every + rng.gen_range(-jitter..=jitter)).max(0.0))
}

/// Pods of one simulated deployment
#[derive(Debug, Clone)]
pub struct PodPool {
    pub service: String,
    pub namespace: String,
    pub cluster: String,
    pub pods: Vec<Pod>,
    pub policy: Option<RestartPolicy>,
    /// Gate of the owning resource set; its toggles force restarts
    pub gate: FlagGate,
    catalog: Vec<MetricSeries>,
}

impl PodPool {
    pub fn identity(&self, pod: &Pod) -> PodIdentity {
        PodIdentity {
            pod_name: pod.name.clone(),
            replicaset: pod.replicaset.clone(),
            service: self.service.clone(),
            namespace: self.namespace.clone(),
            container: pod.container.clone(),
            cluster: self.cluster.clone(),
        }
    }
}

/// Live pod pools of every Kubernetes-backed resource set
///
/// Each pool sits behind its own map shard lock, so creation, restarts and
/// identity reads of one pool are serialized while other pools proceed.
#[derive(Debug)]
pub struct KubernetesSimulator {
    pools: DashMap<String, PodPool>,
    clock: SharedClock,
    metrics: GeneratorMetrics,
}

impl KubernetesSimulator {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            pools: DashMap::new(),
            clock,
            metrics: GeneratorMetrics::new(),
        }
    }

    /// Provision `podCount` pods under a fresh replicaset name
    pub fn create_pods<R: Rng + ?Sized>(
        &self,
        pool_key: &str,
        service: &str,
        config: &KubernetesConfig,
        gate: &FlagGate,
        rng: &mut R,
    ) -> usize {
        let now = self.clock.now();
        let policy = config.restart_policy();
        let replicaset = format!("{}-{}", service, random_suffix(REPLICASET_SUFFIX_LEN, rng));
        let pods: Vec<Pod> = (0..config.pod_count.max(1))
            .map(|_| Pod::new(&replicaset, service, policy, now, rng))
            .collect();
        let count = pods.len();

        let pool = PodPool {
            service: service.to_string(),
            namespace: config.namespace_for(service).to_string(),
            cluster: config.cluster().to_string(),
            pods,
            policy,
            gate: gate.clone(),
            catalog: container_catalog(config),
        };
        debug!(pool = %pool_key, service = %service, replicaset = %replicaset, pods = count, "Created pod pool");
        self.pools.insert(pool_key.to_string(), pool);
        count
    }

    pub fn pod_count(&self, pool_key: &str) -> usize {
        self.pools.get(pool_key).map(|p| p.pods.len()).unwrap_or(0)
    }

    pub fn pool_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.pools.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Restart pod `index` when its gate flipped since it started or its
    /// lifetime ran out. Returns true when a restart happened.
    pub fn restart_if_needed<R: Rng + ?Sized>(
        &self,
        pool_key: &str,
        index: usize,
        flags: &FlagEngine,
        rng: &mut R,
    ) -> bool {
        let Some(mut pool) = self.pools.get_mut(pool_key) else {
            return false;
        };
        let now = self.clock.now();
        let last_toggle = pool.gate.last_toggle(flags);
        let policy = pool.policy;
        let service = pool.service.clone();

        let Some(pod) = pool.pods.get_mut(index) else {
            return false;
        };
        if !pod.is_due(now, last_toggle) {
            return false;
        }

        let previous = pod.name.clone();
        pod.restart(policy, now, rng);
        info!(
            event = "pod_restarted",
            service = %service,
            previous_pod = %previous,
            pod = %pod.name,
            "Simulated pod restart"
        );
        self.metrics.inc_pod_restarts(&service);
        true
    }

    pub fn pod(&self, pool_key: &str, index: usize) -> Option<Pod> {
        self.pools.get(pool_key)?.pods.get(index).cloned()
    }

    pub fn identity(&self, pool_key: &str, index: usize) -> Option<PodIdentity> {
        let pool = self.pools.get(pool_key)?;
        let pod = pool.pods.get(index)?;
        Some(pool.identity(pod))
    }

    /// Trace-correlated choice of a pod, for span resources
    pub fn pick_pod(&self, pool_key: &str, ratio: PickRatio) -> Option<PodIdentity> {
        let pool = self.pools.get(pool_key)?;
        if pool.pods.is_empty() {
            return None;
        }
        let index = ((ratio.value() * pool.pods.len() as f64) as usize).min(pool.pods.len() - 1);
        Some(pool.identity(&pool.pods[index]))
    }

    /// Catalog series for pod `index`, tagged with its current identity and
    /// gated like the owning resource set
    pub fn generate_metrics(&self, pool_key: &str, index: usize) -> Vec<MetricSeries> {
        let Some(pool) = self.pools.get(pool_key) else {
            return Vec::new();
        };
        let Some(pod) = pool.pods.get(index) else {
            return Vec::new();
        };
        let identity = pool.identity(pod);
        pool.catalog
            .iter()
            .map(|series| MetricSeries {
                tags: substitute(&series.tags, &identity),
                gate: pool.gate.clone(),
                ..series.clone()
            })
            .collect()
    }

    /// Catalog of a pool with placeholders left in, gated like the pool
    pub fn catalog(&self, pool_key: &str) -> Vec<MetricSeries> {
        let Some(pool) = self.pools.get(pool_key) else {
            return Vec::new();
        };
        pool.catalog
            .iter()
            .map(|series| MetricSeries {
                gate: pool.gate.clone(),
                ..series.clone()
            })
            .collect()
    }

    pub fn restart_interval(&self, pool_key: &str) -> Option<Duration> {
        self.pools.get(pool_key)?.policy.map(|p| p.every)
    }
}
