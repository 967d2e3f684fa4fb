//! Simulated Kubernetes deployments backing resource attribute sets
//!
//! The loaded descriptor stays read-only. Live pod identities are kept in
//! [`KubernetesSimulator`], keyed by the pool key of the owning resource set.

mod catalog;
mod simulator;

pub use catalog::{container_catalog, substitute, PodIdentity, PLACEHOLDERS};
pub use simulator::{KubernetesSimulator, Pod, PodPool};

use crate::duration::{parse_duration, parse_optional};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_CLUSTER: &str = "generator";

fn default_pod_count() -> usize {
    1
}

/// Kubernetes descriptor of a resource attribute set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// Defaults to the service name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default = "default_pod_count")]
    pub pod_count: usize,

    #[serde(default)]
    pub request: ResourceQuantities,

    #[serde(default)]
    pub limit: ResourceQuantities,

    #[serde(default)]
    pub usage: Usage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<RestartConfig>,

    #[serde(skip)]
    pub(crate) restart_policy: Option<RestartPolicy>,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            cluster_name: None,
            namespace: None,
            pod_count: default_pod_count(),
            request: ResourceQuantities::default(),
            limit: ResourceQuantities::default(),
            usage: Usage::default(),
            restart: None,
            restart_policy: None,
        }
    }
}

/// CPU in cores, memory in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuantities {
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory: f64,
}

/// Typical consumption of each container
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub cpu: UsageTarget,
    #[serde(default)]
    pub memory: UsageTarget,
    #[serde(default)]
    pub disk: UsageTarget,
    #[serde(default)]
    pub network: UsageTarget,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTarget {
    #[serde(default)]
    pub target: f64,
    #[serde(default)]
    pub jitter: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartConfig {
    pub every: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter: Option<String>,
}

/// Parsed restart interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub every: Duration,
    pub jitter: Duration,
}

impl KubernetesConfig {
    pub(crate) fn load(&mut self, owner: &str) -> Result<(), ConfigError> {
        self.restart_policy = match &self.restart {
            None => None,
            Some(restart) => {
                let every = parse_duration(&format!("{} restart every", owner), &restart.every)?;
                let jitter = parse_optional(
                    &format!("{} restart jitter", owner),
                    restart.jitter.as_deref(),
                    Duration::ZERO,
                )?;
                // A zero interval disables restarts
                (!every.is_zero()).then_some(RestartPolicy { every, jitter })
            }
        };
        Ok(())
    }

    pub fn restart_policy(&self) -> Option<RestartPolicy> {
        self.restart_policy
    }

    pub fn cluster(&self) -> &str {
        self.cluster_name.as_deref().unwrap_or(DEFAULT_CLUSTER)
    }

    pub fn namespace_for<'a>(&'a self, service: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_descriptor() {
        let config: KubernetesConfig = serde_yaml::from_str(
            r#"
clusterName: prod-east
podCount: 4
request: {cpu: 0.5, memory: 268435456}
limit: {cpu: 1, memory: 536870912}
usage:
  cpu: {target: 0.4, jitter: 0.2}
  network: {target: 2048}
restart: {every: 30m, jitter: 5m}
"#,
        )
        .unwrap();

        assert_eq!(config.cluster(), "prod-east");
        assert_eq!(config.namespace_for("checkout"), "checkout");
        assert_eq!(config.pod_count, 4);
        assert_eq!(config.limit.cpu, 1.0);
        assert_eq!(config.usage.cpu.jitter, 0.2);
        assert_eq!(config.usage.network.target, 2048.0);
        assert_eq!(config.usage.disk, UsageTarget::default());
    }

    #[test]
    fn test_load_parses_restart() {
        let mut config = KubernetesConfig {
            restart: Some(RestartConfig {
                every: "30m".into(),
                jitter: Some("5m".into()),
            }),
            ..KubernetesConfig::default()
        };
        config.load("api#0").unwrap();
        assert_eq!(
            config.restart_policy(),
            Some(RestartPolicy {
                every: Duration::from_secs(1800),
                jitter: Duration::from_secs(300),
            })
        );
    }

    #[test]
    fn test_zero_interval_disables_restarts() {
        let mut config = KubernetesConfig {
            restart: Some(RestartConfig {
                every: "0s".into(),
                jitter: None,
            }),
            ..KubernetesConfig::default()
        };
        config.load("api#0").unwrap();
        assert_eq!(config.restart_policy(), None);
    }

    #[test]
    fn test_bad_restart_interval() {
        let mut config = KubernetesConfig {
            restart: Some(RestartConfig {
                every: "sometimes".into(),
                jitter: None,
            }),
            ..KubernetesConfig::default()
        };
        let err = config.load("api#0").unwrap_err();
        assert!(err.to_string().contains("api#0 restart every"));
    }
}
