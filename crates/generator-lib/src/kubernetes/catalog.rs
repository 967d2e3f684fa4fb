//! Pod identity, tag placeholders and the per-pod metric catalog

use super::KubernetesConfig;
use crate::models::{AttributeValue, Attributes, MetricKind};
use crate::topology::{MetricSeries, Shape};
use std::collections::BTreeMap;

/// Tokens replaced with live pod identity in tag values
pub const PLACEHOLDERS: [&str; 6] = [
    "$pod_name",
    "$replicaset",
    "$service",
    "$namespace",
    "$container",
    "$cluster",
];

/// Identity of one pod at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodIdentity {
    pub pod_name: String,
    pub replicaset: String,
    pub service: String,
    pub namespace: String,
    pub container: String,
    pub cluster: String,
}

impl PodIdentity {
    fn value_of<'a>(&'a self, placeholder: &'a str) -> &'a str {
        match placeholder {
            "$pod_name" => &self.pod_name,
            "$replicaset" => &self.replicaset,
            "$service" => &self.service,
            "$namespace" => &self.namespace,
            "$container" => &self.container,
            "$cluster" => &self.cluster,
            _ => placeholder,
        }
    }

    pub fn substitute_value(&self, value: &str) -> String {
        if !value.contains('$') {
            return value.to_string();
        }
        PLACEHOLDERS
            .iter()
            .fold(value.to_string(), |acc, p| acc.replace(p, self.value_of(p)))
    }

    /// Standard `k8s.*` resource attributes
    pub fn resource_attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        let mut put = |key: &str, value: &str| {
            attrs.insert(key.to_string(), AttributeValue::String(value.to_string()));
        };
        put("k8s.cluster.name", &self.cluster);
        put("k8s.namespace.name", &self.namespace);
        put("k8s.deployment.name", &self.service);
        put("k8s.replicaset.name", &self.replicaset);
        put("k8s.pod.name", &self.pod_name);
        put("k8s.container.name", &self.container);
        attrs
    }

    /// Replace placeholders in string attributes, in place
    pub fn substitute_attributes(&self, attrs: &mut Attributes) {
        for value in attrs.values_mut() {
            if let AttributeValue::String(text) = value {
                *text = self.substitute_value(text);
            }
        }
    }
}

pub fn substitute(tags: &BTreeMap<String, String>, identity: &PodIdentity) -> BTreeMap<String, String> {
    tags.iter()
        .map(|(k, v)| (k.clone(), identity.substitute_value(v)))
        .collect()
}

fn pod_tags(series: MetricSeries) -> MetricSeries {
    series
        .with_tag("namespace", "$namespace")
        .with_tag("pod", "$pod_name")
}

fn container_tags(series: MetricSeries) -> MetricSeries {
    pod_tags(series).with_tag("container", "$container")
}

/// Usage series averaging `target`, spread by `jitter`
fn usage(name: &str, kind: MetricKind, target: f64, jitter: f64) -> MetricSeries {
    let jitter = jitter.max(0.0);
    MetricSeries {
        min: (target * (1.0 - jitter / 2.0)).max(0.0),
        max: target * (1.0 + jitter / 2.0),
        jitter,
        ..MetricSeries::constant(name, kind, target)
    }
}

/// Series every pod of a simulated deployment reports
///
/// Tag values hold placeholders; substitute them with the pod's identity
/// on each tick so restarts show up as new series.
pub fn container_catalog(config: &KubernetesConfig) -> Vec<MetricSeries> {
    let gauge = MetricKind::Gauge;
    let sum = MetricKind::Sum;
    let mut catalog = Vec::new();

    catalog.push(
        pod_tags(MetricSeries::constant("kube_pod_status_phase", gauge, 1.0))
            .with_tag("phase", "Running"),
    );
    catalog.push(
        pod_tags(MetricSeries::constant("kube_pod_owner", gauge, 1.0))
            .with_tag("owner_kind", "ReplicaSet")
            .with_tag("owner_name", "$replicaset"),
    );
    catalog.push(
        MetricSeries::constant("kube_replicaset_owner", gauge, 1.0)
            .with_tag("namespace", "$namespace")
            .with_tag("replicaset", "$replicaset")
            .with_tag("owner_kind", "Deployment")
            .with_tag("owner_name", "$service"),
    );

    // Node capacity sits a little above the container limit
    for (resource, unit, value) in [
        ("cpu", "core", config.limit.cpu * 1.2),
        ("memory", "byte", config.limit.memory * 1.2),
    ] {
        catalog.push(
            MetricSeries::constant("kube_node_status_allocatable", gauge, value)
                .with_tag("node", "$cluster-node")
                .with_tag("pod", "$pod_name")
                .with_tag("resource", resource)
                .with_tag("unit", unit),
        );
    }

    for (name, quantities) in [
        ("kube_pod_container_resource_requests", config.request),
        ("kube_pod_container_resource_limits", config.limit),
    ] {
        for (resource, unit, value) in [
            ("cpu", "core", quantities.cpu),
            ("memory", "byte", quantities.memory),
        ] {
            catalog.push(
                container_tags(MetricSeries::constant(name, gauge, value))
                    .with_tag("resource", resource)
                    .with_tag("unit", unit),
            );
        }
    }

    let cpu = config.usage.cpu;
    catalog.push(container_tags(usage(
        "container_cpu_usage_seconds_total",
        sum,
        cpu.target,
        cpu.jitter,
    )));

    let memory = config.usage.memory;
    let working_set = match config.restart_policy() {
        Some(policy) => MetricSeries {
            min: memory.target,
            max: config.limit.memory.max(memory.target),
            shape: Shape::Leaking,
            jitter: memory.jitter.max(0.0),
            leak_interval: Some(policy.every),
            ..MetricSeries::constant("container_memory_working_set_bytes", gauge, memory.target)
        },
        None => usage(
            "container_memory_working_set_bytes",
            gauge,
            memory.target,
            memory.jitter,
        ),
    };
    catalog.push(container_tags(working_set));

    let disk = config.usage.disk;
    catalog.push(container_tags(usage(
        "container_fs_writes_bytes_total",
        sum,
        disk.target,
        disk.jitter,
    )));

    let network = config.usage.network;
    for name in [
        "container_network_receive_bytes_total",
        "container_network_transmit_bytes_total",
    ] {
        catalog.push(
            container_tags(usage(name, sum, network.target, network.jitter))
                .with_tag("interface", "eth0"),
        );
    }

    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes::{RestartPolicy, ResourceQuantities};
    use std::time::Duration;

    fn identity() -> PodIdentity {
        PodIdentity {
            pod_name: "checkout-bcdfg23456-xz789".into(),
            replicaset: "checkout-bcdfg23456".into(),
            service: "checkout".into(),
            namespace: "shop".into(),
            container: "checkout".into(),
            cluster: "prod".into(),
        }
    }

    #[test]
    fn test_substitute_placeholders() {
        let tags: BTreeMap<String, String> = [
            ("pod".to_string(), "$pod_name".to_string()),
            ("node".to_string(), "$cluster-node".to_string()),
            ("static".to_string(), "value".to_string()),
            ("unknown".to_string(), "$other".to_string()),
        ]
        .into();

        let out = substitute(&tags, &identity());
        assert_eq!(out["pod"], "checkout-bcdfg23456-xz789");
        assert_eq!(out["node"], "prod-node");
        assert_eq!(out["static"], "value");
        assert_eq!(out["unknown"], "$other");
    }

    #[test]
    fn test_resource_attributes() {
        let attrs = identity().resource_attributes();
        assert_eq!(attrs.len(), 6);
        assert_eq!(
            attrs["k8s.replicaset.name"],
            AttributeValue::String("checkout-bcdfg23456".into())
        );
        assert_eq!(attrs["k8s.deployment.name"], AttributeValue::String("checkout".into()));
    }

    #[test]
    fn test_catalog_contents() {
        let config = KubernetesConfig {
            request: ResourceQuantities { cpu: 0.5, memory: 100.0 },
            limit: ResourceQuantities { cpu: 1.0, memory: 200.0 },
            ..KubernetesConfig::default()
        };
        let catalog = container_catalog(&config);

        let names: std::collections::BTreeSet<_> = catalog.iter().map(|s| s.name.as_str()).collect();
        for expected in [
            "kube_pod_status_phase",
            "kube_pod_owner",
            "kube_replicaset_owner",
            "kube_node_status_allocatable",
            "kube_pod_container_resource_requests",
            "kube_pod_container_resource_limits",
            "container_cpu_usage_seconds_total",
            "container_memory_working_set_bytes",
            "container_fs_writes_bytes_total",
            "container_network_receive_bytes_total",
            "container_network_transmit_bytes_total",
        ] {
            assert!(names.contains(expected), "missing {}", expected);
        }

        let allocatable_cpu = catalog
            .iter()
            .find(|s| s.name == "kube_node_status_allocatable" && s.tags["resource"] == "cpu")
            .unwrap();
        assert!((allocatable_cpu.min - 1.2).abs() < 1e-9);

        let cpu_usage = catalog
            .iter()
            .find(|s| s.name == "container_cpu_usage_seconds_total")
            .unwrap();
        assert_eq!(cpu_usage.kind, MetricKind::Sum);
        assert!(catalog.iter().all(|s| s.leak_interval.is_none()));
    }

    #[test]
    fn test_working_set_leaks_when_restarting() {
        let mut config = KubernetesConfig::default();
        config.usage.memory.target = 50.0;
        config.limit.memory = 200.0;
        config.restart_policy = Some(RestartPolicy {
            every: Duration::from_secs(600),
            jitter: Duration::ZERO,
        });

        let catalog = container_catalog(&config);
        let working_set = catalog
            .iter()
            .find(|s| s.name == "container_memory_working_set_bytes")
            .unwrap();
        assert_eq!(working_set.shape, Shape::Leaking);
        assert_eq!(working_set.min, 50.0);
        assert_eq!(working_set.max, 200.0);
        assert_eq!(working_set.leak_interval, Some(Duration::from_secs(600)));
    }
}
