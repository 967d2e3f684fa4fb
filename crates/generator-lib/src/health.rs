//! Component health for the generator's liveness and readiness probes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a generator component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Generating and exporting normally
    Healthy,
    /// Still generating, but something is being dropped
    Degraded,
    /// Stopped or unable to export at all
    Unhealthy,
}

impl ComponentStatus {
    /// True for healthy and degraded; `/healthz` answers 200 for both
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Last reported state of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub uptime_secs: i64,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status among the components
    pub fn compute_status(components: &BTreeMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|c| c.status)
            .fold(ComponentStatus::Healthy, |worst, status| match (worst, status) {
                (ComponentStatus::Unhealthy, _) | (_, ComponentStatus::Unhealthy) => {
                    ComponentStatus::Unhealthy
                }
                (ComponentStatus::Degraded, _) | (_, ComponentStatus::Degraded) => {
                    ComponentStatus::Degraded
                }
                _ => ComponentStatus::Healthy,
            })
    }
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names tracked by the generator
pub mod components {
    pub const TRACE_GENERATOR: &str = "trace_generator";
    pub const METRIC_GENERATOR: &str = "metric_generator";
    pub const SINK: &str = "sink";
    pub const FLAG_ENGINE: &str = "flag_engine";

    pub const ALL: [&str; 4] = [TRACE_GENERATOR, METRIC_GENERATOR, SINK, FLAG_ENGINE];
}

#[derive(Debug)]
struct HealthState {
    components: BTreeMap<String, ComponentHealth>,
    ready: bool,
    started_at: DateTime<Utc>,
}

/// Shared health table; clones see the same state
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(HealthState {
                components: BTreeMap::new(),
                ready: false,
                started_at: Utc::now(),
            })),
        }
    }

    /// Registry with every generator component registered as healthy
    pub async fn with_generator_components() -> Self {
        let registry = Self::new();
        for name in components::ALL {
            registry.register(name).await;
        }
        registry
    }

    /// Register a component as healthy
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    /// Replace a component's health
    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.state
            .write()
            .await
            .components
            .insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Reflect one sink export: failures degrade the sink, the next success
    /// clears it
    pub async fn record_sink_result(&self, error: Option<&str>) {
        let degraded = {
            let state = self.state.read().await;
            state
                .components
                .get(components::SINK)
                .map(|c| c.status != ComponentStatus::Healthy)
                .unwrap_or(false)
        };
        match error {
            Some(message) => self.set_degraded(components::SINK, message).await,
            None if degraded => self.set_healthy(components::SINK).await,
            None => {}
        }
    }

    /// Set readiness; the scheduler flips it once its tasks are spawned
    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    /// Snapshot of every component with the worst status on top
    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: HealthResponse::compute_status(&state.components),
            uptime_secs: (Utc::now() - state.started_at).num_seconds(),
            components: state.components.clone(),
        }
    }

    /// Ready once started and no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let health = self.health().await;
        let ready = self.state.read().await.ready;

        let reason = if !ready {
            Some("Scheduler not started".to_string())
        } else if health.status == ComponentStatus::Unhealthy {
            Some("Critical component unhealthy".to_string())
        } else {
            None
        };
        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_state() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_generator_components_registered() {
        let registry = HealthRegistry::with_generator_components().await;
        let health = registry.health().await;
        assert_eq!(health.components.len(), 4);
        assert_eq!(
            health.components[components::SINK].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_worst_status_wins() {
        let registry = HealthRegistry::with_generator_components().await;
        registry
            .set_degraded(components::TRACE_GENERATOR, "slow")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry
            .set_unhealthy(components::FLAG_ENGINE, "cron stopped")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_sink_results_degrade_and_recover() {
        let registry = HealthRegistry::with_generator_components().await;

        registry.record_sink_result(Some("connection refused")).await;
        let sink = &registry.health().await.components[components::SINK];
        assert_eq!(sink.status, ComponentStatus::Degraded);
        assert_eq!(sink.message.as_deref(), Some("connection refused"));

        registry.record_sink_result(None).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_readiness() {
        let registry = HealthRegistry::with_generator_components().await;
        assert!(!registry.readiness().await.ready);

        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);

        registry.set_unhealthy(components::SINK, "closed").await;
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("Critical component unhealthy")
        );
    }
}
