//! Metric value synthesis

use crate::clock::{unix_nanos, SharedClock};
use crate::flags::FlagEngine;
use crate::kubernetes::{substitute, KubernetesSimulator};
use crate::models::{AttributeValue, Attributes, MetricBatch, MetricKind, MetricPoint, SERVICE_NAME};
use crate::topology::{MetricSeries, Shape};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Per-series state carried between ticks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapeState {
    /// Pod the leak was last measured on
    pub last_pod: Option<String>,
    /// Leak fill level in `[0, 1]`
    pub leak: f64,
}

/// What the leaking shape needs besides the phase
#[derive(Debug, Clone, Copy)]
pub struct LeakInput<'a> {
    pub pod: Option<&'a str>,
    /// Growth per tick
    pub step: f64,
}

/// Waveform factor for one tick together with the state for the next one.
///
/// The leak restarts from zero whenever the pod changes and otherwise grows
/// by `step` per tick, saturating at one.
pub fn evaluate(shape: Shape, phase: f64, state: &ShapeState, leak: LeakInput<'_>) -> (f64, ShapeState) {
    if let Some(factor) = shape.periodic_factor(phase) {
        return (factor, state.clone());
    }

    let restarted = state.last_pod.as_deref() != leak.pod;
    let level = if restarted {
        0.0
    } else {
        (state.leak + leak.step).min(1.0)
    };
    let next = ShapeState {
        last_pod: leak.pod.map(str::to_string),
        leak: level,
    };
    (level, next)
}

/// Position in the period, in `[0, 1)`
pub fn phase(now: DateTime<Utc>, offset: Duration, period: Duration) -> f64 {
    let period = period.as_nanos() as i128;
    if period == 0 {
        return 0.0;
    }
    let shifted = unix_nanos(now) as i128 - offset.as_nanos() as i128;
    shifted.rem_euclid(period) as f64 / period as f64
}

/// `1 + r * jitter - jitter / 2` for `r` uniform in `[0, 1)`
fn jitter_multiplier<R: Rng + ?Sized>(jitter: f64, rng: &mut R) -> f64 {
    if jitter <= 0.0 {
        return 1.0;
    }
    1.0 + rng.gen::<f64>() * jitter - jitter / 2.0
}

/// Pod a generator reports for
#[derive(Debug, Clone)]
pub struct PodBinding {
    pub simulator: Arc<KubernetesSimulator>,
    pub pool_key: String,
    pub index: usize,
}

/// Produces points for one series, one call per tick
pub struct MetricGenerator {
    series: MetricSeries,
    service: String,
    resource: Attributes,
    flags: Arc<FlagEngine>,
    clock: SharedClock,
    binding: Option<PodBinding>,
    tick: Duration,
    rng: StdRng,
    state: ShapeState,
}

impl MetricGenerator {
    pub fn new(
        series: MetricSeries,
        service: impl Into<String>,
        flags: Arc<FlagEngine>,
        clock: SharedClock,
        rng: StdRng,
    ) -> Self {
        Self {
            series,
            service: service.into(),
            resource: Attributes::new(),
            flags,
            clock,
            binding: None,
            tick: DEFAULT_TICK,
            rng,
            state: ShapeState::default(),
        }
    }

    /// Report for a simulated pod: restart it when due, substitute its
    /// identity into tags and add `k8s.*` resource attributes
    pub fn bound_to(mut self, binding: PodBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Extra resource attributes on every batch
    pub fn with_resource(mut self, resource: Attributes) -> Self {
        self.resource = resource;
        self
    }

    pub fn series(&self) -> &MetricSeries {
        &self.series
    }

    pub fn state(&self) -> &ShapeState {
        &self.state
    }

    /// Label for logs: `service/metric`, plus the pod slot when bound
    pub fn target(&self) -> String {
        match &self.binding {
            Some(b) => format!("{}/{}[{}#{}]", self.service, self.series.name, b.pool_key, b.index),
            None => format!("{}/{}", self.service, self.series.name),
        }
    }

    /// Growth per tick of the leaking shape
    fn leak_step(&self) -> f64 {
        let interval = self
            .series
            .leak_interval
            .or_else(|| {
                self.binding
                    .as_ref()
                    .and_then(|b| b.simulator.restart_interval(&b.pool_key))
            })
            .unwrap_or(self.series.period);
        if interval.is_zero() {
            return 1.0;
        }
        self.tick.as_secs_f64() / interval.as_secs_f64() / 2.0
    }

    /// One batch for the current tick, or `None` while the series is gated off
    pub fn generate(&mut self) -> Option<MetricBatch> {
        if let Some(binding) = &self.binding {
            binding
                .simulator
                .restart_if_needed(&binding.pool_key, binding.index, &self.flags, &mut self.rng);
        }

        if !self.series.should_generate(&self.flags) {
            return None;
        }

        let now = self.clock.now();
        let identity = self
            .binding
            .as_ref()
            .and_then(|b| b.simulator.identity(&b.pool_key, b.index));

        let step = self.leak_step();
        let phase = phase(now, self.series.offset, self.series.period);
        let (factor, next) = evaluate(
            self.series.shape,
            phase,
            &self.state,
            LeakInput {
                pod: identity.as_ref().map(|i| i.pod_name.as_str()),
                step,
            },
        );
        self.state = next;

        let span = self.series.max - self.series.min;
        let value = (self.series.min + span * factor) * jitter_multiplier(self.series.jitter, &mut self.rng);
        let value = value.clamp(self.series.min, self.series.max);

        let tags = match &identity {
            Some(identity) => substitute(&self.series.tags, identity),
            None => self.series.tags.clone(),
        };
        let attributes: Attributes = tags
            .into_iter()
            .map(|(k, v)| (k, AttributeValue::String(v)))
            .collect();

        let mut resource = self.resource.clone();
        resource.insert(SERVICE_NAME.to_string(), self.service.clone().into());
        if let Some(identity) = &identity {
            identity.substitute_attributes(&mut resource);
            resource.extend(identity.resource_attributes());
        }

        let time = unix_nanos(now);
        let start_time = match self.series.kind {
            MetricKind::Sum => Some(time.saturating_sub(self.tick.as_nanos() as u64)),
            MetricKind::Gauge => None,
        };

        Some(MetricBatch {
            resource,
            points: vec![MetricPoint {
                name: self.series.name.clone(),
                kind: self.series.kind,
                value,
                start_time_unix_nano: start_time,
                time_unix_nano: time,
                attributes,
            }],
        })
    }
}
