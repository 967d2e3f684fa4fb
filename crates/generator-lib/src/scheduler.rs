//! Periodic generation tasks
//!
//! One task per root route, one per metric series (per pod for
//! Kubernetes-backed services), plus the cron flag scheduler. Every task owns
//! its generator and an RNG seeded from the master RNG, and stops when the
//! shutdown channel fires.

use crate::clock::unix_nanos;
use crate::engine::Engine;
use crate::error::GenerationError;
use crate::flags::CronScheduler;
use crate::generator::{MetricGenerator, TraceGenerator, DEFAULT_TICK};
use crate::health::{components, HealthRegistry};
use crate::observability::{signals, GeneratorMetrics, StructuredLogger};
use crate::sink::TelemetrySink;
use crate::topology::RootRoute;
use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Scheduler tuning
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Metric tick (default: 1 second)
    pub metric_tick: Duration,
    /// Master seed; random when absent
    pub seed: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            metric_tick: DEFAULT_TICK,
            seed: None,
        }
    }
}

/// State every task shares
#[derive(Clone)]
struct TaskContext {
    engine: Arc<Engine>,
    sink: Arc<dyn TelemetrySink>,
    health: HealthRegistry,
    metrics: GeneratorMetrics,
    logger: StructuredLogger,
}

impl TaskContext {
    async fn report(&self, signal: &str, target: &str, result: Result<(), GenerationError>) {
        match result {
            Ok(()) => self.health.record_sink_result(None).await,
            Err(e) => {
                let message = e.to_string();
                self.metrics.inc_sink_errors(signal);
                self.logger.log_batch_dropped(signal, target, &message);
                self.health.record_sink_result(Some(&message)).await;
            }
        }
    }
}

/// Drives all generators against one sink
pub struct Scheduler {
    ctx: TaskContext,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        engine: Arc<Engine>,
        sink: Arc<dyn TelemetrySink>,
        health: HealthRegistry,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            ctx: TaskContext {
                engine,
                sink,
                health,
                metrics: GeneratorMetrics::new(),
                logger: StructuredLogger::new("scheduler"),
            },
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Spawn every task and mark the generator ready
    pub async fn start(self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        let ctx = self.ctx;
        let mut master = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut handles = Vec::new();

        for root in ctx.engine.root_routes() {
            let Some(period) = root.interval() else {
                continue;
            };
            let generator = ctx.engine.trace_generator(
                &root.service,
                &root.route,
                StdRng::seed_from_u64(master.gen()),
            );
            ctx.logger
                .log_task_started("trace", &generator.target(), period.as_millis());
            handles.push(tokio::spawn(run_trace_task(
                generator,
                root.clone(),
                period,
                ctx.clone(),
                shutdown.subscribe(),
            )));
        }

        let tick = self.config.metric_tick;
        let generators = ctx.engine.metric_generators(tick, &mut master);
        info!(series = generators.len(), tick_ms = tick.as_millis() as u64, "Starting metric tasks");
        for generator in generators {
            debug!(target = %generator.target(), "Metric task started");
            handles.push(tokio::spawn(run_metric_task(
                generator,
                tick,
                ctx.clone(),
                shutdown.subscribe(),
            )));
        }

        let cron = CronScheduler::new(Arc::clone(ctx.engine.flags()));
        handles.push(tokio::spawn(cron.run(shutdown.subscribe())));
        handles.push(tokio::spawn(run_flag_gauge(
            tick,
            ctx.clone(),
            shutdown.subscribe(),
        )));

        ctx.health.set_healthy(components::TRACE_GENERATOR).await;
        ctx.health.set_healthy(components::METRIC_GENERATOR).await;
        ctx.health.set_healthy(components::FLAG_ENGINE).await;
        ctx.health.set_ready(true).await;
        info!(tasks = handles.len(), "Scheduler started");

        handles
    }
}

async fn run_trace_task(
    mut generator: TraceGenerator,
    root: RootRoute,
    period: Duration,
    ctx: TaskContext,
    mut shutdown: broadcast::Receiver<()>,
) {
    let target = generator.target();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !root.gate.should_generate(ctx.engine.flags()) {
                    continue;
                }

                let started = Instant::now();
                let now = unix_nanos(ctx.engine.clock().now());
                let batch = generator.generate(now);
                if batch.is_empty() {
                    continue;
                }
                ctx.metrics.record_trace(batch.len());
                ctx.metrics
                    .observe_generation_latency(signals::TRACES, started.elapsed().as_secs_f64());

                let result = ctx.sink.export_traces(batch).await;
                ctx.report(signals::TRACES, &target, result).await;
            }
            _ = shutdown.recv() => {
                debug!(target = %target, "Stopping trace task");
                break;
            }
        }
    }
}

async fn run_metric_task(
    mut generator: MetricGenerator,
    tick: Duration,
    ctx: TaskContext,
    mut shutdown: broadcast::Receiver<()>,
) {
    let target = generator.target();
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let started = Instant::now();
                let Some(batch) = generator.generate() else {
                    continue;
                };
                ctx.metrics.record_metric_points(batch.points.len());
                ctx.metrics
                    .observe_generation_latency(signals::METRICS, started.elapsed().as_secs_f64());

                let result = ctx.sink.export_metrics(batch).await;
                ctx.report(signals::METRICS, &target, result).await;
            }
            _ = shutdown.recv() => {
                debug!(target = %target, "Stopping metric task");
                break;
            }
        }
    }
}

/// Keeps the active-flags gauge current
async fn run_flag_gauge(tick: Duration, ctx: TaskContext, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = interval(tick);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                ctx.metrics.set_active_flags(ctx.engine.active_flag_count());
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// Builder for creating the scheduler
pub struct SchedulerBuilder {
    engine: Option<Arc<Engine>>,
    sink: Option<Arc<dyn TelemetrySink>>,
    health: Option<HealthRegistry>,
    config: SchedulerConfig,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            engine: None,
            sink: None,
            health: None,
            config: SchedulerConfig::default(),
        }
    }

    pub fn engine(mut self, engine: Arc<Engine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Share a health registry with the HTTP surface
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn metric_tick(mut self, tick: Duration) -> Self {
        self.config.metric_tick = tick;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<Scheduler> {
        let engine = self
            .engine
            .ok_or_else(|| anyhow::anyhow!("Engine is required"))?;
        let sink = self
            .sink
            .ok_or_else(|| anyhow::anyhow!("Sink is required"))?;
        if self.config.metric_tick.is_zero() {
            anyhow::bail!("Metric tick must be greater than zero");
        }

        Ok(Scheduler::new(
            engine,
            sink,
            self.health.unwrap_or_default(),
            self.config,
        ))
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
