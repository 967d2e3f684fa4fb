//! Offline commands on a topology document

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use generator_lib::clock::unix_nanos;
use generator_lib::generator::DEFAULT_TICK;
use generator_lib::{Engine, Error, SharedClock, SystemClock, TopologyFile, TraceBatch, ERROR};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tabled::Tabled;

use crate::output::{format_millis, print_error, print_success, print_table, OutputFormat};

/// Target format of `convert`
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

/// Row for the service summary table
#[derive(Tabled, Serialize)]
struct ServiceRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Routes")]
    routes: usize,
    #[tabled(rename = "Metrics")]
    metrics: usize,
    #[tabled(rename = "Tag Sets")]
    tag_sets: usize,
    #[tabled(rename = "Pods")]
    pods: usize,
}

/// Row for the sampled spans table
#[derive(Tabled, Serialize)]
struct SpanRow {
    #[tabled(rename = "Trace")]
    trace: String,
    #[tabled(rename = "Span")]
    span: String,
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Route")]
    route: String,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Error")]
    error: String,
}

/// Row for the sampled metrics table
#[derive(Tabled, Serialize)]
struct MetricRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn load_engine(file: &Path, rng: &mut StdRng) -> Result<Arc<Engine>> {
    let clock: SharedClock = Arc::new(SystemClock);
    let engine = Engine::from_path(file, clock, rng)
        .with_context(|| format!("Failed to load {}", file.display()))?;
    Ok(Arc::new(engine))
}

fn master_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Load and validate a topology, listing every problem found
pub fn validate(file: &Path, format: OutputFormat) -> Result<()> {
    let clock: SharedClock = Arc::new(SystemClock);
    let engine = match Engine::from_path(file, clock, &mut StdRng::seed_from_u64(0)) {
        Ok(engine) => engine,
        Err(Error::Validation(errors)) => {
            for error in errors.iter() {
                print_error(&error.to_string());
            }
            bail!("{} has {} validation error(s)", file.display(), errors.len());
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to load {}", file.display())),
    };

    let rows: Vec<ServiceRow> = engine
        .topology()
        .services
        .values()
        .map(|service| ServiceRow {
            service: service.name.clone(),
            routes: service.routes.len(),
            metrics: service.metric_series().len(),
            tag_sets: service.tag_sets.len(),
            pods: service
                .all_resource_sets()
                .filter_map(|set| set.pool_key())
                .map(|key| engine.kubernetes().pod_count(key))
                .sum(),
        })
        .collect();

    print_table(&rows, format);
    if let OutputFormat::Table = format {
        print_success(&format!(
            "{} is valid: {} services, {} root routes, {} flags",
            file.display(),
            rows.len(),
            engine.root_routes().len(),
            engine.flags().len()
        ));
    }
    Ok(())
}

/// Generate traces (and optionally one tick of metrics) without a sink
pub fn sample(
    file: &Path,
    service: Option<String>,
    route: Option<String>,
    count: usize,
    seed: Option<u64>,
    metrics: bool,
    format: OutputFormat,
) -> Result<()> {
    let mut master = master_rng(seed);
    let engine = load_engine(file, &mut master)?;

    let (service, route) = match (service, route) {
        (Some(service), Some(route)) => (service, route),
        (None, None) => engine
            .root_routes()
            .first()
            .map(|r| (r.service.clone(), r.route.clone()))
            .context("Topology has no root routes; pass --service and --route")?,
        _ => bail!("--service and --route must be given together"),
    };
    if engine.topology().route(&service, &route).is_none() {
        bail!("Unknown route {}/{}", service, route);
    }

    let rng = StdRng::from_rng(&mut master)?;
    let mut generator = engine.trace_generator(&service, &route, rng);
    let start = unix_nanos(engine.clock().now());
    let traces: Vec<TraceBatch> = (0..count as u64)
        .map(|i| generator.generate(start + i * DEFAULT_TICK.as_nanos() as u64))
        .collect();

    match format {
        OutputFormat::Json => {
            for trace in &traces {
                println!("{}", serde_json::to_string(trace)?);
            }
        }
        OutputFormat::Table => {
            println!("{} {}/{}", "Sampled traces for".bold(), service.cyan(), route.cyan());
            let rows: Vec<SpanRow> = traces.iter().flat_map(span_rows).collect();
            print_table(&rows, format);
        }
    }

    if metrics {
        let mut generators = engine.metric_generators(DEFAULT_TICK, &mut master);
        let rows: Vec<MetricRow> = generators
            .iter_mut()
            .filter_map(|g| {
                let source = g.target();
                g.generate().map(|batch| (source, batch))
            })
            .flat_map(|(source, batch)| {
                batch.points.into_iter().map(move |p| MetricRow {
                    source: source.clone(),
                    kind: format!("{:?}", p.kind).to_lowercase(),
                    value: format!("{:.3}", p.value),
                })
            })
            .collect();
        print_table(&rows, format);
    }
    Ok(())
}

/// Spans in emission order, indented by depth
fn span_rows(trace: &TraceBatch) -> Vec<SpanRow> {
    let origin = trace.root().map(|r| r.start_time_unix_nano).unwrap_or(0);
    let mut depths: Vec<usize> = Vec::with_capacity(trace.spans.len());

    trace
        .spans
        .iter()
        .map(|span| {
            let depth = trace
                .spans
                .iter()
                .position(|p| p.span_id == span.parent_span_id && !span.is_root())
                .map(|parent| depths[parent] + 1)
                .unwrap_or(0);
            depths.push(depth);

            SpanRow {
                trace: span.trace_id.to_hex()[..8].to_string(),
                span: span.span_id.to_hex(),
                service: span.service_name().unwrap_or("-").to_string(),
                route: format!("{}{}", "  ".repeat(depth), span.name),
                start: format!("+{}", format_millis(span.start_time_unix_nano - origin)),
                duration: format_millis(span.duration_nanos()),
                error: span
                    .attributes
                    .get(ERROR)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            }
        })
        .collect()
}

/// Re-emit a topology document in another format
pub fn convert(file: &Path, to: DocumentFormat) -> Result<()> {
    let document = TopologyFile::from_path(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let output = match to {
        DocumentFormat::Json => document.to_json()?,
        DocumentFormat::Yaml => document.to_yaml()?,
    };
    println!("{}", output);
    Ok(())
}
