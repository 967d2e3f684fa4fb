//! Generator configuration

use anyhow::{bail, Context, Result};
use generator_lib::{HttpSink, JsonLinesSink, TelemetrySink};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_FILE_ENV: &str = "GENERATOR_CONFIG_FILE";

/// Looked up (as `generator.yaml`, `.json`, `.toml`) when no file is named
const DEFAULT_CONFIG_FILE: &str = "generator";

/// Where finished batches go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Stdout,
    File,
    Http,
}

/// Generator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    /// Instance name used in lifecycle logs
    #[serde(default = "default_instance")]
    pub instance: String,

    /// Topology document (.json, .yaml or .yml)
    #[serde(default = "default_topology_file")]
    pub topology_file: PathBuf,

    /// API server port for health, metrics and flag control
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Master seed; random when absent
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default = "default_metric_tick", with = "humantime_serde")]
    pub metric_tick: Duration,

    #[serde(default)]
    pub sink: SinkKind,

    /// Output file for the `file` sink
    #[serde(default)]
    pub sink_path: Option<PathBuf>,

    /// Base URL for the `http` sink
    #[serde(default)]
    pub sink_endpoint: Option<String>,

    #[serde(default = "default_sink_timeout", with = "humantime_serde")]
    pub sink_timeout: Duration,
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "telemetry-generator".to_string())
}

fn default_topology_file() -> PathBuf {
    PathBuf::from("topology.yaml")
}

fn default_api_port() -> u16 {
    8080
}

fn default_metric_tick() -> Duration {
    Duration::from_secs(1)
}

fn default_sink_timeout() -> Duration {
    Duration::from_secs(5)
}

impl GeneratorConfig {
    /// Load from `$GENERATOR_CONFIG_FILE` (or `generator.*` when present),
    /// overridden by `GENERATOR_*` environment variables
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);
        Self::load_with(file.as_deref())
    }

    pub fn load_with(file: Option<&Path>) -> Result<Self> {
        let builder = config::Config::builder();
        let builder = match file {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let config: Self = builder
            .add_source(config::Environment::with_prefix("GENERATOR").try_parsing(true))
            .build()
            .context("Failed to read generator configuration")?
            .try_deserialize()
            .context("Invalid generator configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.metric_tick.is_zero() {
            bail!("metric_tick must be greater than zero");
        }
        match self.sink {
            SinkKind::File if self.sink_path.is_none() => bail!("sink_path is required for the file sink"),
            SinkKind::Http if self.sink_endpoint.is_none() => {
                bail!("sink_endpoint is required for the http sink")
            }
            _ => Ok(()),
        }
    }

    pub async fn build_sink(&self) -> Result<Arc<dyn TelemetrySink>> {
        let sink: Arc<dyn TelemetrySink> = match self.sink {
            SinkKind::Stdout => Arc::new(JsonLinesSink::stdout()),
            SinkKind::File => {
                let path = self
                    .sink_path
                    .as_ref()
                    .context("sink_path is required for the file sink")?;
                let sink = JsonLinesSink::file(path)
                    .await
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                Arc::new(sink)
            }
            SinkKind::Http => {
                let endpoint = self
                    .sink_endpoint
                    .as_deref()
                    .context("sink_endpoint is required for the http sink")?;
                Arc::new(HttpSink::new(endpoint, self.sink_timeout)?)
            }
        };
        Ok(sink)
    }
}
