//! Destinations for finished batches
//!
//! The scheduler hands every batch to a [`TelemetrySink`] exactly once.
//! Failures come back as [`GenerationError`] and are dropped by the caller.

use crate::error::GenerationError;
use crate::models::{MetricBatch, TraceBatch};
use crate::observability::signals;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use url::Url;

/// Receiver of finished trace and metric batches
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn export_traces(&self, batch: TraceBatch) -> Result<(), GenerationError>;

    async fn export_metrics(&self, batch: MetricBatch) -> Result<(), GenerationError>;
}

/// One exported batch of either signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", content = "batch", rename_all = "lowercase")]
pub enum Telemetry {
    Traces(TraceBatch),
    Metrics(MetricBatch),
}

impl Telemetry {
    pub fn signal(&self) -> &'static str {
        match self {
            Telemetry::Traces(_) => signals::TRACES,
            Telemetry::Metrics(_) => signals::METRICS,
        }
    }
}

/// In-process sink backed by a bounded channel
///
/// Never waits: a full buffer rejects the batch.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Telemetry>,
}

impl ChannelSink {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Telemetry>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    fn send(&self, item: Telemetry) -> Result<(), GenerationError> {
        let signal = item.signal();
        self.tx.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => GenerationError::SinkRejected {
                signal,
                reason: "channel full".to_string(),
            },
            mpsc::error::TrySendError::Closed(_) => GenerationError::SinkClosed,
        })
    }
}

#[async_trait]
impl TelemetrySink for ChannelSink {
    async fn export_traces(&self, batch: TraceBatch) -> Result<(), GenerationError> {
        self.send(Telemetry::Traces(batch))
    }

    async fn export_metrics(&self, batch: MetricBatch) -> Result<(), GenerationError> {
        self.send(Telemetry::Metrics(batch))
    }
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Writes one JSON object per batch, newline separated
pub struct JsonLinesSink {
    writer: Mutex<BoxedWriter>,
}

impl JsonLinesSink {
    pub fn new(writer: BoxedWriter) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(tokio::io::stdout()))
    }

    /// Append to `path`, creating it when missing
    pub async fn file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .await?;
        Ok(Self::new(Box::new(file)))
    }

    async fn write(&self, item: Telemetry) -> Result<(), GenerationError> {
        let signal = item.signal();
        let mut line =
            serde_json::to_vec(&item).map_err(|source| GenerationError::Encode { signal, source })?;
        line.push(b'\n');

        let rejected = |e: std::io::Error| GenerationError::SinkRejected {
            signal,
            reason: e.to_string(),
        };
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await.map_err(rejected)?;
        writer.flush().await.map_err(rejected)
    }
}

#[async_trait]
impl TelemetrySink for JsonLinesSink {
    async fn export_traces(&self, batch: TraceBatch) -> Result<(), GenerationError> {
        self.write(Telemetry::Traces(batch)).await
    }

    async fn export_metrics(&self, batch: MetricBatch) -> Result<(), GenerationError> {
        self.write(Telemetry::Metrics(batch)).await
    }
}

/// POSTs batches as JSON to `{endpoint}/v1/traces` and `{endpoint}/v1/metrics`
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    traces_url: Url,
    metrics_url: Url,
}

impl HttpSink {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut base = Url::parse(endpoint)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            traces_url: base.join("v1/traces")?,
            metrics_url: base.join("v1/metrics")?,
        })
    }

    pub fn traces_url(&self) -> &Url {
        &self.traces_url
    }

    pub fn metrics_url(&self) -> &Url {
        &self.metrics_url
    }

    async fn post<T: Serialize + Sync>(
        &self,
        url: &Url,
        signal: &'static str,
        body: &T,
    ) -> Result<(), GenerationError> {
        let rejected = |reason: String| GenerationError::SinkRejected { signal, reason };

        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| rejected(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(rejected(format!("HTTP {}", status)));
        }
        debug!(url = %url, status = %status, "Exported batch");
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for HttpSink {
    async fn export_traces(&self, batch: TraceBatch) -> Result<(), GenerationError> {
        self.post(&self.traces_url, signals::TRACES, &batch).await
    }

    async fn export_metrics(&self, batch: MetricBatch) -> Result<(), GenerationError> {
        self.post(&self.metrics_url, signals::METRICS, &batch).await
    }
}
