//! The topology document: services, flags and root routes

use super::Topology;
use crate::error::ConfigError;
use crate::flags::{FlagConfig, FlagGate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MIN_INTERVAL: Duration = Duration::from_nanos(1);

/// Entry point traces are generated from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootRoute {
    pub service: String,
    pub route: String,
    pub traces_per_hour: u64,

    #[serde(flatten)]
    pub gate: FlagGate,
}

impl RootRoute {
    pub fn new(service: &str, route: &str, traces_per_hour: u64) -> Self {
        Self {
            service: service.to_string(),
            route: route.to_string(),
            traces_per_hour,
            gate: FlagGate::default(),
        }
    }

    /// Time between two traces; `None` when the rate is zero. Never shorter
    /// than a nanosecond, however high the rate.
    pub fn interval(&self) -> Option<Duration> {
        if self.traces_per_hour == 0 {
            return None;
        }
        let interval = Duration::from_secs_f64(3600.0 / self.traces_per_hour as f64);
        Some(interval.max(MIN_INTERVAL))
    }
}

/// Parsed topology document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyFile {
    #[serde(default)]
    pub topology: Topology,

    #[serde(default)]
    pub flags: Vec<FlagConfig>,

    #[serde(default)]
    pub root_routes: Vec<RootRoute>,

    /// Directory relative CSV paths resolve against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl TopologyFile {
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_yaml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(input)?)
    }

    /// Read a `.json`, `.yaml` or `.yml` document
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let parse: fn(&str) -> Result<Self, ConfigError> = match extension.as_deref() {
            Some("json") => Self::from_json_str,
            Some("yaml") | Some("yml") => Self::from_yaml_str,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };

        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut file = parse(&input)?;
        file.base_dir = path.parent().map(Path::to_path_buf);
        Ok(file)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
