//! Synthetic telemetry generation library
//!
//! This crate provides the core functionality for:
//! - Loading and validating a service topology document
//! - Feature flags with cron schedules and incident windows
//! - Simulated Kubernetes pods with restarts and a container metric catalog
//! - Trace and metric generators and the scheduler that drives them
//! - Sinks, health checks and observability

pub mod clock;
pub mod duration;
pub mod engine;
pub mod error;
pub mod flags;
pub mod generator;
pub mod health;
pub mod kubernetes;
pub mod models;
pub mod observability;
pub mod scheduler;
pub mod sink;
pub mod topology;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use engine::Engine;
pub use error::{ConfigError, Error, FlagError, GenerationError, Result, ValidationError, ValidationErrors};
pub use flags::{FlagConfig, FlagEngine, FlagGate, FlagStatus};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{GeneratorMetrics, StructuredLogger};
pub use scheduler::{Scheduler, SchedulerBuilder, SchedulerConfig};
pub use sink::{ChannelSink, HttpSink, JsonLinesSink, Telemetry, TelemetrySink};
pub use topology::{Topology, TopologyFile};
