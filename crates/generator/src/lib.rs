//! Telemetry generator daemon: configuration and HTTP surface

pub mod api;
pub mod config;
