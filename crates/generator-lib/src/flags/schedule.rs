//! Cron-driven flag transitions

use super::{CronConfig, FlagEngine};
use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Parsed start/end schedules of a root flag
#[derive(Debug, Clone)]
pub struct CronWindow {
    start: Schedule,
    end: Schedule,
}

impl CronWindow {
    pub fn parse(flag: &str, config: &CronConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            start: parse_schedule(flag, &config.start)?,
            end: parse_schedule(flag, &config.end)?,
        })
    }

    pub fn next_start(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.start.after(&after).next()
    }

    pub fn next_end(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.end.after(&after).next()
    }
}

/// Accepts classic five-field expressions by pinning seconds to zero
fn parse_schedule(flag: &str, expression: &str) -> Result<Schedule, ConfigError> {
    let trimmed = expression.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    };

    Schedule::from_str(&normalized).map_err(|e| ConfigError::InvalidCron {
        flag: flag.to_string(),
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// A pending enable or disable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronTransition {
    pub flag: String,
    pub at: DateTime<Utc>,
    pub enable: bool,
}

/// Drives every cron flag of one [`FlagEngine`]
pub struct CronScheduler {
    flags: Arc<FlagEngine>,
}

impl CronScheduler {
    pub fn new(flags: Arc<FlagEngine>) -> Self {
        Self { flags }
    }

    /// Every transition due at the soonest instant strictly after `after`.
    ///
    /// Flags firing together all come back; within one instant disables
    /// sort before enables, so a flag whose start and end coincide ends on.
    pub fn next_transitions(&self, after: DateTime<Utc>) -> Vec<CronTransition> {
        let mut pending: Vec<CronTransition> = self
            .flags
            .cron_windows()
            .flat_map(|(name, window)| {
                let start = window.next_start(after).map(|at| CronTransition {
                    flag: name.to_string(),
                    at,
                    enable: true,
                });
                let end = window.next_end(after).map(|at| CronTransition {
                    flag: name.to_string(),
                    at,
                    enable: false,
                });
                start.into_iter().chain(end)
            })
            .collect();

        let Some(soonest) = pending.iter().map(|t| t.at).min() else {
            return pending;
        };
        pending.retain(|t| t.at == soonest);
        pending.sort_by(|a, b| a.enable.cmp(&b.enable).then_with(|| a.flag.cmp(&b.flag)));
        pending
    }

    pub fn apply(&self, transition: &CronTransition) {
        match self.flags.set_enabled(&transition.flag, transition.enable) {
            Ok(changed) => debug!(
                flag = %transition.flag,
                enable = transition.enable,
                changed = changed,
                "Applied cron transition"
            ),
            Err(e) => warn!(flag = %transition.flag, error = %e, "Cron transition rejected"),
        }
    }

    /// Sleep until each transition and apply it, until shutdown
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let scheduled = self.flags.cron_windows().count();
        if scheduled == 0 {
            debug!("No cron flags configured");
            let _ = shutdown.recv().await;
            return;
        }
        info!(flags = scheduled, "Starting cron flag scheduler");

        let mut cursor = self.flags.clock().now();
        loop {
            let due = self.next_transitions(cursor);
            let Some(at) = due.first().map(|t| t.at) else {
                let _ = shutdown.recv().await;
                break;
            };

            let now = self.flags.clock().now();
            let wait = (at - now).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    for transition in &due {
                        self.apply(transition);
                    }
                    cursor = at;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down cron flag scheduler");
                    break;
                }
            }
        }
    }
}
