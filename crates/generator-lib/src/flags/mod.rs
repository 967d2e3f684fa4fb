//! Feature flags and simulated incidents
//!
//! Root flags are switched by cron schedules or the control API. Incident
//! children have no stored state: whether they are active is recomputed on
//! every query from how long their parent has been continuously active.

mod engine;
mod schedule;

#[cfg(test)]
mod tests;

pub use engine::{Flag, FlagEngine, FlagStatus, Incident};
pub use schedule::{CronScheduler, CronTransition, CronWindow};

use crate::error::{ValidationError, ValidationErrors};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Flag declaration as written in the topology document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<CronConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident: Option<IncidentConfig>,

    /// Start active at load time (root flags only)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub enabled: bool,
}

impl FlagConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cron: None,
            incident: None,
            enabled: false,
        }
    }
}

/// Cron expressions that enable and disable a root flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronConfig {
    pub start: String,
    pub end: String,
}

/// Activation windows relative to a parent flag's active duration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentConfig {
    #[serde(rename = "parentFlag")]
    pub parent_flag: String,

    #[serde(default)]
    pub start: Vec<String>,

    /// Window length; absent or zero means "until the parent turns off"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

/// `flag_set` / `flag_unset` pair embedded in every gated item
///
/// The item generates only while `flag_set` is active and `flag_unset` is not.
/// Unknown flags count as inactive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagGate {
    #[serde(default, rename = "flag_set", skip_serializing_if = "Option::is_none")]
    pub flag_set: Option<String>,

    #[serde(default, rename = "flag_unset", skip_serializing_if = "Option::is_none")]
    pub flag_unset: Option<String>,
}

impl FlagGate {
    pub fn set(flag: impl Into<String>) -> Self {
        Self {
            flag_set: Some(flag.into()),
            flag_unset: None,
        }
    }

    pub fn unset(flag: impl Into<String>) -> Self {
        Self {
            flag_set: None,
            flag_unset: Some(flag.into()),
        }
    }

    fn set_name(&self) -> Option<&str> {
        self.flag_set.as_deref().filter(|s| !s.is_empty())
    }

    fn unset_name(&self) -> Option<&str> {
        self.flag_unset.as_deref().filter(|s| !s.is_empty())
    }

    /// True when neither flag is configured
    pub fn is_default(&self) -> bool {
        self.set_name().is_none() && self.unset_name().is_none()
    }

    pub fn should_generate(&self, flags: &FlagEngine) -> bool {
        if let Some(name) = self.set_name() {
            if !flags.is_active(name) {
                return false;
            }
        }
        if let Some(name) = self.unset_name() {
            if flags.is_active(name) {
                return false;
            }
        }
        true
    }

    /// Most recent toggle of either referenced flag
    pub fn last_toggle(&self, flags: &FlagEngine) -> Option<DateTime<Utc>> {
        let set = self.set_name().and_then(|n| flags.last_toggle(n));
        let unset = self.unset_name().and_then(|n| flags.last_toggle(n));
        set.max(unset)
    }

    pub fn referenced(&self) -> impl Iterator<Item = &str> {
        self.set_name().into_iter().chain(self.unset_name())
    }

    /// Record an error for each referenced flag that was never declared
    pub fn validate(&self, flags: &FlagEngine, referenced_by: &str, errors: &mut ValidationErrors) {
        for name in self.referenced() {
            if !flags.contains(name) {
                errors.push(ValidationError::UnknownFlag {
                    flag: name.to_string(),
                    referenced_by: referenced_by.to_string(),
                });
            }
        }
    }
}
