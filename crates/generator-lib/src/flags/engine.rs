//! Flag table and activation state machine

use super::{CronWindow, FlagConfig, IncidentConfig};
use crate::clock::SharedClock;
use crate::duration::{parse_duration, to_chrono};
use crate::error::{ConfigError, FlagError, ValidationError, ValidationErrors};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::{debug, info};

/// Activation windows of an incident child, as offsets into the parent's
/// current continuous active period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incident {
    pub parent: String,
    pub starts: Vec<Duration>,
    /// Zero keeps the window open until the parent turns off
    pub duration: Duration,
}

impl Incident {
    fn parse(flag: &str, config: &IncidentConfig) -> Result<Self, ConfigError> {
        let starts = config
            .start
            .iter()
            .enumerate()
            .map(|(i, s)| parse_duration(&format!("flag {} incident start[{}]", flag, i), s))
            .collect::<Result<Vec<_>, _>>()?;

        let duration = match config.duration.as_deref() {
            Some(d) if !d.trim().is_empty() => {
                parse_duration(&format!("flag {} incident duration", flag), d)?
            }
            _ => Duration::ZERO,
        };

        Ok(Self {
            parent: config.parent_flag.clone(),
            starts,
            duration,
        })
    }

    /// Offset of the window containing `elapsed`, if any
    pub fn window_start(&self, elapsed: Duration) -> Option<Duration> {
        self.starts.iter().copied().find(|&start| {
            elapsed >= start && (self.duration.is_zero() || elapsed < start + self.duration)
        })
    }

    /// Every offset at which the child flips state
    fn boundaries(&self) -> impl Iterator<Item = Duration> + '_ {
        self.starts.iter().flat_map(move |&start| {
            let end = (!self.duration.is_zero()).then(|| start + self.duration);
            std::iter::once(start).chain(end)
        })
    }

    fn problem(&self) -> Option<&'static str> {
        if self.starts.is_empty() {
            return Some("start must list at least one offset");
        }
        if self.duration.is_zero() && self.starts.len() > 1 {
            return Some("an open-ended incident (zero duration) allows a single start");
        }
        if self.starts.windows(2).any(|w| w[1] <= w[0]) {
            return Some("start offsets must be strictly increasing");
        }
        None
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ActivationState {
    /// Beginning of the current active period
    started: Option<DateTime<Utc>>,
    /// Last time the flag changed state
    updated: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum FlagKind {
    Root {
        state: RwLock<ActivationState>,
        cron: Option<CronWindow>,
    },
    Incident(Incident),
}

/// A loaded flag
#[derive(Debug)]
pub struct Flag {
    name: String,
    kind: FlagKind,
}

impl Flag {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn incident(&self) -> Option<&Incident> {
        match &self.kind {
            FlagKind::Incident(incident) => Some(incident),
            FlagKind::Root { .. } => None,
        }
    }

    pub fn cron(&self) -> Option<&CronWindow> {
        match &self.kind {
            FlagKind::Root { cron, .. } => cron.as_ref(),
            FlagKind::Incident(_) => None,
        }
    }

    /// Incident children cannot be toggled directly
    pub fn is_derived(&self) -> bool {
        matches!(self.kind, FlagKind::Incident(_))
    }

    fn parent(&self) -> Option<&str> {
        self.incident().map(|i| i.parent.as_str())
    }
}

/// Snapshot of one flag for the control surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagStatus {
    pub name: String,
    pub enabled: bool,
    /// Length of the current active period, zero when inactive
    pub duration_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// Name-indexed flag table shared by every generator
#[derive(Debug)]
pub struct FlagEngine {
    flags: BTreeMap<String, Flag>,
    load_problems: Vec<ValidationError>,
    clock: SharedClock,
}

impl FlagEngine {
    /// Build the flag table. Must run before [`FlagEngine::validate`].
    pub fn load(configs: &[FlagConfig], clock: SharedClock) -> Result<Self, ConfigError> {
        let now = clock.now();
        let mut flags = BTreeMap::new();
        let mut load_problems = Vec::new();

        for config in configs {
            let kind = match &config.incident {
                Some(incident) => {
                    if config.cron.is_some() {
                        load_problems.push(ValidationError::InvalidIncident {
                            flag: config.name.clone(),
                            reason: "an incident child cannot also declare a cron schedule"
                                .to_string(),
                        });
                    }
                    FlagKind::Incident(Incident::parse(&config.name, incident)?)
                }
                None => {
                    let cron = config
                        .cron
                        .as_ref()
                        .map(|c| CronWindow::parse(&config.name, c))
                        .transpose()?;
                    let state = if config.enabled {
                        ActivationState {
                            started: Some(now),
                            updated: Some(now),
                        }
                    } else {
                        ActivationState::default()
                    };
                    FlagKind::Root {
                        state: RwLock::new(state),
                        cron,
                    }
                }
            };

            if flags.contains_key(&config.name) {
                load_problems.push(ValidationError::DuplicateFlag {
                    flag: config.name.clone(),
                });
                continue;
            }

            flags.insert(
                config.name.clone(),
                Flag {
                    name: config.name.clone(),
                    kind,
                },
            );
        }

        Ok(Self {
            flags,
            load_problems,
            clock,
        })
    }

    /// Structural checks: incident windows, parent existence, parent cycles
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for problem in &self.load_problems {
            errors.push(problem.clone());
        }

        for flag in self.flags.values() {
            if let Some(reason) = flag.incident().and_then(Incident::problem) {
                errors.push(ValidationError::InvalidIncident {
                    flag: flag.name.clone(),
                    reason: reason.to_string(),
                });
            }
        }

        self.check_parent_chains(&mut errors);
        errors.into_result()
    }

    fn check_parent_chains(&self, errors: &mut ValidationErrors) {
        let mut settled: HashSet<&str> = HashSet::new();

        for name in self.flags.keys() {
            let mut path: Vec<&str> = Vec::new();
            let mut current = name.as_str();

            loop {
                if settled.contains(current) {
                    break;
                }
                if path.contains(&current) {
                    path.push(current);
                    errors.push(ValidationError::CyclicFlags {
                        path: path.join(" -> "),
                    });
                    break;
                }
                path.push(current);

                let Some(parent) = self.flags.get(current).and_then(Flag::parent) else {
                    break;
                };
                if !self.flags.contains_key(parent) {
                    errors.push(ValidationError::MissingParentFlag {
                        flag: current.to_string(),
                        parent: parent.to_string(),
                    });
                    break;
                }
                current = parent;
            }

            settled.extend(path);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Flag> {
        self.flags.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.flags.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Whether `name` is active right now. Unknown flags are inactive.
    pub fn is_active(&self, name: &str) -> bool {
        self.active_since(name).is_some()
    }

    /// Start of the current continuous active period
    pub fn active_since(&self, name: &str) -> Option<DateTime<Utc>> {
        self.active_since_at(name, self.clock.now(), 0)
    }

    /// Length of the current active period, zero when inactive
    pub fn current_duration(&self, name: &str) -> Duration {
        let now = self.clock.now();
        self.active_since_at(name, now, 0)
            .and_then(|since| (now - since).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    /// Most recent state change of `name`
    pub fn last_toggle(&self, name: &str) -> Option<DateTime<Utc>> {
        self.last_toggle_at(name, self.clock.now(), 0)
    }

    fn active_since_at(&self, name: &str, now: DateTime<Utc>, depth: usize) -> Option<DateTime<Utc>> {
        // Unvalidated tables may contain parent cycles
        if depth > self.flags.len() {
            return None;
        }
        let Some(flag) = self.flags.get(name) else {
            debug!(flag = %name, "Unknown flag treated as inactive");
            return None;
        };

        match &flag.kind {
            FlagKind::Root { state, .. } => state.read().started,
            FlagKind::Incident(incident) => {
                let parent_since = self.active_since_at(&incident.parent, now, depth + 1)?;
                let elapsed = (now - parent_since).to_std().ok()?;
                incident
                    .window_start(elapsed)
                    .map(|offset| parent_since + to_chrono(offset))
            }
        }
    }

    fn last_toggle_at(&self, name: &str, now: DateTime<Utc>, depth: usize) -> Option<DateTime<Utc>> {
        if depth > self.flags.len() {
            return None;
        }
        let flag = self.flags.get(name)?;

        match &flag.kind {
            FlagKind::Root { state, .. } => state.read().updated,
            FlagKind::Incident(incident) => {
                match self.active_since_at(&incident.parent, now, depth + 1) {
                    Some(parent_since) => {
                        let elapsed = (now - parent_since).to_std().ok()?;
                        incident
                            .boundaries()
                            .filter(|b| *b <= elapsed)
                            .max()
                            .map(|b| parent_since + to_chrono(b))
                    }
                    None => self.last_toggle_at(&incident.parent, now, depth + 1),
                }
            }
        }
    }

    /// Switch a root flag on or off. Returns whether the state changed.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<bool, FlagError> {
        let flag = self
            .flags
            .get(name)
            .ok_or_else(|| FlagError::Unknown(name.to_string()))?;

        let FlagKind::Root { state, .. } = &flag.kind else {
            return Err(FlagError::Derived(name.to_string()));
        };

        let now = self.clock.now();
        let mut state = state.write();
        let changed = match (enabled, state.started) {
            (true, None) => {
                state.started = Some(now);
                true
            }
            (false, Some(_)) => {
                state.started = None;
                true
            }
            _ => false,
        };

        if changed {
            state.updated = Some(now);
            info!(event = "flag_toggled", flag = %name, enabled = enabled, "Flag state changed");
        }
        Ok(changed)
    }

    pub fn enable(&self, name: &str) -> Result<bool, FlagError> {
        self.set_enabled(name, true)
    }

    pub fn disable(&self, name: &str) -> Result<bool, FlagError> {
        self.set_enabled(name, false)
    }

    /// Flip a root flag and return its new state
    pub fn toggle(&self, name: &str) -> Result<bool, FlagError> {
        let target = !self.is_active(name);
        self.set_enabled(name, target)?;
        Ok(target)
    }

    /// Current state of every flag, sorted by name
    pub fn list(&self) -> Vec<FlagStatus> {
        let now = self.clock.now();
        self.flags
            .values()
            .map(|flag| {
                let since = self.active_since_at(&flag.name, now, 0);
                FlagStatus {
                    name: flag.name.clone(),
                    enabled: since.is_some(),
                    duration_secs: since
                        .and_then(|s| (now - s).to_std().ok())
                        .map(|d| d.as_secs_f64())
                        .unwrap_or(0.0),
                    parent: flag.parent().map(str::to_string),
                }
            })
            .collect()
    }

    pub(crate) fn cron_windows(&self) -> impl Iterator<Item = (&str, &CronWindow)> {
        self.flags
            .values()
            .filter_map(|flag| flag.cron().map(|window| (flag.name.as_str(), window)))
    }
}
