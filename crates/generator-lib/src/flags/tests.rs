//! Flag engine behavior: incidents, gating, validation and cron parsing

use super::*;
use crate::clock::{Clock, ManualClock, SharedClock};
use crate::error::{ConfigError, FlagError, ValidationError};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
}

fn incident(name: &str, parent: &str, starts: &[&str], duration: Option<&str>) -> FlagConfig {
    FlagConfig {
        incident: Some(IncidentConfig {
            parent_flag: parent.to_string(),
            start: starts.iter().map(|s| s.to_string()).collect(),
            duration: duration.map(str::to_string),
        }),
        ..FlagConfig::new(name)
    }
}

fn engine(configs: &[FlagConfig], clock: &ManualClock) -> FlagEngine {
    let shared: SharedClock = Arc::new(clock.clone());
    FlagEngine::load(configs, shared).unwrap()
}

#[test]
fn test_incident_follows_parent_duration() {
    let clock = clock();
    let flags = engine(
        &[
            FlagConfig::new("deploy"),
            incident("maintenance", "deploy", &["0s"], Some("5m")),
        ],
        &clock,
    );
    flags.validate().unwrap();

    assert!(!flags.is_active("maintenance"));

    flags.enable("deploy").unwrap();
    assert!(flags.is_active("maintenance"));

    clock.advance(chrono::Duration::seconds(299));
    assert!(flags.is_active("maintenance"));

    clock.advance(chrono::Duration::seconds(1));
    assert!(!flags.is_active("maintenance"));
    assert!(flags.is_active("deploy"));
}

#[test]
fn test_incident_multiple_windows() {
    let clock = clock();
    let flags = engine(
        &[
            FlagConfig::new("outage"),
            incident("latency", "outage", &["1m", "10m"], Some("2m")),
        ],
        &clock,
    );
    flags.enable("outage").unwrap();

    let at = |minutes: i64| {
        clock.set(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::minutes(minutes));
        flags.is_active("latency")
    };

    assert!(!at(0));
    assert!(at(1));
    assert!(at(2));
    assert!(!at(3));
    assert!(!at(9));
    assert!(at(10));
    assert!(!at(12));
}

#[test]
fn test_open_ended_incident_lasts_until_parent_stops() {
    let clock = clock();
    let flags = engine(
        &[
            FlagConfig::new("deploy"),
            incident("degraded", "deploy", &["30s"], None),
        ],
        &clock,
    );
    flags.enable("deploy").unwrap();

    clock.advance(chrono::Duration::hours(3));
    assert!(flags.is_active("degraded"));

    flags.disable("deploy").unwrap();
    assert!(!flags.is_active("degraded"));
}

#[test]
fn test_nested_incidents() {
    let clock = clock();
    let flags = engine(
        &[
            FlagConfig::new("root"),
            incident("middle", "root", &["1m"], None),
            incident("leaf", "middle", &["1m"], Some("1m")),
        ],
        &clock,
    );
    flags.validate().unwrap();
    flags.enable("root").unwrap();

    clock.advance(chrono::Duration::seconds(90));
    assert!(flags.is_active("middle"));
    assert!(!flags.is_active("leaf"));

    clock.advance(chrono::Duration::seconds(30));
    assert!(flags.is_active("leaf"));
    assert_eq!(flags.current_duration("leaf"), Duration::ZERO);

    clock.advance(chrono::Duration::seconds(60));
    assert!(!flags.is_active("leaf"));
}

#[test]
fn test_unknown_flag_is_inactive() {
    let clock = clock();
    let flags = engine(&[], &clock);
    assert!(!flags.is_active("missing"));
    assert_eq!(flags.current_duration("missing"), Duration::ZERO);
    assert!(flags.last_toggle("missing").is_none());
}

#[test]
fn test_enable_is_idempotent() {
    let clock = clock();
    let flags = engine(&[FlagConfig::new("deploy")], &clock);

    assert!(flags.enable("deploy").unwrap());
    let first = flags.last_toggle("deploy");

    clock.advance(chrono::Duration::seconds(10));
    assert!(!flags.enable("deploy").unwrap());
    assert_eq!(flags.last_toggle("deploy"), first);
    assert_eq!(flags.current_duration("deploy"), Duration::from_secs(10));

    assert!(flags.disable("deploy").unwrap());
    assert!(!flags.disable("deploy").unwrap());
    assert_eq!(flags.current_duration("deploy"), Duration::ZERO);
}

#[test]
fn test_toggle_flips_state() {
    let clock = clock();
    let flags = engine(&[FlagConfig::new("deploy")], &clock);

    assert!(flags.toggle("deploy").unwrap());
    assert!(flags.is_active("deploy"));
    assert!(!flags.toggle("deploy").unwrap());
    assert!(!flags.is_active("deploy"));
}

#[test]
fn test_derived_and_unknown_flags_cannot_be_toggled() {
    let clock = clock();
    let flags = engine(
        &[
            FlagConfig::new("deploy"),
            incident("maintenance", "deploy", &["0s"], Some("5m")),
        ],
        &clock,
    );

    assert_eq!(
        flags.enable("maintenance"),
        Err(FlagError::Derived("maintenance".to_string()))
    );
    assert_eq!(
        flags.enable("nope"),
        Err(FlagError::Unknown("nope".to_string()))
    );
}

#[test]
fn test_flag_enabled_at_load() {
    let clock = clock();
    let flags = engine(
        &[FlagConfig {
            enabled: true,
            ..FlagConfig::new("always")
        }],
        &clock,
    );
    assert!(flags.is_active("always"));
}

#[test]
fn test_incident_last_toggle_tracks_window_edges() {
    let clock = clock();
    let start = clock.now();
    let flags = engine(
        &[
            FlagConfig::new("deploy"),
            incident("maintenance", "deploy", &["1m"], Some("5m")),
        ],
        &clock,
    );

    flags.enable("deploy").unwrap();
    assert_eq!(flags.last_toggle("maintenance"), None);

    clock.advance(chrono::Duration::minutes(2));
    assert_eq!(
        flags.last_toggle("maintenance"),
        Some(start + chrono::Duration::minutes(1))
    );

    clock.advance(chrono::Duration::minutes(5));
    assert_eq!(
        flags.last_toggle("maintenance"),
        Some(start + chrono::Duration::minutes(6))
    );

    flags.disable("deploy").unwrap();
    assert_eq!(flags.last_toggle("maintenance"), Some(clock.now()));
}

#[test]
fn test_gate_semantics() {
    let clock = clock();
    let flags = engine(
        &[FlagConfig::new("on"), FlagConfig::new("off")],
        &clock,
    );
    flags.enable("on").unwrap();

    assert!(FlagGate::default().should_generate(&flags));
    assert!(FlagGate::set("on").should_generate(&flags));
    assert!(!FlagGate::set("off").should_generate(&flags));
    assert!(!FlagGate::unset("on").should_generate(&flags));
    assert!(FlagGate::unset("off").should_generate(&flags));
    assert!(!FlagGate::set("missing").should_generate(&flags));
    assert!(FlagGate::unset("missing").should_generate(&flags));

    let both = FlagGate {
        flag_set: Some("on".to_string()),
        flag_unset: Some("off".to_string()),
    };
    assert!(both.should_generate(&flags));
    assert_eq!(both.last_toggle(&flags), Some(clock.now()));
}

#[test]
fn test_empty_gate_names_count_as_unset() {
    let gate = FlagGate {
        flag_set: Some(String::new()),
        flag_unset: None,
    };
    assert!(gate.is_default());
    assert_eq!(gate.referenced().count(), 0);
}

#[test]
fn test_validate_accepts_acyclic_parents() {
    let clock = clock();
    let flags = engine(
        &[
            FlagConfig::new("a"),
            incident("b", "a", &["0s"], Some("1m")),
            incident("c", "b", &["0s"], Some("1m")),
        ],
        &clock,
    );
    assert!(flags.validate().is_ok());
}

#[test]
fn test_validate_self_reference() {
    let clock = clock();
    let flags = engine(&[incident("loop", "loop", &["0s"], None)], &clock);

    let errors = flags.validate().unwrap_err();
    assert!(errors.iter().any(|e| matches!(
        e,
        ValidationError::CyclicFlags { path } if path == "loop -> loop"
    )));
}

#[test]
fn test_validate_mutual_reference_prints_path() {
    let clock = clock();
    let flags = engine(
        &[
            incident("a", "b", &["0s"], None),
            incident("b", "c", &["0s"], None),
            incident("c", "b", &["0s"], None),
        ],
        &clock,
    );

    let errors = flags.validate().unwrap_err();
    let cycles: Vec<_> = errors
        .iter()
        .filter_map(|e| match e {
            ValidationError::CyclicFlags { path } => Some(path.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(cycles, vec!["a -> b -> c -> b".to_string()]);
}

#[test]
fn test_validate_missing_parent() {
    let clock = clock();
    let flags = engine(&[incident("child", "ghost", &["0s"], None)], &clock);

    let errors = flags.validate().unwrap_err();
    assert!(errors.iter().any(|e| *e
        == ValidationError::MissingParentFlag {
            flag: "child".to_string(),
            parent: "ghost".to_string(),
        }));
}

#[test]
fn test_validate_incident_shapes() {
    let clock = clock();
    let flags = engine(
        &[
            FlagConfig::new("p"),
            incident("empty", "p", &[], Some("1m")),
            incident("unordered", "p", &["2m", "1m"], Some("30s")),
            incident("repeated", "p", &["1m", "1m"], Some("30s")),
            incident("open", "p", &["1m", "2m"], None),
        ],
        &clock,
    );

    let errors = flags.validate().unwrap_err();
    let invalid: Vec<&str> = errors
        .iter()
        .filter_map(|e| match e {
            ValidationError::InvalidIncident { flag, .. } => Some(flag.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(invalid, vec!["empty", "open", "repeated", "unordered"]);
}

#[test]
fn test_validate_duplicate_names() {
    let clock = clock();
    let flags = engine(&[FlagConfig::new("x"), FlagConfig::new("x")], &clock);
    let errors = flags.validate().unwrap_err();
    assert_eq!(errors.len(), 1);
}

#[test]
fn test_bad_incident_duration_is_config_error() {
    let clock: SharedClock = Arc::new(clock());
    let result = FlagEngine::load(&[incident("c", "p", &["soon"], None)], clock);
    assert!(matches!(result, Err(ConfigError::InvalidDuration { .. })));
}

#[test]
fn test_cron_accepts_five_fields() {
    let config = CronConfig {
        start: "0 9 * * *".to_string(),
        end: "30 9 * * *".to_string(),
    };
    let window = CronWindow::parse("business", &config).unwrap();

    let after = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
    assert_eq!(
        window.next_start(after),
        Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap())
    );
    assert_eq!(
        window.next_end(after),
        Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap())
    );
}

#[test]
fn test_cron_rejects_garbage() {
    let config = CronConfig {
        start: "every tuesday".to_string(),
        end: "0 9 * * *".to_string(),
    };
    let err = CronWindow::parse("bad", &config).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidCron { ref flag, .. } if flag == "bad"));
}

#[test]
fn test_cron_scheduler_applies_soonest_transition() {
    let clock = clock();
    let shared: SharedClock = Arc::new(clock.clone());
    let flags = Arc::new(
        FlagEngine::load(
            &[FlagConfig {
                cron: Some(CronConfig {
                    start: "0 13 * * *".to_string(),
                    end: "0 14 * * *".to_string(),
                }),
                ..FlagConfig::new("lunch")
            }],
            shared,
        )
        .unwrap(),
    );
    let scheduler = CronScheduler::new(flags.clone());

    let due = scheduler.next_transitions(clock.now());
    assert_eq!(due.len(), 1);
    let next = &due[0];
    assert_eq!(next.flag, "lunch");
    assert!(next.enable);
    assert_eq!(next.at, Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap());

    scheduler.apply(next);
    assert!(flags.is_active("lunch"));

    let after = scheduler.next_transitions(next.at).remove(0);
    assert!(!after.enable);
    assert_eq!(after.at, Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap());
}

fn cron_flag(name: &str, start: &str, end: &str) -> FlagConfig {
    FlagConfig {
        cron: Some(CronConfig {
            start: start.to_string(),
            end: end.to_string(),
        }),
        ..FlagConfig::new(name)
    }
}

#[test]
fn test_cron_scheduler_returns_simultaneous_transitions() {
    let clock = clock();
    let flags = Arc::new(engine(
        &[
            cron_flag("a", "0 13 * * *", "0 14 * * *"),
            cron_flag("b", "0 13 * * *", "0 15 * * *"),
            cron_flag("c", "0 16 * * *", "0 13 * * *"),
        ],
        &clock,
    ));
    let scheduler = CronScheduler::new(flags.clone());

    let due = scheduler.next_transitions(clock.now());
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap();
    assert!(due.iter().all(|t| t.at == at));
    let order: Vec<(&str, bool)> = due.iter().map(|t| (t.flag.as_str(), t.enable)).collect();
    assert_eq!(order, vec![("c", false), ("a", true), ("b", true)]);

    for transition in &due {
        scheduler.apply(transition);
    }
    assert!(flags.is_active("a"));
    assert!(flags.is_active("b"));

    let next = scheduler.next_transitions(at);
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].flag, "a");
    assert!(!next[0].enable);
}

#[test]
fn test_cron_scheduler_coinciding_start_and_end_ends_enabled() {
    let clock = clock();
    let flags = Arc::new(engine(&[cron_flag("flip", "0 13 * * *", "0 13 * * *")], &clock));
    let scheduler = CronScheduler::new(flags.clone());

    let due = scheduler.next_transitions(clock.now());
    assert_eq!(due.len(), 2);
    for transition in &due {
        scheduler.apply(transition);
    }
    assert!(flags.is_active("flip"));
}

#[tokio::test]
async fn test_cron_scheduler_run_enables_every_flag_firing_together() {
    let shared: SharedClock = Arc::new(crate::clock::SystemClock);
    let flags = Arc::new(
        FlagEngine::load(
            &[
                cron_flag("a", "* * * * * *", "0 0 0 1 1 * 2099"),
                cron_flag("b", "* * * * * *", "0 0 0 1 1 * 2099"),
            ],
            shared,
        )
        .unwrap(),
    );
    let (shutdown, rx) = tokio::sync::broadcast::channel(1);
    let task = tokio::spawn(CronScheduler::new(flags.clone()).run(rx));

    tokio::time::sleep(Duration::from_millis(2200)).await;
    let _ = shutdown.send(());
    task.await.unwrap();

    assert!(flags.is_active("a"));
    assert!(flags.is_active("b"));
}

#[test]
fn test_list_reports_duration() {
    let clock = clock();
    let flags = engine(
        &[
            FlagConfig::new("deploy"),
            incident("maintenance", "deploy", &["0s"], Some("5m")),
        ],
        &clock,
    );
    flags.enable("deploy").unwrap();
    clock.advance(chrono::Duration::seconds(42));

    let list = flags.list();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].name, "deploy");
    assert!(list[0].enabled);
    assert_eq!(list[0].duration_secs, 42.0);
    assert_eq!(list[1].name, "maintenance");
    assert_eq!(list[1].parent.as_deref(), Some("deploy"));
    assert_eq!(list[1].duration_secs, 42.0);
}
