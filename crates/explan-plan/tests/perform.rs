use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use explan_core::{ExplanError, Modality};
use explan_plan::{PerformOptions, Plan, Selector, Setting};

#[derive(Debug)]
struct Diverged {
    seed: String,
    source: std::io::Error,
}

impl fmt::Display for Diverged {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "training diverged for seed {}", self.seed)
    }
}

impl std::error::Error for Diverged {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

fn plan() -> Plan {
    let mut plan = Plan::new();
    plan.add_factor("seed", Modality::ints(0..6)).expect("seed");
    plan.add_factor("optim", Modality::strs(["sgd", "adam"]))
        .expect("optim");
    plan
}

fn fail_on_odd_seeds(setting: &Setting, seen: &Mutex<Vec<String>>) -> Result<(), Diverged> {
    seen.lock().expect("lock").push(setting.id());
    match setting.modality("seed") {
        Some(Modality::Int(seed)) if seed % 2 == 1 => Err(Diverged {
            seed: seed.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "loss is NaN"),
        }),
        _ => Ok(()),
    }
}

#[test]
fn sequential_runs_follow_enumeration_order() {
    let mut plan = plan();
    let seen = Mutex::new(Vec::new());
    let failures = plan
        .perform(
            |_: &Setting, _: &Mutex<Vec<String>>| -> Result<(), std::io::Error> { Ok(()) },
            &seen,
            &PerformOptions::default(),
        )
        .expect("perform");
    assert_eq!(failures, 0);

    let order = Mutex::new(Vec::new());
    plan.perform(
        |setting: &Setting, order: &Mutex<Vec<String>>| -> Result<(), std::io::Error> {
            order.lock().expect("lock").push(setting.id());
            Ok(())
        },
        &order,
        &PerformOptions::default().with_progress(4),
    )
    .expect("perform");
    let expected: Vec<String> = plan
        .settings()
        .expect("settings")
        .iter()
        .map(Setting::id)
        .collect();
    assert_eq!(order.into_inner().expect("lock"), expected);
}

#[test]
fn first_failure_aborts_without_a_log() {
    let mut plan = plan();
    let seen = Mutex::new(Vec::new());
    let err = plan
        .perform(fail_on_odd_seeds, &seen, &PerformOptions::default())
        .expect_err("abort");
    match &err {
        ExplanError::Execution(info) => {
            assert_eq!(info.code, "explan_plan.setting_failed");
            assert_eq!(info.message, "training diverged for seed 1");
            assert_eq!(info.hint.as_deref(), Some("loss is NaN"));
            assert_eq!(
                info.context.get("setting").map(String::as_str),
                Some("optim_sgd_seed_1")
            );
        }
        other => panic!("unexpected error {other:?}"),
    }
    // seed 0 twice, then the first seed 1 setting
    assert_eq!(seen.into_inner().expect("lock").len(), 3);
}

#[test]
fn failures_are_logged_and_counted() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let log_path = dir.path().join("logs").join("errors.log");
    let mut plan = plan();
    let seen = Mutex::new(Vec::new());
    let failures = plan
        .perform(
            fail_on_odd_seeds,
            &seen,
            &PerformOptions::default().logging_errors_to(&log_path),
        )
        .expect("perform");
    assert_eq!(failures, 6);
    assert_eq!(seen.into_inner().expect("lock").len(), 12);

    let log = std::fs::read_to_string(&log_path).expect("read log");
    assert_eq!(log.matches("failed\n").count(), 6);
    assert!(log.contains("setting \"optim_adam_seed_5\" failed"));
    assert!(log.contains("  error: training diverged for seed 5"));
    assert!(log.contains("  caused by: loss is NaN"));
}

#[test]
fn concurrent_runs_count_failures() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let log_path = dir.path().join("errors.log");
    let mut plan = plan();
    let seen = Mutex::new(Vec::new());
    let failures = plan
        .perform(
            fail_on_odd_seeds,
            &seen,
            &PerformOptions::default()
                .concurrent(4)
                .logging_errors_to(&log_path),
        )
        .expect("perform");
    assert_eq!(failures, 6);
    let mut seen = seen.into_inner().expect("lock");
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 12);
}

#[test]
fn concurrent_runs_abort_without_a_log() {
    let mut plan = plan();
    let seen = Mutex::new(Vec::new());
    let err = plan
        .perform(fail_on_odd_seeds, &seen, &PerformOptions::default().concurrent(3))
        .expect_err("abort");
    assert!(matches!(err, ExplanError::Execution(_)));
}

#[test]
fn panics_are_recorded_when_logging() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let log_path = dir.path().join("errors.log");
    let mut plan = plan();
    plan.select(Selector::indices(&[2]));
    let calls = AtomicUsize::new(0);
    let failures = plan
        .perform(
            |setting: &Setting, calls: &AtomicUsize| -> Result<(), std::io::Error> {
                calls.fetch_add(1, Ordering::SeqCst);
                if setting.modality("optim") == Some(&Modality::from("adam")) {
                    panic!("adam exploded");
                }
                Ok(())
            },
            &calls,
            &PerformOptions::default().logging_errors_to(&log_path),
        )
        .expect("perform");
    assert_eq!(failures, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let log = std::fs::read_to_string(&log_path).expect("read log");
    assert!(log.contains("panic: adam exploded"));
}

#[test]
fn volatile_selector_is_cleared_after_perform() {
    let mut plan = plan();
    plan.select_with(
        Selector::indices(&[0, 0]),
        explan_plan::SelectOptions {
            volatile: true,
            ..Default::default()
        },
    );
    let calls = AtomicUsize::new(0);
    plan.perform(
        |_: &Setting, calls: &AtomicUsize| -> Result<(), std::io::Error> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        &calls,
        &PerformOptions::default(),
    )
    .expect("perform");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(plan.selector().is_none());
    assert_eq!(plan.count().expect("count"), 12);
}
