use explan_core::Modality;
use explan_data::{Cell, DataLocation, FileSink, GroupStore, MetricReducer, MetricSpec};
use explan_plan::{IdentifierOptions, Plan, Selector, Setting};

fn plan() -> Plan {
    let mut plan = Plan::new();
    plan.add_factor("f1", Modality::ints([1, 3])).expect("f1");
    plan.add_factor("optim", Modality::strs(["sgd", "adam"]))
        .expect("optim");
    plan
}

fn settings(plan: &mut Plan, selector: Selector) -> Vec<Setting> {
    plan.select(selector);
    plan.settings().expect("settings")
}

#[test]
fn metric_without_any_data_gets_no_column() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let sink = FileSink::new(dir.path());
    let mut plan = plan();
    let settings = settings(&mut plan, Selector::indices(&[0]));
    sink.write(&settings[0].id(), "mae", &[1.0, 3.0]).expect("write");
    sink.write(&settings[1].id(), "mae", &[2.0, 2.0]).expect("write");

    let reducer = MetricReducer::new(vec![
        MetricSpec::new("mae", ["mean", "std"]),
        MetricSpec::new("mse", ["mean"]),
    ]);
    let reduction = reducer.reduce(
        &settings,
        &DataLocation::files(dir.path()),
        &IdentifierOptions::default(),
    );
    assert_eq!(reduction.header(), ["optim", "mae_mean", "mae_std"]);
    assert_eq!(reduction.constant_description, "f1: 1");
    assert_eq!(reduction.factor_columns(), 1);
    assert_eq!(reduction.table.cell(0, "mae_std"), Some(&Cell::Metric(1.0)));
    assert_eq!(reduction.table.cell(1, "mae_std"), Some(&Cell::Metric(0.0)));
}

#[test]
fn partially_missing_metric_yields_nan_cells() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let sink = FileSink::new(dir.path());
    let mut plan = plan();
    let settings = settings(&mut plan, Selector::indices(&[-1, 0]));
    sink.write(&settings[0].id(), "mae", &[0.5]).expect("write");
    sink.write(&settings[1].id(), "mae", &[0.25]).expect("write");
    sink.write(&settings[1].id(), "mse", &[0.1]).expect("write");

    let reducer = MetricReducer::new(vec![
        MetricSpec::new("mae", ["mean"]),
        MetricSpec::new("mse", ["mean%"]),
    ]);
    let (rows, header, constant, factor_columns) = reducer
        .reduce(
            &settings,
            &DataLocation::files(dir.path()),
            &IdentifierOptions::default(),
        )
        .into_parts();
    assert_eq!(header, ["f1", "mae_mean", "mse_mean%"]);
    assert_eq!(constant, "optim: sgd");
    assert_eq!(factor_columns, 1);
    assert!(matches!(rows[0][2], Cell::Metric(v) if v.is_nan()));
    assert_eq!(rows[1][2], Cell::Metric(10.0));
}

#[test]
fn settings_without_data_are_skipped_and_single_rows_keep_factors() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let sink = FileSink::new(dir.path());
    let mut plan = plan();
    let settings = settings(&mut plan, Selector::All);
    sink.write(&settings[3].id(), "mae", &[4.0]).expect("write");

    let reducer = MetricReducer::new(vec![MetricSpec::new("mae", ["mean", "bogus"])]);
    let reduction = reducer.reduce(
        &settings,
        &DataLocation::files(dir.path()),
        &IdentifierOptions::default(),
    );
    assert_eq!(reduction.table.len(), 1);
    assert_eq!(reduction.header(), ["f1", "optim", "mae_mean", "mae_bogus"]);
    assert_eq!(reduction.constant_description, "");
    assert_eq!(
        reduction.table.cell(0, "optim"),
        Some(&Cell::Factor(Modality::from("adam")))
    );
    assert!(matches!(reduction.table.cell(0, "mae_bogus"), Some(Cell::Metric(v)) if v.is_nan()));
}

#[test]
fn group_store_feeds_the_reducer() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("results.sqlite");
    let mut plan = plan();
    let settings = settings(&mut plan, Selector::indices(&[-1, 1]));
    let encoding = IdentifierOptions::default().hashed();
    {
        let mut store = GroupStore::open(&path).expect("open");
        for (step, setting) in settings.iter().enumerate() {
            for epoch in 0..4 {
                store
                    .append(&setting.identifier(&encoding), "loss", (step * 10 + epoch) as f64)
                    .expect("append");
            }
        }
    }
    let reducer = MetricReducer::new(vec![MetricSpec::new("loss", ["min-0", "3", "argmax"])]);
    let reduction = reducer.reduce(&settings, &DataLocation::Store(path.clone()), &encoding);
    assert_eq!(reduction.header(), ["f1", "loss_min-0", "loss_3", "loss_argmax"]);
    assert_eq!(reduction.constant_description, "optim: adam");
    assert_eq!(reduction.table.rows[1][1], Cell::Metric(11.0));
    assert_eq!(reduction.table.rows[1][2], Cell::Metric(13.0));
    assert_eq!(reduction.table.rows[1][3], Cell::Metric(3.0));

    let raw = reducer.get(&settings, &DataLocation::Store(path), &encoding, "loss");
    assert_eq!(raw.len(), 2);
    assert_eq!(raw[0].1, vec![0.0, 1.0, 2.0, 3.0]);
}

#[test]
fn missing_store_reduces_to_an_empty_table() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let mut plan = plan();
    let settings = settings(&mut plan, Selector::All);
    let reducer = MetricReducer::new(vec![MetricSpec::new("mae", ["mean"])]);
    let reduction = reducer.reduce(
        &settings,
        &DataLocation::Store(dir.path().join("absent.sqlite")),
        &IdentifierOptions::default(),
    );
    assert!(reduction.table.is_empty());
    assert_eq!(reduction.header(), ["f1", "optim"]);
    assert!(!dir.path().join("absent.sqlite").exists());
}
