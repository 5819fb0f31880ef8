use explan_core::Modality;
use explan_data::{DataLocation, Directive, FileSink, GroupStore, MetricReducer, MetricSpec};
use explan_plan::{Abbreviation, IdentifierOptions, Plan};
use proptest::prelude::*;

fn plan() -> Plan {
    let mut plan = Plan::new();
    plan.add_factor("learning_rate", Modality::floats([0.1, 0.01]))
        .expect("lr");
    plan.add_factor("batchSize", Modality::ints([16, 32]))
        .expect("batch");
    plan.set_default("batchSize", 16).expect("default");
    plan
}

fn encodings() -> impl Strategy<Value = IdentifierOptions> {
    (any::<bool>(), any::<bool>(), any::<bool>(), prop::option::of(1usize..4)).prop_map(
        |(sort, hide_default, hashed, abbreviation)| {
            let mut opts = IdentifierOptions::default().hide_default(hide_default);
            opts.sort = sort;
            opts.hash_output = hashed;
            opts.abbreviation = abbreviation.map(Abbreviation::new);
            opts
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn values_written_under_an_identifier_are_read_back(
        encoding in encodings(),
        values in prop::collection::vec((-4_000_000i64..4_000_000).prop_map(|v| v as f64 / 4.0), 4),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        let settings = plan().settings().unwrap();
        for (setting, value) in settings.iter().zip(&values) {
            sink.write(&setting.identifier(&encoding), "score", &[*value]).unwrap();
        }
        let reducer = MetricReducer::new(vec![MetricSpec {
            name: "score".to_string(),
            directives: vec![Directive::position(0)],
        }]);
        let reduction = reducer.reduce(&settings, &DataLocation::files(dir.path()), &encoding);
        prop_assert_eq!(reduction.table.len(), 4);
        for (row, value) in values.iter().enumerate() {
            prop_assert_eq!(reduction.table.cell(row, "score_0").and_then(|c| c.as_f64()), Some(*value));
        }
    }
}

#[test]
fn store_values_are_read_back_under_the_same_encoding() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("results.sqlite");
    let encoding = IdentifierOptions::default().abbreviated(Abbreviation::new(1));
    let settings = plan().settings().expect("settings");
    {
        let mut store = GroupStore::open(&path).expect("open");
        for (index, setting) in settings.iter().enumerate() {
            store
                .write(&setting.identifier(&encoding), "acc", &[index as f64, 1.0])
                .expect("write");
        }
    }
    let reducer = MetricReducer::new(vec![MetricSpec::new("acc", ["sum"])]);
    let reduction = reducer.reduce(&settings, &DataLocation::Store(path), &encoding);
    let sums: Vec<f64> = reduction
        .table
        .rows
        .iter()
        .filter_map(|row| row.last().and_then(|cell| cell.as_f64()))
        .collect();
    assert_eq!(sums, [1.0, 2.0, 3.0, 4.0]);
}
