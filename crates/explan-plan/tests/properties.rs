use explan_core::Modality;
use explan_plan::{expand, ExpandOptions, IdentifierOptions, ModalityStore, Plan, Selector, Slot};
use proptest::prelude::*;

fn store(sizes: &[usize]) -> ModalityStore {
    let mut store = ModalityStore::new();
    for (position, size) in sizes.iter().enumerate() {
        store
            .set_factor(format!("f{position}"), Modality::ints(0..*size as i64))
            .expect("factor");
    }
    store
}

fn slot_strategy() -> impl Strategy<Value = Slot> {
    prop_oneof![
        Just(Slot::All),
        (0i64..4).prop_map(Slot::Index),
        prop::collection::vec(0i64..4, 1..4).prop_map(Slot::AnyOf),
    ]
}

fn selector_strategy() -> impl Strategy<Value = Selector> {
    prop::collection::vec(prop::collection::vec(slot_strategy(), 0..4), 1..4)
        .prop_map(|parts| Selector::Many(parts.into_iter().map(Selector::Slots).collect()))
}

proptest! {
    #[test]
    fn pruned_expansions_have_no_duplicates(
        sizes in prop::collection::vec(1usize..4, 1..4),
        selector in selector_strategy(),
    ) {
        let store = store(&sizes);
        let expansion = expand(&selector, &store, ExpandOptions::default()).unwrap();
        let mut seen = std::collections::HashSet::new();
        for tuple in expansion.tuples() {
            prop_assert!(seen.insert(tuple.clone()));
            prop_assert_eq!(tuple.len(), sizes.len());
            for (index, size) in tuple.iter().zip(&sizes) {
                prop_assert!(index < size);
            }
        }
    }

    #[test]
    fn re_expanding_singletons_is_idempotent(
        sizes in prop::collection::vec(1usize..4, 1..4),
        selector in selector_strategy(),
    ) {
        let store = store(&sizes);
        let first = expand(&selector, &store, ExpandOptions::default()).unwrap();
        let singletons = Selector::Many(
            first
                .tuples()
                .iter()
                .map(|tuple| Selector::Slots(tuple.iter().map(|&i| Slot::Index(i as i64)).collect()))
                .collect(),
        );
        let second = expand(&singletons, &store, ExpandOptions::default()).unwrap();
        if first.is_empty() {
            prop_assert!(second.len() == store.combinations() || second.is_empty());
        } else {
            prop_assert_eq!(first.tuples(), second.tuples());
        }
    }

    #[test]
    fn hide_default_omits_exactly_defaulted_factors(
        sizes in prop::collection::vec(2usize..4, 1..4),
        defaults in prop::collection::vec(0usize..2, 4),
    ) {
        let mut plan = Plan::from_store(store(&sizes));
        for position in 0..sizes.len() {
            plan.set_default(&format!("f{position}"), defaults[position] as i64).unwrap();
        }
        for setting in plan.settings().unwrap() {
            let id = setting.id();
            let full = setting.identifier(&IdentifierOptions::default().hide_default(false));
            let pieces: Vec<&str> = full.split('_').collect();
            prop_assert_eq!(pieces.len(), sizes.len() * 2);
            let at_default = (0..sizes.len())
                .filter(|&p| setting.indices()[p] == defaults[p])
                .count();
            let shown = if id.is_empty() { 0 } else { id.split('_').count() / 2 };
            prop_assert_eq!(shown, sizes.len() - at_default);
        }
    }
}
