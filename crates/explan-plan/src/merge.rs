use explan_core::errors::{ErrorInfo, ExplanError};
use explan_core::modality::{Modality, ModalityKind};
use tracing::debug;

use crate::factors::ModalityStore;
use crate::plan::Plan;
use crate::selector::{Selector, Slot};

struct MergedFactor {
    name: String,
    kind: ModalityKind,
    modalities: Vec<Modality>,
    defaults: Vec<Modality>,
    present_in: usize,
}

fn merge_error(code: &str, message: &str, factor: &str) -> ExplanError {
    ExplanError::Merge(ErrorInfo::new(code, message).with_context("factor", factor))
}

/// Merges plans into one whose factors are the union of theirs.
///
/// Modalities are unioned in first-seen order. A factor shared by every plan
/// keeps its default, and plans declaring different defaults for it cannot be
/// merged. A factor missing from some plan gets a placeholder modality (`0`,
/// `0.0` or `"none"`) prepended when absent, and the placeholder becomes its
/// default. The merged plan selects the union of the input spaces, each
/// input contributing its own modalities with its missing factors pinned to
/// the placeholder.
pub fn merge_plans(plans: &[Plan]) -> Result<Plan, ExplanError> {
    let mut merged: Vec<MergedFactor> = Vec::new();
    for plan in plans {
        for factor in plan.factors().iter() {
            let position = match merged.iter().position(|m| m.name == factor.name()) {
                Some(position) => position,
                None => {
                    merged.push(MergedFactor {
                        name: factor.name().to_string(),
                        kind: factor.kind(),
                        modalities: Vec::new(),
                        defaults: Vec::new(),
                        present_in: 0,
                    });
                    merged.len() - 1
                }
            };
            let slot = &mut merged[position];
            if slot.kind != factor.kind() {
                return Err(ExplanError::Merge(
                    ErrorInfo::new("explan_plan.kind_conflict", "factor kinds differ between plans")
                        .with_context("factor", factor.name())
                        .with_context("left", slot.kind.to_string())
                        .with_context("right", factor.kind().to_string()),
                ));
            }
            slot.present_in += 1;
            for modality in factor.modalities() {
                if !slot.modalities.contains(modality) {
                    slot.modalities.push(modality.clone());
                }
            }
            if let Some(default) = factor.default_modality() {
                if !slot.defaults.contains(default) {
                    slot.defaults.push(default.clone());
                }
            }
        }
    }

    let mut store = ModalityStore::new();
    for factor in &mut merged {
        let default = if factor.present_in < plans.len() {
            let placeholder = Modality::placeholder(factor.kind);
            if !factor.modalities.contains(&placeholder) {
                factor.modalities.insert(0, placeholder.clone());
            }
            Some(placeholder)
        } else {
            match factor.defaults.as_slice() {
                [] => None,
                [only] => Some(only.clone()),
                _ => {
                    return Err(merge_error(
                        "explan_plan.default_conflict",
                        "conflicting default modality",
                        &factor.name,
                    ))
                }
            }
        };
        store.set_factor(factor.name.clone(), factor.modalities.clone())?;
        if let Some(default) = default {
            store.set_default(&factor.name, default)?;
        }
    }

    let mut parts = Vec::with_capacity(plans.len());
    for plan in plans {
        let mut slots = Vec::with_capacity(store.len());
        for target in store.iter() {
            let slot = match plan.factors().factor(target.name()) {
                Some(source) => Slot::AnyOf(
                    source
                        .modalities()
                        .iter()
                        .filter_map(|m| target.position_of(m))
                        .map(|index| index as i64)
                        .collect(),
                ),
                None => Slot::Index(target.default_index().unwrap_or(0) as i64),
            };
            slots.push(slot);
        }
        parts.push(Selector::Slots(slots));
    }
    debug!(
        plans = plans.len(),
        factors = store.len(),
        "merged plans"
    );

    let mut plan = Plan::from_store(store);
    if !parts.is_empty() {
        plan.select(Selector::Many(parts));
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::IdentifierOptions;

    #[test]
    fn placeholder_becomes_default_for_partial_factors() {
        let mut left = Plan::new();
        left.add_factor("lr", Modality::floats([0.1, 0.01])).unwrap();
        left.add_factor("optim", Modality::strs(["sgd"])).unwrap();
        let mut right = Plan::new();
        right.add_factor("lr", Modality::floats([0.01, 0.001])).unwrap();

        let merged = merge_plans(&[left, right]).unwrap();
        let lr = merged.factors().factor("lr").unwrap();
        assert_eq!(lr.modalities(), Modality::floats([0.1, 0.01, 0.001]).as_slice());
        assert_eq!(lr.default_index(), None);
        let optim = merged.factors().factor("optim").unwrap();
        assert_eq!(optim.modalities(), Modality::strs(["none", "sgd"]).as_slice());
        assert_eq!(optim.default_modality(), Some(&Modality::from("none")));
        // Shared lr=0.01 differs by optim, so nothing collapses.
        assert_eq!(merged.count().unwrap(), 4);
    }

    #[test]
    fn disagreeing_defaults_are_fatal() {
        let mut left = Plan::new();
        left.add_factor("seed", Modality::ints([1, 2])).unwrap();
        left.set_default("seed", 1).unwrap();
        let mut right = Plan::new();
        right.add_factor("seed", Modality::ints([1, 2])).unwrap();
        right.set_default("seed", 2).unwrap();
        let err = merge_plans(&[left, right]).unwrap_err();
        assert!(matches!(err, ExplanError::Merge(_)));
        assert_eq!(err.code(), "explan_plan.default_conflict");
    }

    #[test]
    fn kinds_must_agree() {
        let mut left = Plan::new();
        left.add_factor("seed", Modality::ints([1])).unwrap();
        let mut right = Plan::new();
        right.add_factor("seed", Modality::strs(["1"])).unwrap();
        assert_eq!(
            merge_plans(&[left, right]).unwrap_err().code(),
            "explan_plan.kind_conflict"
        );
    }

    #[test]
    fn shared_factor_keeps_agreed_default() {
        let mut left = Plan::new();
        left.add_factor("seed", Modality::ints([1, 2])).unwrap();
        left.set_default("seed", 2).unwrap();
        let mut right = Plan::new();
        right.add_factor("seed", Modality::ints([2, 3])).unwrap();
        right.set_default("seed", 2).unwrap();
        let merged = merge_plans(&[left.clone(), right]).unwrap();
        let seed = merged.factors().factor("seed").unwrap();
        assert_eq!(seed.modalities(), Modality::ints([1, 2, 3]).as_slice());
        assert_eq!(seed.default_modality(), Some(&Modality::Int(2)));

        // Only one plan declares a default.
        let mut bare = Plan::new();
        bare.add_factor("seed", Modality::ints([3])).unwrap();
        let merged = merge_plans(&[bare, left]).unwrap();
        let seed = merged.factors().factor("seed").unwrap();
        assert_eq!(seed.modalities(), Modality::ints([3, 1, 2]).as_slice());
        assert_eq!(seed.default_modality(), Some(&Modality::Int(2)));
    }

    #[test]
    fn existing_placeholder_is_not_prepended_twice() {
        let mut left = Plan::new();
        left.add_factor("lr", Modality::floats([0.1])).unwrap();
        left.add_factor("optim", Modality::strs(["sgd", "none"])).unwrap();
        let mut right = Plan::new();
        right.add_factor("lr", Modality::floats([0.1])).unwrap();
        let merged = merge_plans(&[left, right]).unwrap();
        let optim = merged.factors().factor("optim").unwrap();
        assert_eq!(optim.modalities(), Modality::strs(["sgd", "none"]).as_slice());
        assert_eq!(optim.default_modality(), Some(&Modality::from("none")));
    }

    #[test]
    fn merged_plan_runs_shared_and_placeholder_factors() {
        let mut left = Plan::new();
        left.add_factor("seed", Modality::ints([1, 2])).unwrap();
        left.add_factor("optim", Modality::strs(["sgd", "adam"])).unwrap();
        left.set_default("seed", 1).unwrap();
        let mut right = Plan::new();
        right.add_factor("seed", Modality::ints([1, 3])).unwrap();
        right.set_default("seed", 1).unwrap();

        let merged = merge_plans(&[left, right]).unwrap();
        let identifiers: Vec<String> = merged
            .settings()
            .unwrap()
            .iter()
            .map(|setting| setting.identifier(&IdentifierOptions::default()))
            .collect();
        assert_eq!(
            identifiers,
            [
                "optim_sgd",
                "optim_adam",
                "optim_sgd_seed_2",
                "optim_adam_seed_2",
                "",
                "seed_3",
            ]
        );
    }

    #[test]
    fn default_conflict_fails_alongside_placeholders() {
        let mut left = Plan::new();
        left.add_factor("optim", Modality::strs(["sgd"])).unwrap();
        left.add_factor("seed", Modality::ints([1, 2])).unwrap();
        left.set_default("seed", 1).unwrap();
        let mut right = Plan::new();
        right.add_factor("seed", Modality::ints([1, 2])).unwrap();
        right.set_default("seed", 2).unwrap();
        let err = merge_plans(&[left, right]).unwrap_err();
        assert_eq!(err.code(), "explan_plan.default_conflict");
        assert_eq!(err.info().context.get("factor").map(String::as_str), Some("seed"));
    }
}
