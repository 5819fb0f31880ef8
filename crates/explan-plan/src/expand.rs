use std::collections::HashSet;

use explan_core::errors::{ErrorInfo, ExplanError};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::factors::ModalityStore;
use crate::selector::{Selector, Slot};

/// Options controlling selector expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandOptions {
    /// Drop repeated combinations, keeping the first occurrence.
    pub prune: bool,
    /// Fail on the first invalid sub-selector instead of dropping it.
    pub strict: bool,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            prune: true,
            strict: false,
        }
    }
}

/// Concrete modality-index tuples produced by a selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Expansion {
    tuples: Vec<Vec<usize>>,
    issues: Vec<ErrorInfo>,
}

impl Expansion {
    /// Tuples in enumeration order.
    pub fn tuples(&self) -> &[Vec<usize>] {
        &self.tuples
    }

    /// Diagnostics for the sub-selectors that were dropped.
    pub fn issues(&self) -> &[ErrorInfo] {
        &self.issues
    }

    /// Whether every sub-selector was valid.
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// Number of tuples.
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    /// Whether the selection is empty.
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Consumes the expansion, returning its tuples.
    pub fn into_tuples(self) -> Vec<Vec<usize>> {
        self.tuples
    }
}

/// Expands `selector` against the factors of `store`.
///
/// Sub-selectors are normalised to one index list per factor, expanded to
/// their Cartesian product (last factor varying fastest) and concatenated.
/// Invalid sub-selectors contribute nothing and are reported through
/// [`Expansion::issues`], or returned as an error in strict mode.
pub fn expand(
    selector: &Selector,
    store: &ModalityStore,
    opts: ExpandOptions,
) -> Result<Expansion, ExplanError> {
    let mut expansion = Expansion::default();
    if store.is_empty() {
        return Ok(expansion);
    }
    let all = Selector::All;
    let mut parts = Vec::new();
    flatten(selector, &mut parts);
    if parts.is_empty() {
        parts.push(&all);
    }

    let mut seen = HashSet::new();
    for (entry, part) in parts.into_iter().enumerate() {
        let lists = match normalize(part, store) {
            Ok(lists) => lists,
            Err(found) => {
                for issue in found {
                    let issue = issue.with_context("entry", entry.to_string());
                    if opts.strict {
                        return Err(ExplanError::Selector(issue));
                    }
                    warn!(entry, code = %issue.code, "dropping sub-selector: {}", issue);
                    expansion.issues.push(issue);
                }
                continue;
            }
        };
        for tuple in cartesian(&lists) {
            if opts.prune && !seen.insert(tuple.clone()) {
                continue;
            }
            expansion.tuples.push(tuple);
        }
    }
    Ok(expansion)
}

fn flatten<'a>(selector: &'a Selector, out: &mut Vec<&'a Selector>) {
    match selector {
        Selector::Many(parts) => {
            for part in parts {
                flatten(part, out);
            }
        }
        other => out.push(other),
    }
}

fn normalize(selector: &Selector, store: &ModalityStore) -> Result<Vec<Vec<usize>>, Vec<ErrorInfo>> {
    match selector {
        Selector::All | Selector::Many(_) => Ok(full_ranges(store)),
        Selector::Slots(slots) => normalize_slots(slots, store),
        Selector::Named(entries) => normalize_named(entries, store),
    }
}

fn full_ranges(store: &ModalityStore) -> Vec<Vec<usize>> {
    store.iter().map(|factor| (0..factor.len()).collect()).collect()
}

fn normalize_slots(slots: &[Slot], store: &ModalityStore) -> Result<Vec<Vec<usize>>, Vec<ErrorInfo>> {
    let mut lists = full_ranges(store);
    let mut issues = Vec::new();
    for (position, slot) in slots.iter().enumerate() {
        let Some(factor) = store.factor_at(position) else {
            if *slot != Slot::All {
                issues.push(
                    ErrorInfo::new(
                        "explan_plan.surplus_slot",
                        "selector has more slots than the plan has factors",
                    )
                    .with_context("position", position.to_string()),
                );
            }
            continue;
        };
        let requested = match slot {
            Slot::All => continue,
            Slot::Index(index) => vec![*index],
            Slot::AnyOf(indices) => indices.clone(),
        };
        if requested.is_empty() {
            issues.push(
                ErrorInfo::new("explan_plan.empty_slot", "slot selects no modality")
                    .with_context("factor", factor.name()),
            );
            continue;
        }
        let mut resolved = Vec::with_capacity(requested.len());
        for index in requested {
            match usize::try_from(index).ok().filter(|i| *i < factor.len()) {
                Some(index) => resolved.push(index),
                None => issues.push(
                    ErrorInfo::new("explan_plan.index_range", "modality index out of range")
                        .with_context("factor", factor.name())
                        .with_context("index", index.to_string())
                        .with_context("modalities", factor.len().to_string()),
                ),
            }
        }
        lists[position] = resolved;
    }
    if issues.is_empty() {
        Ok(lists)
    } else {
        Err(issues)
    }
}

fn normalize_named(
    entries: &[(String, Vec<explan_core::Modality>)],
    store: &ModalityStore,
) -> Result<Vec<Vec<usize>>, Vec<ErrorInfo>> {
    let mut lists = full_ranges(store);
    let mut restricted = vec![false; store.len()];
    let mut issues = Vec::new();
    for (name, values) in entries {
        let Some(position) = store.position(name) else {
            issues.push(
                ErrorInfo::new("explan_plan.unknown_factor", "selector names an unknown factor")
                    .with_context("factor", name.clone()),
            );
            continue;
        };
        let Some(factor) = store.factor_at(position) else {
            continue;
        };
        if values.is_empty() {
            issues.push(
                ErrorInfo::new("explan_plan.empty_slot", "slot selects no modality")
                    .with_context("factor", name.clone()),
            );
            continue;
        }
        if !restricted[position] {
            lists[position].clear();
            restricted[position] = true;
        }
        for value in values {
            match factor.position_of(value) {
                Some(index) => lists[position].push(index),
                None => issues.push(
                    ErrorInfo::new("explan_plan.unknown_modality", "selector names an unknown modality")
                        .with_context("factor", name.clone())
                        .with_context("modality", value.to_string()),
                ),
            }
        }
    }
    if issues.is_empty() {
        Ok(lists)
    } else {
        Err(issues)
    }
}

fn cartesian(lists: &[Vec<usize>]) -> Vec<Vec<usize>> {
    match lists.split_first() {
        None => vec![Vec::new()],
        Some((head, tail)) => {
            let rest = cartesian(tail);
            let mut out = Vec::with_capacity(head.len() * rest.len());
            for &index in head {
                for combo in &rest {
                    let mut tuple = Vec::with_capacity(combo.len() + 1);
                    tuple.push(index);
                    tuple.extend_from_slice(combo);
                    out.push(tuple);
                }
            }
            out
        }
    }
}
