use std::sync::{Arc, Mutex};

use explan_core::errors::{ErrorInfo, ExplanError};
use explan_core::hash::{memo_key, stable_hash_string};
use explan_core::modality::Modality;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::expand::{expand, ExpandOptions, Expansion};
use crate::factors::ModalityStore;
use crate::selector::Selector;
use crate::setting::Setting;

/// Options attached to an active selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectOptions {
    /// Clear the selector once a full pass over the settings completes.
    pub volatile: bool,
    /// Drop repeated combinations.
    pub prune: bool,
    /// Fail on invalid sub-selectors instead of dropping them.
    pub strict: bool,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            volatile: false,
            prune: true,
            strict: false,
        }
    }
}

impl SelectOptions {
    fn expand_options(&self) -> ExpandOptions {
        ExpandOptions {
            prune: self.prune,
            strict: self.strict,
        }
    }
}

#[derive(Serialize)]
struct MemoInput<'a> {
    factors: &'a ModalityStore,
    selector: Option<&'a Selector>,
    prune: bool,
    strict: bool,
}

type Memo = Option<(u64, Arc<Expansion>)>;

/// Experiment plan: factors, defaults and the active selection.
#[derive(Debug, Default)]
pub struct Plan {
    store: Arc<ModalityStore>,
    selector: Option<Selector>,
    options: SelectOptions,
    memo: Mutex<Memo>,
}

impl Clone for Plan {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            selector: self.selector.clone(),
            options: self.options,
            memo: Mutex::new(None),
        }
    }
}

impl Plan {
    /// Creates a plan without factors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a plan over an existing factor set.
    pub fn from_store(store: ModalityStore) -> Self {
        Self {
            store: Arc::new(store),
            ..Self::default()
        }
    }

    /// Declares (or redeclares) a factor.
    pub fn add_factor(
        &mut self,
        name: impl Into<String>,
        modalities: Vec<Modality>,
    ) -> Result<&mut Self, ExplanError> {
        Arc::make_mut(&mut self.store).set_factor(name, modalities)?;
        Ok(self)
    }

    /// Sets the default modality of `name`.
    pub fn set_default(
        &mut self,
        name: &str,
        modality: impl Into<Modality>,
    ) -> Result<&mut Self, ExplanError> {
        Arc::make_mut(&mut self.store).set_default(name, modality)?;
        Ok(self)
    }

    /// Factor set of the plan.
    pub fn factors(&self) -> &ModalityStore {
        &self.store
    }

    /// Factor names in declaration order.
    pub fn factor_names(&self) -> Vec<&str> {
        self.store.names()
    }

    /// Number of declared factors.
    pub fn nb_factors(&self) -> usize {
        self.store.len()
    }

    /// Activates `selector` with the default options.
    pub fn select(&mut self, selector: impl Into<Selector>) -> &mut Self {
        self.select_with(selector, SelectOptions::default())
    }

    /// Activates `selector`.
    pub fn select_with(&mut self, selector: impl Into<Selector>, options: SelectOptions) -> &mut Self {
        self.selector = Some(selector.into());
        self.options = options;
        self
    }

    /// Drops the active selector; every combination becomes active.
    pub fn clear_selection(&mut self) -> &mut Self {
        self.selector = None;
        self.options = SelectOptions::default();
        self
    }

    /// Active selector, if any.
    pub fn selector(&self) -> Option<&Selector> {
        self.selector.as_ref()
    }

    /// Options of the active selection.
    pub fn select_options(&self) -> SelectOptions {
        self.options
    }

    /// Expansion of the active selector.
    ///
    /// The result is cached under a key derived from the factor set, the
    /// selector and the expansion options, so repeated calls on an unchanged
    /// plan do not expand again.
    pub fn expansion(&self) -> Result<Arc<Expansion>, ExplanError> {
        let key = memo_key(&MemoInput {
            factors: &self.store,
            selector: self.selector.as_ref(),
            prune: self.options.prune,
            strict: self.options.strict,
        })?;
        let mut memo = self.memo.lock().map_err(|_| {
            ExplanError::Execution(ErrorInfo::new(
                "explan_plan.memo_poisoned",
                "expansion cache lock poisoned",
            ))
        })?;
        if let Some((cached, expansion)) = memo.as_ref() {
            if *cached == key {
                debug!(key, "expansion cache hit");
                return Ok(Arc::clone(expansion));
            }
        }
        debug!(key, "expansion cache miss");
        let selector = self.selector.clone().unwrap_or_default();
        let expansion = Arc::new(expand(&selector, &self.store, self.options.expand_options())?);
        *memo = Some((key, Arc::clone(&expansion)));
        Ok(expansion)
    }

    /// Whether every sub-selector of the active selector is valid.
    pub fn is_valid(&self) -> Result<bool, ExplanError> {
        Ok(self.expansion()?.is_valid())
    }

    /// Active settings in enumeration order.
    pub fn settings(&self) -> Result<Vec<Setting>, ExplanError> {
        let expansion = self.expansion()?;
        Ok(expansion
            .tuples()
            .iter()
            .map(|tuple| Setting::new(Arc::clone(&self.store), tuple.clone()))
            .collect())
    }

    /// Iterates over the active settings.
    ///
    /// A volatile selection is cleared once the iterator is exhausted.
    pub fn iter(&mut self) -> Result<SettingIter<'_>, ExplanError> {
        let expansion = self.expansion()?;
        Ok(SettingIter {
            plan: self,
            expansion,
            next: 0,
        })
    }

    /// Number of active settings.
    pub fn count(&self) -> Result<usize, ExplanError> {
        Ok(self.expansion()?.len())
    }

    /// SHA-256 of the canonical factor set and selector.
    pub fn plan_hash(&self) -> Result<String, ExplanError> {
        stable_hash_string(&(self.store.as_ref(), self.selector.as_ref()))
    }

    /// Human readable summary: factors, modalities (default starred) and the
    /// number of active settings.
    pub fn describe(&self) -> Result<String, ExplanError> {
        let mut out = String::new();
        for factor in self.store.iter() {
            let rendered = factor
                .modalities()
                .iter()
                .enumerate()
                .map(|(index, modality)| {
                    if factor.default_index() == Some(index) {
                        format!("{modality}*")
                    } else {
                        modality.to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("{} ({}): {}\n", factor.name(), factor.kind(), rendered));
        }
        out.push_str(&format!("{} settings selected", self.count()?));
        Ok(out)
    }

    pub(crate) fn finish_pass(&mut self) {
        if self.options.volatile {
            debug!("clearing volatile selector");
            self.clear_selection();
        }
    }
}

/// Iterator over the settings of a [`Plan`].
#[derive(Debug)]
pub struct SettingIter<'a> {
    plan: &'a mut Plan,
    expansion: Arc<Expansion>,
    next: usize,
}

impl Iterator for SettingIter<'_> {
    type Item = Setting;

    fn next(&mut self) -> Option<Setting> {
        match self.expansion.tuples().get(self.next) {
            Some(tuple) => {
                self.next += 1;
                Some(Setting::new(Arc::clone(&self.plan.store), tuple.clone()))
            }
            None => {
                if self.next == self.expansion.len() {
                    self.next += 1;
                    self.plan.finish_pass();
                }
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.expansion.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> Plan {
        let mut plan = Plan::new();
        plan.add_factor("f1", Modality::ints([1, 3])).unwrap();
        plan.add_factor("f2", Modality::ints([2, 4])).unwrap();
        plan
    }

    #[test]
    fn memo_follows_mutation() {
        let mut plan = plan();
        let first = plan.expansion().unwrap();
        let again = plan.expansion().unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        plan.add_factor("f3", Modality::strs(["x", "y"])).unwrap();
        assert_eq!(plan.count().unwrap(), 8);
        plan.select(Selector::indices(&[0]));
        assert_eq!(plan.count().unwrap(), 4);
    }

    #[test]
    fn volatile_selection_clears_after_a_pass() {
        let mut plan = plan();
        plan.select_with(
            Selector::indices(&[1, 0]),
            SelectOptions {
                volatile: true,
                ..SelectOptions::default()
            },
        );
        let first: Vec<_> = plan.iter().unwrap().collect();
        assert_eq!(first.len(), 1);
        assert!(plan.selector().is_none());
        assert_eq!(plan.iter().unwrap().count(), 4);
    }

    #[test]
    fn partial_iteration_keeps_volatile_selector() {
        let mut plan = plan();
        plan.select_with(
            Selector::indices(&[-1, -1]),
            SelectOptions {
                volatile: true,
                ..SelectOptions::default()
            },
        );
        let first = plan.iter().unwrap().next();
        assert!(first.is_some());
        assert!(plan.selector().is_some());
    }

    #[test]
    fn describe_marks_defaults() {
        let mut plan = plan();
        plan.set_default("f1", 3).unwrap();
        let text = plan.describe().unwrap();
        assert!(text.contains("f1 (int): 1, 3*"));
        assert!(text.ends_with("4 settings selected"));
    }

    #[test]
    fn describe_lists_every_factor() {
        let mut plan = plan();
        plan.select(Selector::indices(&[1, 0]));
        assert_eq!(
            plan.describe().unwrap(),
            "f1 (int): 1, 3\nf2 (int): 2, 4\n1 settings selected"
        );
    }

    #[test]
    fn plan_hash_tracks_selector() {
        let mut plan = plan();
        let before = plan.plan_hash().unwrap();
        plan.select(Selector::indices(&[0]));
        assert_ne!(before, plan.plan_hash().unwrap());
        assert_eq!(before.len(), 64);
    }
}
