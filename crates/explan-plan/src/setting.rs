use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use explan_core::errors::{ErrorInfo, ExplanError};
use explan_core::hash::digest128_hex;
use explan_core::modality::Modality;
use tracing::error;

use crate::dispatch::ErrorLog;
use crate::factors::ModalityStore;
use crate::ident::IdentifierOptions;

/// Boxed error returned by user functions.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// One modality per factor, bound to the factor set it was enumerated from.
#[derive(Debug, Clone)]
pub struct Setting {
    store: Arc<ModalityStore>,
    indices: Vec<usize>,
}

/// Addresses the new modality in [`Setting::replace`].
#[derive(Debug, Clone, PartialEq)]
pub enum Locator {
    /// A modality value of the factor.
    Value(Modality),
    /// An absolute modality index.
    Position(usize),
    /// A signed offset from the current index.
    Offset(isize),
}

/// Failure policy applied by [`Setting::run`].
#[derive(Debug, Clone, Copy)]
pub enum OnError<'a> {
    /// Return the failure as an error, stopping the caller.
    Raise,
    /// Log the failure (and append it to the log, if any) and keep going.
    Record(Option<&'a ErrorLog>),
}

impl Setting {
    pub(crate) fn new(store: Arc<ModalityStore>, indices: Vec<usize>) -> Self {
        Self { store, indices }
    }

    /// Factor set the setting belongs to.
    pub fn factors(&self) -> &ModalityStore {
        &self.store
    }

    /// Modality indices in factor declaration order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Modality index of `factor`.
    pub fn index(&self, factor: &str) -> Option<usize> {
        self.store
            .position(factor)
            .and_then(|position| self.indices.get(position).copied())
    }

    /// Modality of `factor`.
    pub fn modality(&self, factor: &str) -> Option<&Modality> {
        let position = self.store.position(factor)?;
        self.store.factor_at(position)?.modality(self.indices[position])
    }

    /// `(factor, modality)` pairs in declaration order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &Modality)> + '_ {
        self.store
            .iter()
            .zip(self.indices.iter())
            .filter_map(|(factor, &index)| factor.modality(index).map(|m| (factor.name(), m)))
    }

    /// Identifier with the default options.
    pub fn id(&self) -> String {
        self.identifier(&IdentifierOptions::default())
    }

    /// Storage key of the setting.
    ///
    /// A factor is left out when it is listed in `hide`, when it is a
    /// singleton and singletons are excluded, or when it sits at its default
    /// and defaults are hidden. Each rule applies on its own.
    pub fn identifier(&self, opts: &IdentifierOptions) -> String {
        let mut parts: Vec<(&str, String, String)> = Vec::new();
        for (factor, &index) in self.store.iter().zip(self.indices.iter()) {
            if opts.hide.iter().any(|hidden| hidden == factor.name()) {
                continue;
            }
            if !opts.include_singleton && factor.is_singleton() {
                continue;
            }
            if opts.hide_default && factor.default_index() == Some(index) {
                continue;
            }
            let Some(modality) = factor.modality(index) else {
                continue;
            };
            let label = match &opts.abbreviation {
                Some(abbreviation) => abbreviation.apply(factor.name()),
                None => factor.name().to_string(),
            };
            parts.push((factor.name(), label, modality.to_string()));
        }
        if opts.sort {
            parts.sort_by(|a, b| a.0.cmp(b.0));
        }
        let identifier = parts
            .into_iter()
            .flat_map(|(_, label, value)| [label, value])
            .collect::<Vec<_>>()
            .join(&opts.separator);
        if opts.hash_output {
            digest128_hex(&identifier)
        } else {
            identifier
        }
    }

    /// Derives the sibling setting with one factor moved to another modality.
    ///
    /// Positions are absolute: replacing twice by position is the same as
    /// replacing once with the second position.
    pub fn replace(&self, factor: &str, locator: Locator) -> Result<Setting, ExplanError> {
        let position = self.store.position(factor).ok_or_else(|| {
            ExplanError::Config(
                ErrorInfo::new("explan_plan.unknown_factor", "unknown factor")
                    .with_context("factor", factor),
            )
        })?;
        let target = self.store.factor_at(position).ok_or_else(|| {
            ExplanError::Config(
                ErrorInfo::new("explan_plan.unknown_factor", "unknown factor")
                    .with_context("factor", factor),
            )
        })?;
        let current = self.indices[position];
        let index = match &locator {
            Locator::Value(value) => target.position_of(value).ok_or_else(|| {
                ExplanError::Selector(
                    ErrorInfo::new("explan_plan.unknown_modality", "unknown modality value")
                        .with_context("factor", factor)
                        .with_context("modality", value.to_string()),
                )
            })?,
            Locator::Position(index) => *index,
            Locator::Offset(offset) => {
                let shifted = current as i128 + *offset as i128;
                usize::try_from(shifted).unwrap_or(usize::MAX)
            }
        };
        if index >= target.len() {
            return Err(ExplanError::Selector(
                ErrorInfo::new("explan_plan.index_range", "replacement index out of range")
                    .with_context("factor", factor)
                    .with_context("current", current.to_string())
                    .with_context("locator", format!("{locator:?}"))
                    .with_context("modalities", target.len().to_string()),
            ));
        }
        let mut indices = self.indices.clone();
        indices[position] = index;
        Ok(Setting::new(Arc::clone(&self.store), indices))
    }

    /// Invokes `function(self, collaborator)`.
    ///
    /// Returns `Ok(false)` on success and `Ok(true)` for a recorded failure;
    /// with [`OnError::Raise`] the failure is returned instead.
    pub fn run<C, F, E>(
        &self,
        function: F,
        collaborator: &C,
        on_error: OnError<'_>,
    ) -> Result<bool, ExplanError>
    where
        C: ?Sized,
        F: Fn(&Setting, &C) -> Result<(), E>,
        E: Into<BoxError>,
    {
        let chain = match on_error {
            OnError::Raise => match function(self, collaborator) {
                Ok(()) => return Ok(false),
                Err(err) => boxed_chain(err.into()),
            },
            OnError::Record(_) => {
                match panic::catch_unwind(AssertUnwindSafe(|| function(self, collaborator))) {
                    Ok(Ok(())) => return Ok(false),
                    Ok(Err(err)) => boxed_chain(err.into()),
                    Err(payload) => vec![panic_message(payload.as_ref())],
                }
            }
        };
        let identifier = self.id();
        match on_error {
            OnError::Raise => {
                let mut info = ErrorInfo::new(
                    "explan_plan.setting_failed",
                    chain.first().cloned().unwrap_or_default(),
                )
                .with_context("setting", identifier);
                if chain.len() > 1 {
                    info = info.with_hint(chain[1..].join(": "));
                }
                Err(ExplanError::Execution(info))
            }
            OnError::Record(log) => {
                error!(setting = %identifier, "setting failed: {}", chain.join(": "));
                if let Some(log) = log {
                    log.record(&identifier, &chain)?;
                }
                Ok(true)
            }
        }
    }
}

impl PartialEq for Setting {
    fn eq(&self, other: &Self) -> bool {
        self.indices == other.indices
            && (Arc::ptr_eq(&self.store, &other.store) || self.store == other.store)
    }
}

impl Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .pairs()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("+");
        f.write_str(&rendered)
    }
}

fn boxed_chain(err: BoxError) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        format!("panic: {text}")
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("panic: {text}")
    } else {
        "panic: <non-string payload>".to_string()
    }
}
