#![deny(missing_docs)]
#![doc = "Factors, selectors, settings and plans for explan experiment plans."]

/// YAML plan configuration.
pub mod config;
/// Plan execution and the failure log.
pub mod dispatch;
/// Selector expansion into concrete modality tuples.
pub mod expand;
/// Factor declarations and the modality store.
pub mod factors;
/// Identifier rendering options.
pub mod ident;
/// Merging of several plans into one.
pub mod merge;
/// The experiment plan and its memoized expansion.
pub mod plan;
pub mod selector;
/// Concrete settings, identifiers and per-setting execution.
pub mod setting;

pub use config::{load_plan_config, DirectiveText, FactorConfig, MetricConfig, PlanConfig};
pub use dispatch::{ErrorLog, PerformOptions};
pub use expand::{expand, ExpandOptions, Expansion};
pub use factors::{Factor, FactorRef, ModalityStore, RESERVED_NAMES};
pub use ident::{Abbreviation, IdentifierOptions, WordStyle};
pub use merge::merge_plans;
pub use plan::{Plan, SelectOptions, SettingIter};
pub use selector::{Selector, Slot};
pub use setting::{BoxError, Locator, OnError, Setting};
