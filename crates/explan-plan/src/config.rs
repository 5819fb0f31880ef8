//! YAML plan configuration.
//!
//! ```yaml
//! factors:
//!   - name: f1
//!     modalities: [1, 3]
//!     default: 1
//! selector: [1, 0]
//! volatile: false
//! metrics:
//!   mae: [mean, std%]
//! ```

use std::fmt;
use std::fs;
use std::path::Path;

use explan_core::errors::{ErrorInfo, ExplanError};
use explan_core::modality::Modality;
use explan_core::serde::{from_yaml_slice, to_yaml_string};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::plan::{Plan, SelectOptions};
use crate::selector::Selector;

fn io_error(code: &str, path: &Path, err: impl ToString) -> ExplanError {
    ExplanError::Config(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
    )
}

/// Factor declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorConfig {
    /// Factor name.
    pub name: String,
    /// Ordered modalities.
    pub modalities: Vec<Modality>,
    /// Default modality, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Modality>,
}

/// Reduction directive as written: a name with suffixes, or a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DirectiveText {
    /// Positional index into the data vector.
    Index(i64),
    /// Aggregation name with optional pruning and percent suffixes.
    Text(String),
}

impl fmt::Display for DirectiveText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectiveText::Index(index) => write!(f, "{index}"),
            DirectiveText::Text(text) => f.write_str(text),
        }
    }
}

/// Metric name with its directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricConfig {
    /// Metric name, also the artifact suffix.
    pub name: String,
    /// Directives in column order.
    pub directives: Vec<DirectiveText>,
}

/// Plan configuration loaded from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Factors in declaration order.
    pub factors: Vec<FactorConfig>,
    /// Selector in its JSON form; absent means every combination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Value>,
    /// Clear the selector after one full pass.
    #[serde(default)]
    pub volatile: bool,
    /// De-duplicate settings.
    #[serde(default = "default_prune")]
    pub prune: bool,
    /// Metrics, in declaration order.
    #[serde(
        default,
        serialize_with = "serialize_metrics",
        deserialize_with = "deserialize_metrics"
    )]
    pub metrics: Vec<MetricConfig>,
}

fn default_prune() -> bool {
    true
}

fn serialize_metrics<S: Serializer>(metrics: &[MetricConfig], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(metrics.len()))?;
    for metric in metrics {
        map.serialize_entry(&metric.name, &metric.directives)?;
    }
    map.end()
}

struct MetricsVisitor;

impl<'de> Visitor<'de> for MetricsVisitor {
    type Value = Vec<MetricConfig>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map from metric name to directives")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut metrics = Vec::new();
        while let Some((name, directives)) = access.next_entry::<String, Vec<DirectiveText>>()? {
            metrics.push(MetricConfig { name, directives });
        }
        Ok(metrics)
    }
}

fn deserialize_metrics<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<MetricConfig>, D::Error> {
    deserializer.deserialize_map(MetricsVisitor)
}

impl PlanConfig {
    /// Builds the plan: factors, defaults and the selector.
    pub fn build(&self) -> Result<Plan, ExplanError> {
        let mut plan = Plan::new();
        for factor in &self.factors {
            plan.add_factor(factor.name.clone(), factor.modalities.clone())?;
            if let Some(default) = &factor.default {
                plan.set_default(&factor.name, default.clone())?;
            }
        }
        if let Some(value) = &self.selector {
            let selector = Selector::from_value(value)?;
            plan.select_with(
                selector,
                SelectOptions {
                    volatile: self.volatile,
                    prune: self.prune,
                    strict: false,
                },
            );
        } else if self.volatile || !self.prune {
            plan.select_with(
                Selector::All,
                SelectOptions {
                    volatile: self.volatile,
                    prune: self.prune,
                    strict: false,
                },
            );
        }
        Ok(plan)
    }

    /// Renders the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String, ExplanError> {
        to_yaml_string(self)
    }
}

/// Loads a plan configuration from a YAML file.
pub fn load_plan_config<P: AsRef<Path>>(path: P) -> Result<PlanConfig, ExplanError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|err| io_error("explan_plan.config_read", path, err))?;
    from_yaml_slice(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
factors:
  - name: f1
    modalities: [1, 3]
    default: 1
  - name: optim
    modalities: [sgd, adam]
selector: [1, -1]
metrics:
  mae: [mean, std%]
  loss: [0, min-0]
"#;

    #[test]
    fn metrics_keep_declaration_order() {
        let config: PlanConfig = from_yaml_slice(YAML.as_bytes()).unwrap();
        let names: Vec<_> = config.metrics.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["mae", "loss"]);
        assert_eq!(
            config.metrics[1].directives,
            vec![DirectiveText::Index(0), DirectiveText::Text("min-0".to_string())]
        );
        assert!(config.prune);
    }

    #[test]
    fn build_applies_defaults_and_selector() {
        let config: PlanConfig = from_yaml_slice(YAML.as_bytes()).unwrap();
        let plan = config.build().unwrap();
        assert_eq!(plan.factor_names(), ["f1", "optim"]);
        assert_eq!(
            plan.factors().factor("f1").unwrap().default_modality(),
            Some(&Modality::Int(1))
        );
        assert_eq!(plan.count().unwrap(), 2);
    }

    #[test]
    fn yaml_output_reloads() {
        let config: PlanConfig = from_yaml_slice(YAML.as_bytes()).unwrap();
        let text = config.to_yaml().unwrap();
        let again: PlanConfig = from_yaml_slice(text.as_bytes()).unwrap();
        assert_eq!(config, again);
    }
}
