use explan_plan::config::{MetricConfig, PlanConfig};
use serde::{Deserialize, Serialize};

use crate::directive::Directive;

/// Metric name with the directives reducing its data, one column each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Metric name; also the artifact key next to the setting identifier.
    pub name: String,
    /// Directives in column order.
    pub directives: Vec<Directive>,
}

impl MetricSpec {
    /// Parses every directive text.
    pub fn new<S: AsRef<str>>(name: impl Into<String>, directives: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            directives: directives
                .into_iter()
                .map(|text| Directive::parse(text.as_ref()))
                .collect(),
        }
    }

    /// Converts a configured metric.
    pub fn from_config(config: &MetricConfig) -> Self {
        Self {
            name: config.name.clone(),
            directives: config.directives.iter().map(Directive::from_text).collect(),
        }
    }

    /// Metrics declared in a plan configuration, in declaration order.
    pub fn from_plan_config(config: &PlanConfig) -> Vec<Self> {
        config.metrics.iter().map(Self::from_config).collect()
    }

    /// Column labels, `<metric>_<directive>`.
    pub fn columns(&self) -> Vec<String> {
        self.directives
            .iter()
            .map(|directive| format!("{}_{}", self.name, directive))
            .collect()
    }
}

/// Where reduced data comes from.
pub trait MetricSource {
    /// Raw data stored for `metric` under `identifier`, flattened, or `None`
    /// when nothing usable is stored.
    fn fetch(&self, identifier: &str, metric: &str) -> Option<Vec<f64>>;
}
