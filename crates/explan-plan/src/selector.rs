//! Compact descriptions of a subset of the setting space.
//!
//! Selectors come in four shapes:
//!
//! * [`Selector::All`]: every combination;
//! * [`Selector::Slots`]: one [`Slot`] per factor in declaration order, missing
//!   trailing slots meaning "all";
//! * [`Selector::Named`]: `factor = value(s)` pairs, from a JSON object or the
//!   textual `f1=a+f2=3` form;
//! * [`Selector::Many`]: a union of the above.
//!
//! In the JSON list form a list whose elements are all lists (or objects) is a
//! union of sub-selectors; otherwise it is a single flat selector. A flat
//! selector whose slots are all lists can be disambiguated with a trailing
//! `-1`, which is ignored past the last factor.

use explan_core::errors::{ErrorInfo, ExplanError};
use explan_core::modality::Modality;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Selection for one factor slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Slot {
    /// Every modality of the factor (`-1`).
    All,
    /// One modality index. Negative values other than `-1` are kept so that
    /// expansion can report them.
    Index(i64),
    /// Any of the listed modality indices.
    AnyOf(Vec<i64>),
}

impl From<i64> for Slot {
    fn from(value: i64) -> Self {
        if value == -1 {
            Slot::All
        } else {
            Slot::Index(value)
        }
    }
}

impl From<Vec<i64>> for Slot {
    fn from(values: Vec<i64>) -> Self {
        Slot::AnyOf(values)
    }
}

/// Subset of the setting space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Selector {
    /// Full Cartesian product.
    #[default]
    All,
    /// Per-factor slots in declaration order.
    Slots(Vec<Slot>),
    /// Factor name to accepted modality values.
    Named(Vec<(String, Vec<Modality>)>),
    /// Union of sub-selectors.
    Many(Vec<Selector>),
}

fn selector_error(code: &str, message: impl Into<String>) -> ExplanError {
    ExplanError::Selector(ErrorInfo::new(code, message))
}

impl Selector {
    /// Flat selector from integer indices, `-1` meaning "all".
    pub fn indices(values: &[i64]) -> Self {
        Selector::Slots(values.iter().copied().map(Slot::from).collect())
    }

    /// Single named entry.
    pub fn named(factor: impl Into<String>, values: Vec<Modality>) -> Self {
        Selector::Named(vec![(factor.into(), values)])
    }

    /// Parses a selector from a JSON value.
    pub fn from_value(value: &Value) -> Result<Self, ExplanError> {
        match value {
            Value::Null => Ok(Selector::All),
            Value::Number(_) => Ok(Selector::Slots(vec![parse_slot(value)?])),
            Value::String(text) => Selector::parse(text),
            Value::Object(map) => {
                let mut entries = Vec::with_capacity(map.len());
                for (name, raw) in map {
                    entries.push((name.clone(), parse_named_values(name, raw)?));
                }
                Ok(Selector::Named(entries))
            }
            Value::Array(items) if items.is_empty() => Ok(Selector::All),
            Value::Array(items) => {
                let nested = items
                    .iter()
                    .all(|item| matches!(item, Value::Array(_) | Value::Object(_)));
                if nested {
                    let parts = items
                        .iter()
                        .map(Selector::from_value)
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(Selector::Many(parts))
                } else {
                    let slots = items.iter().map(parse_slot).collect::<Result<Vec<_>, _>>()?;
                    Ok(Selector::Slots(slots))
                }
            }
            Value::Bool(_) => Err(selector_error(
                "explan_plan.selector_syntax",
                "booleans are not selectors",
            )),
        }
    }

    /// Parses the textual selector forms.
    ///
    /// Text starting with `[` or `{` is read as JSON. Anything else is the
    /// `name=value+name=value` form, with `,` separating sub-selectors.
    pub fn parse(text: &str) -> Result<Self, ExplanError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Selector::All);
        }
        if text.starts_with('[') || text.starts_with('{') {
            let value: Value = serde_json::from_str(text).map_err(|err| {
                ExplanError::Selector(
                    ErrorInfo::new("explan_plan.selector_json", err.to_string())
                        .with_context("selector", text),
                )
            })?;
            return Selector::from_value(&value);
        }
        let mut parts = Vec::new();
        for part in text.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            parts.push(parse_assignments(part)?);
        }
        match parts.len() {
            1 => Ok(parts.remove(0)),
            _ => Ok(Selector::Many(parts)),
        }
    }

    /// Whether the selector selects the full product without any restriction.
    pub fn is_all(&self) -> bool {
        match self {
            Selector::All => true,
            Selector::Slots(slots) => slots.iter().all(|slot| *slot == Slot::All),
            Selector::Named(entries) => entries.is_empty(),
            Selector::Many(parts) => parts.is_empty(),
        }
    }
}

impl From<Vec<Slot>> for Selector {
    fn from(slots: Vec<Slot>) -> Self {
        Selector::Slots(slots)
    }
}

impl From<Vec<i64>> for Selector {
    fn from(values: Vec<i64>) -> Self {
        Selector::indices(&values)
    }
}

fn parse_slot(value: &Value) -> Result<Slot, ExplanError> {
    match value {
        Value::Number(number) => number.as_i64().map(Slot::from).ok_or_else(|| {
            ExplanError::Selector(
                ErrorInfo::new("explan_plan.selector_syntax", "slot indices must be integers")
                    .with_context("value", number.to_string()),
            )
        }),
        Value::Array(items) => {
            let mut indices = Vec::with_capacity(items.len());
            for item in items {
                let index = item.as_i64().ok_or_else(|| {
                    ExplanError::Selector(
                        ErrorInfo::new(
                            "explan_plan.selector_syntax",
                            "slot lists must contain integers",
                        )
                        .with_context("value", item.to_string()),
                    )
                })?;
                indices.push(index);
            }
            Ok(Slot::AnyOf(indices))
        }
        other => Err(ExplanError::Selector(
            ErrorInfo::new("explan_plan.selector_syntax", "unsupported slot value")
                .with_context("value", other.to_string()),
        )),
    }
}

fn parse_named_values(name: &str, raw: &Value) -> Result<Vec<Modality>, ExplanError> {
    let unsupported = |value: &Value| {
        ExplanError::Selector(
            ErrorInfo::new("explan_plan.selector_syntax", "unsupported modality value")
                .with_context("factor", name)
                .with_context("value", value.to_string()),
        )
    };
    match raw {
        Value::Array(items) => items
            .iter()
            .map(|item| Modality::from_json(item).ok_or_else(|| unsupported(item)))
            .collect(),
        scalar => Modality::from_json(scalar)
            .map(|modality| vec![modality])
            .ok_or_else(|| unsupported(scalar)),
    }
}

fn parse_assignments(text: &str) -> Result<Selector, ExplanError> {
    let mut entries: Vec<(String, Vec<Modality>)> = Vec::new();
    for assignment in text.split('+').map(str::trim) {
        let (name, value) = assignment.split_once('=').ok_or_else(|| {
            ExplanError::Selector(
                ErrorInfo::new("explan_plan.selector_syntax", "expected name=value")
                    .with_context("entry", assignment),
            )
        })?;
        let name = name.trim();
        let value = Modality::Str(value.trim().to_string());
        match entries.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, values)) => values.push(value),
            None => entries.push((name.to_string(), vec![value])),
        }
    }
    Ok(Selector::Named(entries))
}
