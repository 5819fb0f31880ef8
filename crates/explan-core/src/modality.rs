//! Typed factor values.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind shared by every modality of a factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModalityKind {
    /// Signed integers.
    Int,
    /// Double precision floating point numbers.
    Float,
    /// Free-form strings.
    Str,
}

impl Display for ModalityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ModalityKind::Int => "int",
            ModalityKind::Float => "float",
            ModalityKind::Str => "str",
        };
        f.write_str(label)
    }
}

/// One concrete value a factor can take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Modality {
    /// Integer modality.
    Int(i64),
    /// Floating point modality.
    Float(f64),
    /// String modality.
    Str(String),
}

impl Modality {
    /// Returns the kind of the modality.
    pub fn kind(&self) -> ModalityKind {
        match self {
            Modality::Int(_) => ModalityKind::Int,
            Modality::Float(_) => ModalityKind::Float,
            Modality::Str(_) => ModalityKind::Str,
        }
    }

    /// Value injected for a factor missing from a merged plan.
    pub fn placeholder(kind: ModalityKind) -> Self {
        match kind {
            ModalityKind::Int => Modality::Int(0),
            ModalityKind::Float => Modality::Float(0.0),
            ModalityKind::Str => Modality::Str("none".to_string()),
        }
    }

    /// Builds integer modalities.
    pub fn ints(values: impl IntoIterator<Item = i64>) -> Vec<Modality> {
        values.into_iter().map(Modality::Int).collect()
    }

    /// Builds floating point modalities.
    pub fn floats(values: impl IntoIterator<Item = f64>) -> Vec<Modality> {
        values.into_iter().map(Modality::Float).collect()
    }

    /// Builds string modalities.
    pub fn strs<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Vec<Modality> {
        values
            .into_iter()
            .map(|value| Modality::Str(value.into()))
            .collect()
    }

    /// Parses `text` as a modality of the requested kind.
    pub fn parse_as(kind: ModalityKind, text: &str) -> Option<Modality> {
        let text = text.trim();
        match kind {
            ModalityKind::Int => text.parse().ok().map(Modality::Int),
            ModalityKind::Float => text.parse().ok().map(Modality::Float),
            ModalityKind::Str => Some(Modality::Str(text.to_string())),
        }
    }

    /// Converts a JSON scalar into a modality, if it is one.
    pub fn from_json(value: &Value) -> Option<Modality> {
        match value {
            Value::Number(number) => number
                .as_i64()
                .map(Modality::Int)
                .or_else(|| number.as_f64().map(Modality::Float)),
            Value::String(text) => Some(Modality::Str(text.clone())),
            _ => None,
        }
    }

    /// Converts the modality into `kind` when the conversion is lossless.
    ///
    /// Integers widen to floats and floats with no fractional part narrow to
    /// integers; strings never convert.
    pub fn coerce(&self, kind: ModalityKind) -> Option<Modality> {
        match (self, kind) {
            (value, target) if value.kind() == target => Some(value.clone()),
            (Modality::Int(value), ModalityKind::Float) => Some(Modality::Float(*value as f64)),
            (Modality::Float(value), ModalityKind::Int)
                if value.fract() == 0.0 && value.is_finite() =>
            {
                Some(Modality::Int(*value as i64))
            }
            _ => None,
        }
    }

    /// Returns the numeric value of the modality, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Modality::Int(value) => Some(*value as f64),
            Modality::Float(value) => Some(*value),
            Modality::Str(_) => None,
        }
    }
}

impl Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Int(value) => write!(f, "{value}"),
            // Debug keeps the trailing `.0` so 1.0 and 1 stay distinct keys.
            Modality::Float(value) => write!(f, "{value:?}"),
            Modality::Str(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Modality {
    fn from(value: i64) -> Self {
        Modality::Int(value)
    }
}

impl From<i32> for Modality {
    fn from(value: i32) -> Self {
        Modality::Int(value as i64)
    }
}

impl From<f64> for Modality {
    fn from(value: f64) -> Self {
        Modality::Float(value)
    }
}

impl From<&str> for Modality {
    fn from(value: &str) -> Self {
        Modality::Str(value.to_string())
    }
}

impl From<String> for Modality {
    fn from(value: String) -> Self {
        Modality::Str(value)
    }
}
