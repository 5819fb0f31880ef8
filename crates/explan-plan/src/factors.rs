use explan_core::errors::{ErrorInfo, ExplanError};
use explan_core::modality::{Modality, ModalityKind};
use serde::{Deserialize, Serialize};

/// Names that collide with plan configuration keys.
pub const RESERVED_NAMES: &[&str] = &["factors", "selector", "defaults", "metrics"];

/// Characters reserved by the textual selector syntax.
const DELIMITERS: &[char] = &['=', '+', ','];

fn config_error(code: &str, message: impl Into<String>, factor: &str) -> ExplanError {
    ExplanError::Config(ErrorInfo::new(code, message).with_context("factor", factor))
}

/// Named independent variable with its ordered modalities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    name: String,
    kind: ModalityKind,
    modalities: Vec<Modality>,
    default: Option<usize>,
}

impl Factor {
    /// Name of the factor.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind shared by every modality.
    pub fn kind(&self) -> ModalityKind {
        self.kind
    }

    /// Ordered modalities.
    pub fn modalities(&self) -> &[Modality] {
        &self.modalities
    }

    /// Number of modalities.
    pub fn len(&self) -> usize {
        self.modalities.len()
    }

    /// Factors always carry at least one modality.
    pub fn is_empty(&self) -> bool {
        self.modalities.is_empty()
    }

    /// Whether the factor has exactly one modality.
    pub fn is_singleton(&self) -> bool {
        self.modalities.len() == 1
    }

    /// Modality at `index`.
    pub fn modality(&self, index: usize) -> Option<&Modality> {
        self.modalities.get(index)
    }

    /// Index of the declared default modality.
    pub fn default_index(&self) -> Option<usize> {
        self.default
    }

    /// Declared default modality.
    pub fn default_modality(&self) -> Option<&Modality> {
        self.default.and_then(|index| self.modalities.get(index))
    }

    /// Position of `value`, converting it to the factor kind first.
    ///
    /// Strings are parsed for numeric factors so that textual selectors can
    /// address `lr=0.1`.
    pub fn position_of(&self, value: &Modality) -> Option<usize> {
        let candidate = match (value, self.kind) {
            (Modality::Str(text), kind) if kind != ModalityKind::Str => {
                Modality::parse_as(kind, text)?
            }
            (value, kind) => value.coerce(kind)?,
        };
        self.modalities.iter().position(|m| *m == candidate)
    }
}

/// Ordered collection of factors and their default modalities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModalityStore {
    factors: Vec<Factor>,
}

/// Factor lookup key: by name or by declaration position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorRef<'a> {
    /// Lookup by factor name.
    Name(&'a str),
    /// Lookup by declaration position.
    Position(usize),
}

impl<'a> From<&'a str> for FactorRef<'a> {
    fn from(value: &'a str) -> Self {
        FactorRef::Name(value)
    }
}

impl From<usize> for FactorRef<'_> {
    fn from(value: usize) -> Self {
        FactorRef::Position(value)
    }
}

impl ModalityStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares (or redeclares) a factor.
    ///
    /// Redeclaring keeps the factor's position and drops a default that is no
    /// longer among the modalities.
    pub fn set_factor(
        &mut self,
        name: impl Into<String>,
        modalities: Vec<Modality>,
    ) -> Result<(), ExplanError> {
        let name = name.into();
        validate_name(&name)?;
        let kind = validate_modalities(&name, &modalities)?;
        match self.factors.iter_mut().find(|factor| factor.name == name) {
            Some(existing) => {
                let previous_default = existing.default_modality().cloned();
                existing.kind = kind;
                existing.modalities = modalities;
                existing.default =
                    previous_default.and_then(|d| existing.modalities.iter().position(|m| *m == d));
            }
            None => self.factors.push(Factor {
                name,
                kind,
                modalities,
                default: None,
            }),
        }
        Ok(())
    }

    /// Declares the default modality of an existing factor.
    pub fn set_default(&mut self, name: &str, modality: impl Into<Modality>) -> Result<(), ExplanError> {
        let modality = modality.into();
        let factor = self
            .factors
            .iter_mut()
            .find(|factor| factor.name == name)
            .ok_or_else(|| config_error("explan_plan.unknown_factor", "unknown factor", name))?;
        let index = factor.position_of(&modality).ok_or_else(|| {
            ExplanError::Config(
                ErrorInfo::new(
                    "explan_plan.unknown_default",
                    "default modality is not among the factor modalities",
                )
                .with_context("factor", name)
                .with_context("modality", modality.to_string()),
            )
        })?;
        factor.default = Some(index);
        Ok(())
    }

    /// Removes the default modality of a factor, if any.
    pub fn clear_default(&mut self, name: &str) -> Result<(), ExplanError> {
        let factor = self
            .factors
            .iter_mut()
            .find(|factor| factor.name == name)
            .ok_or_else(|| config_error("explan_plan.unknown_factor", "unknown factor", name))?;
        factor.default = None;
        Ok(())
    }

    /// Number of modalities of the referenced factor.
    pub fn count_modalities<'a>(&self, key: impl Into<FactorRef<'a>>) -> Result<usize, ExplanError> {
        let key = key.into();
        let factor = match key {
            FactorRef::Name(name) => self.factor(name),
            FactorRef::Position(index) => self.factor_at(index),
        };
        factor.map(Factor::len).ok_or_else(|| {
            let label = match key {
                FactorRef::Name(name) => name.to_string(),
                FactorRef::Position(index) => format!("#{index}"),
            };
            config_error("explan_plan.unknown_factor", "unknown factor", &label)
        })
    }

    /// Factor named `name`.
    pub fn factor(&self, name: &str) -> Option<&Factor> {
        self.factors.iter().find(|factor| factor.name == name)
    }

    /// Factor at declaration position `index`.
    pub fn factor_at(&self, index: usize) -> Option<&Factor> {
        self.factors.get(index)
    }

    /// Declaration position of `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.factors.iter().position(|factor| factor.name == name)
    }

    /// Number of factors.
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    /// Whether no factor has been declared.
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Factors in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Factor> {
        self.factors.iter()
    }

    /// Factor names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.factors.iter().map(|factor| factor.name.as_str()).collect()
    }

    /// Size of the full Cartesian product.
    pub fn combinations(&self) -> usize {
        if self.factors.is_empty() {
            return 0;
        }
        self.factors.iter().map(Factor::len).product()
    }
}

fn validate_name(name: &str) -> Result<(), ExplanError> {
    if name.trim().is_empty() {
        return Err(config_error(
            "explan_plan.empty_name",
            "factor names must not be empty",
            name,
        ));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(ExplanError::Config(
            ErrorInfo::new("explan_plan.reserved_name", "factor name is reserved")
                .with_context("factor", name)
                .with_hint(format!("reserved names: {}", RESERVED_NAMES.join(", "))),
        ));
    }
    if name.contains(DELIMITERS) {
        return Err(ExplanError::Config(
            ErrorInfo::new(
                "explan_plan.delimiter_in_name",
                "factor name contains a selector delimiter",
            )
            .with_context("factor", name)
            .with_hint("avoid '=', '+' and ','"),
        ));
    }
    Ok(())
}

fn validate_modalities(name: &str, modalities: &[Modality]) -> Result<ModalityKind, ExplanError> {
    let first = modalities.first().ok_or_else(|| {
        config_error(
            "explan_plan.no_modalities",
            "a factor needs at least one modality",
            name,
        )
    })?;
    let kind = first.kind();
    for (index, modality) in modalities.iter().enumerate() {
        if modality.kind() != kind {
            return Err(ExplanError::Config(
                ErrorInfo::new("explan_plan.mixed_kinds", "modalities of a factor must share a kind")
                    .with_context("factor", name)
                    .with_context("expected", kind.to_string())
                    .with_context("found", modality.kind().to_string())
                    .with_context("index", index.to_string()),
            ));
        }
        if matches!(modality, Modality::Float(value) if value.is_nan()) {
            return Err(config_error(
                "explan_plan.nan_modality",
                "NaN cannot be used as a modality",
                name,
            ));
        }
        if modalities[..index].contains(modality) {
            return Err(ExplanError::Config(
                ErrorInfo::new("explan_plan.duplicate_modality", "modalities must be distinct")
                    .with_context("factor", name)
                    .with_context("modality", modality.to_string()),
            ));
        }
    }
    Ok(kind)
}
