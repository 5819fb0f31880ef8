use std::fmt::{self, Display};

use explan_plan::config::DirectiveText;
use serde::{Deserialize, Serialize};

/// Named reductions of a data vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Arithmetic mean.
    Mean,
    /// Population standard deviation.
    Std,
    /// Population variance.
    Var,
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
    /// Sum of the values.
    Sum,
    /// Median (mean of the two central values for even lengths).
    Median,
    /// Position of the smallest value.
    Argmin,
    /// Position of the largest value.
    Argmax,
}

impl Aggregation {
    /// Looks an aggregation up by name.
    pub fn from_name(name: &str) -> Option<Self> {
        let aggregation = match name {
            "mean" | "avg" => Aggregation::Mean,
            "std" => Aggregation::Std,
            "var" => Aggregation::Var,
            "min" => Aggregation::Min,
            "max" => Aggregation::Max,
            "sum" => Aggregation::Sum,
            "median" => Aggregation::Median,
            "argmin" => Aggregation::Argmin,
            "argmax" => Aggregation::Argmax,
            _ => return None,
        };
        Some(aggregation)
    }

    /// Applies the aggregation; empty input yields NaN.
    pub fn apply(self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        let n = values.len() as f64;
        match self {
            Aggregation::Mean => values.iter().sum::<f64>() / n,
            Aggregation::Sum => values.iter().sum(),
            Aggregation::Var => variance(values),
            Aggregation::Std => variance(values).sqrt(),
            Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
            Aggregation::Argmin => arg_best(values, |candidate, best| candidate < best),
            Aggregation::Argmax => arg_best(values, |candidate, best| candidate > best),
        }
    }
}

fn variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}

fn arg_best(values: &[f64], better: impl Fn(f64, f64) -> bool) -> f64 {
    let mut best: Option<(usize, f64)> = None;
    for (index, &value) in values.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if !better(value, current) => {}
            _ => best = Some((index, value)),
        }
    }
    best.map_or(f64::NAN, |(index, _)| index as f64)
}

/// Index-parity slice applied before reducing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Prune {
    /// `-0`: drop the first element.
    DropFirst,
    /// `-1`: keep even positions.
    Even,
    /// `-2`: keep odd positions.
    Odd,
}

impl Prune {
    fn suffix(self) -> &'static str {
        match self {
            Prune::DropFirst => "-0",
            Prune::Even => "-1",
            Prune::Odd => "-2",
        }
    }

    /// Slices `values`.
    pub fn apply(self, values: &[f64]) -> Vec<f64> {
        match self {
            Prune::DropFirst => values.iter().skip(1).copied().collect(),
            Prune::Even => values.iter().step_by(2).copied().collect(),
            Prune::Odd => values.iter().skip(1).step_by(2).copied().collect(),
        }
    }
}

/// What a directive computes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Op {
    /// Element at a 0-based position.
    Position(usize),
    /// Named aggregation.
    Aggregate(Aggregation),
    /// Unrecognised name; always reduces to NaN.
    Unknown(String),
}

/// Reduction directive: an operation with optional pruning and percent scaling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    /// Operation applied to the (pruned) data.
    pub op: Op,
    /// Slice applied first.
    pub prune: Option<Prune>,
    /// Multiply the result by 100.
    pub percent: bool,
}

impl Directive {
    /// Parses `name[-0|-1|-2][%]`, or a bare non-negative position.
    ///
    /// Unknown names are kept as [`Op::Unknown`] rather than rejected so that
    /// the report shows a NaN column instead of failing.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let (body, percent) = match text.strip_suffix('%') {
            Some(body) => (body, true),
            None => (text, false),
        };
        let mut prune = None;
        let mut name = body;
        for candidate in [Prune::DropFirst, Prune::Even, Prune::Odd] {
            if let Some(stripped) = body.strip_suffix(candidate.suffix()) {
                if !stripped.is_empty() {
                    prune = Some(candidate);
                    name = stripped;
                    break;
                }
            }
        }
        let op = match name.parse::<usize>() {
            Ok(position) if prune.is_none() => Op::Position(position),
            _ => match Aggregation::from_name(name) {
                Some(aggregation) => Op::Aggregate(aggregation),
                None => Op::Unknown(body.to_string()),
            },
        };
        Directive { op, prune, percent }
    }

    /// Directive for a configured entry.
    pub fn from_text(text: &DirectiveText) -> Self {
        match text {
            DirectiveText::Index(index) => match usize::try_from(*index) {
                Ok(position) => Directive::position(position),
                Err(_) => Directive {
                    op: Op::Unknown(index.to_string()),
                    prune: None,
                    percent: false,
                },
            },
            DirectiveText::Text(text) => Directive::parse(text),
        }
    }

    /// Positional directive.
    pub fn position(position: usize) -> Self {
        Directive {
            op: Op::Position(position),
            prune: None,
            percent: false,
        }
    }

    /// Aggregation directive.
    pub fn aggregate(aggregation: Aggregation) -> Self {
        Directive {
            op: Op::Aggregate(aggregation),
            prune: None,
            percent: false,
        }
    }

    /// Reduces `data` to one value. Never fails: unavailable results are NaN.
    pub fn reduce(&self, data: &[f64]) -> f64 {
        let pruned;
        let values = match self.prune {
            Some(prune) => {
                pruned = prune.apply(data);
                pruned.as_slice()
            }
            None => data,
        };
        let value = match &self.op {
            Op::Position(_) if values.len() == 1 => values[0],
            Op::Position(position) => values.get(*position).copied().unwrap_or(f64::NAN),
            Op::Aggregate(aggregation) => aggregation.apply(values),
            Op::Unknown(_) => f64::NAN,
        };
        if self.percent {
            value * 100.0
        } else {
            value
        }
    }
}

impl Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            Op::Position(position) => write!(f, "{position}")?,
            Op::Aggregate(aggregation) => {
                let name = match aggregation {
                    Aggregation::Mean => "mean",
                    Aggregation::Std => "std",
                    Aggregation::Var => "var",
                    Aggregation::Min => "min",
                    Aggregation::Max => "max",
                    Aggregation::Sum => "sum",
                    Aggregation::Median => "median",
                    Aggregation::Argmin => "argmin",
                    Aggregation::Argmax => "argmax",
                };
                f.write_str(name)?
            }
            Op::Unknown(name) => {
                // the raw text already carries its pruning suffix
                f.write_str(name)?;
                return if self.percent { f.write_str("%") } else { Ok(()) };
            }
        }
        if let Some(prune) = self.prune {
            f.write_str(prune.suffix())?;
        }
        if self.percent {
            f.write_str("%")?;
        }
        Ok(())
    }
}

/// Reduces `data` with `directive`.
pub fn reduce_metric(data: &[f64], directive: &Directive) -> f64 {
    directive.reduce(data)
}
