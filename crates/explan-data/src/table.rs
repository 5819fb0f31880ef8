use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use csv::WriterBuilder;
use explan_core::errors::{ErrorInfo, ExplanError};
use explan_core::modality::Modality;
use serde::{Deserialize, Serialize};

/// One report cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cell {
    /// Modality of a factor column.
    Factor(Modality),
    /// Reduced metric value; NaN when unavailable.
    Metric(f64),
}

impl Cell {
    /// Metric value, if the cell holds one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Metric(value) => Some(*value),
            Cell::Factor(modality) => modality.as_f64(),
        }
    }

    fn compare(&self, other: &Cell) -> Ordering {
        match (self, other) {
            (Cell::Factor(Modality::Str(a)), Cell::Factor(Modality::Str(b))) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) if a.is_nan() && b.is_nan() => Ordering::Equal,
                (Some(a), Some(_)) if a.is_nan() => Ordering::Greater,
                (Some(_), Some(b)) if b.is_nan() => Ordering::Less,
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.to_string().cmp(&other.to_string()),
            },
        }
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Factor(modality) => write!(f, "{modality}"),
            Cell::Metric(value) => write!(f, "{value}"),
        }
    }
}

/// Report table: factor columns first, then one column per metric directive.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    /// Column labels.
    pub header: Vec<String>,
    /// Rows, each as long as the header.
    pub rows: Vec<Vec<Cell>>,
    /// Number of leading factor columns.
    pub factor_columns: usize,
}

impl Table {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column.
    pub fn column(&self, label: &str) -> Option<usize> {
        self.header.iter().position(|candidate| candidate == label)
    }

    /// Cell at `row` in column `label`.
    pub fn cell(&self, row: usize, label: &str) -> Option<&Cell> {
        let column = self.column(label)?;
        self.rows.get(row)?.get(column)
    }

    /// Stable sort on one column. NaN sorts last in ascending order.
    pub fn sort_by_column(&mut self, label: &str, descending: bool) -> Result<(), ExplanError> {
        let column = self.column(label).ok_or_else(|| {
            ExplanError::Data(
                ErrorInfo::new("explan_data.unknown_column", "unknown column")
                    .with_context("column", label),
            )
        })?;
        self.rows.sort_by(|a, b| {
            let ordering = a[column].compare(&b[column]);
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
        Ok(())
    }

    /// Writes the table as CSV with a header row.
    pub fn write_csv(&self, path: &Path) -> Result<(), ExplanError> {
        let csv_error = |code: &str, err: &dyn ToString| {
            ExplanError::Data(
                ErrorInfo::new(code, "failed to write report table")
                    .with_context("path", path.display().to_string())
                    .with_hint(err.to_string()),
            )
        };
        let file = File::create(path).map_err(|err| csv_error("explan_data.csv_open", &err))?;
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(file));
        writer
            .write_record(&self.header)
            .map_err(|err| csv_error("explan_data.csv_header", &err))?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(Cell::to_string))
                .map_err(|err| csv_error("explan_data.csv_row", &err))?;
        }
        writer
            .flush()
            .map_err(|err| csv_error("explan_data.csv_flush", &err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table {
            header: vec!["optim".to_string(), "mae_mean".to_string()],
            rows: vec![
                vec![Cell::Factor(Modality::from("sgd")), Cell::Metric(0.3)],
                vec![Cell::Factor(Modality::from("adam")), Cell::Metric(f64::NAN)],
                vec![Cell::Factor(Modality::from("rms")), Cell::Metric(0.1)],
            ],
            factor_columns: 1,
        }
    }

    #[test]
    fn sorting_puts_nan_last() {
        let mut table = table();
        table.sort_by_column("mae_mean", false).unwrap();
        assert_eq!(table.cell(0, "optim"), Some(&Cell::Factor(Modality::from("rms"))));
        assert_eq!(table.cell(2, "optim"), Some(&Cell::Factor(Modality::from("adam"))));
        table.sort_by_column("optim", true).unwrap();
        assert_eq!(table.cell(0, "optim"), Some(&Cell::Factor(Modality::from("sgd"))));
        assert!(table.sort_by_column("missing", false).is_err());
    }

    #[test]
    fn csv_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        table().write_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "optim,mae_mean\nsgd,0.3\nadam,NaN\nrms,0.1\n");
    }
}
