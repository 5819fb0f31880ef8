use std::path::PathBuf;

use explan_plan::ident::IdentifierOptions;
use explan_plan::setting::Setting;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::metric::{MetricSource, MetricSpec};
use crate::sink::FileSink;
use crate::store::GroupStore;
use crate::table::{Cell, Table};

/// Where per-setting results were written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataLocation {
    /// One file per `(setting, metric)` in `dir`.
    Files {
        /// Directory holding the artifacts.
        dir: PathBuf,
        /// File extension, without the dot.
        extension: String,
    },
    /// A group store file.
    Store(PathBuf),
}

impl DataLocation {
    /// Flat JSON files in `dir`.
    pub fn files(dir: impl Into<PathBuf>) -> Self {
        DataLocation::Files {
            dir: dir.into(),
            extension: "json".to_string(),
        }
    }

    fn source(&self) -> Option<Box<dyn MetricSource>> {
        match self {
            DataLocation::Files { dir, extension } => Some(Box::new(
                FileSink::new(dir.clone()).with_extension(extension.clone()),
            )),
            DataLocation::Store(path) if !path.is_file() => {
                warn!(path = %path.display(), "group store not found");
                None
            }
            DataLocation::Store(path) => match GroupStore::open_read_only(path) {
                Ok(store) => Some(Box::new(store)),
                Err(err) => {
                    warn!(path = %path.display(), "group store unreadable: {err}");
                    None
                }
            },
        }
    }
}

/// Report produced by [`MetricReducer::reduce`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reduction {
    /// Table with the varying factors and the metric columns.
    pub table: Table,
    /// Factors constant across every row, as `name: value, ...`.
    pub constant_description: String,
}

impl Reduction {
    /// Column labels.
    pub fn header(&self) -> &[String] {
        &self.table.header
    }

    /// Number of leading factor columns.
    pub fn factor_columns(&self) -> usize {
        self.table.factor_columns
    }

    /// Splits into `(rows, header, constant description, factor columns)`.
    pub fn into_parts(self) -> (Vec<Vec<Cell>>, Vec<String>, String, usize) {
        (
            self.table.rows,
            self.table.header,
            self.constant_description,
            self.table.factor_columns,
        )
    }
}

/// Reads per-setting results back and reduces them into a report table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetricReducer {
    metrics: Vec<MetricSpec>,
}

impl MetricReducer {
    /// Reducer over `metrics`, in column order.
    pub fn new(metrics: Vec<MetricSpec>) -> Self {
        Self { metrics }
    }

    /// Configured metrics.
    pub fn metrics(&self) -> &[MetricSpec] {
        &self.metrics
    }

    /// Builds the report for `settings`.
    ///
    /// Data is looked up under `setting.identifier(encoding)`. Missing or
    /// unreadable data never fails the reduction: it yields NaN cells, a
    /// metric without data for any setting gets no columns, and a setting
    /// whose cells are all NaN gets no row. With at least two rows, factor
    /// columns holding a single value are moved to the description.
    pub fn reduce(&self, settings: &[Setting], location: &DataLocation, encoding: &IdentifierOptions) -> Reduction {
        let Some(first) = settings.first() else {
            return Reduction::default();
        };
        let source = location.source();
        let fetched: Vec<Vec<Option<Vec<f64>>>> = settings
            .iter()
            .map(|setting| {
                let identifier = setting.identifier(encoding);
                self.metrics
                    .iter()
                    .map(|metric| {
                        source
                            .as_ref()
                            .and_then(|source| source.fetch(&identifier, &metric.name))
                    })
                    .collect()
            })
            .collect();

        let has_data: Vec<bool> = (0..self.metrics.len())
            .map(|m| fetched.iter().any(|row| row[m].is_some()))
            .collect();
        for (metric, present) in self.metrics.iter().zip(&has_data) {
            if !present {
                debug!(metric = %metric.name, "no data for metric, column omitted");
            }
        }

        let factor_names: Vec<String> = first
            .factors()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut header = factor_names.clone();
        for (metric, _) in self.metrics.iter().zip(&has_data).filter(|(_, present)| **present) {
            header.extend(metric.columns());
        }

        let mut rows: Vec<Vec<Cell>> = Vec::new();
        for (setting, data) in settings.iter().zip(&fetched) {
            let mut values = Vec::new();
            for ((metric, present), entry) in self.metrics.iter().zip(&has_data).zip(data) {
                if !present {
                    continue;
                }
                for directive in &metric.directives {
                    let value = entry
                        .as_deref()
                        .map_or(f64::NAN, |data| directive.reduce(data));
                    values.push(value);
                }
            }
            if values.iter().all(|value| value.is_nan()) {
                continue;
            }
            let mut row: Vec<Cell> = factor_names
                .iter()
                .map(|name| {
                    setting
                        .modality(name)
                        .cloned()
                        .map_or(Cell::Metric(f64::NAN), Cell::Factor)
                })
                .collect();
            row.extend(values.into_iter().map(Cell::Metric));
            rows.push(row);
        }

        let mut table = Table {
            header,
            rows,
            factor_columns: factor_names.len(),
        };
        let constant_description = prune_constant_columns(&mut table);
        info!(
            settings = settings.len(),
            rows = table.len(),
            columns = table.header.len(),
            "reduced metrics"
        );
        Reduction {
            table,
            constant_description,
        }
    }

    /// Raw data of `metric` for each setting that has some, NaN values removed.
    pub fn get(
        &self,
        settings: &[Setting],
        location: &DataLocation,
        encoding: &IdentifierOptions,
        metric: &str,
    ) -> Vec<(String, Vec<f64>)> {
        let Some(source) = location.source() else {
            return Vec::new();
        };
        settings
            .iter()
            .filter_map(|setting| {
                let identifier = setting.identifier(encoding);
                let data: Vec<f64> = source
                    .fetch(&identifier, metric)?
                    .into_iter()
                    .filter(|value| !value.is_nan())
                    .collect();
                if data.is_empty() {
                    None
                } else {
                    Some((identifier, data))
                }
            })
            .collect()
    }
}

fn prune_constant_columns(table: &mut Table) -> String {
    if table.rows.len() < 2 {
        return String::new();
    }
    let constant: Vec<usize> = (0..table.factor_columns)
        .filter(|&column| {
            let first = &table.rows[0][column];
            table.rows.iter().all(|row| row[column] == *first)
        })
        .collect();
    let description = constant
        .iter()
        .map(|&column| format!("{}: {}", table.header[column], table.rows[0][column]))
        .collect::<Vec<_>>()
        .join(", ");
    for &column in constant.iter().rev() {
        table.header.remove(column);
        for row in &mut table.rows {
            row.remove(column);
        }
    }
    table.factor_columns -= constant.len();
    description
}
