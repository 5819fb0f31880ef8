#![deny(missing_docs)]
#![doc = "Result sinks, reduction directives and report tables for explan plans."]

/// Artifact enumeration for archival and cleanup.
pub mod archive;
/// Reduction directives and aggregations.
pub mod directive;
/// Metric specifications and data sources.
pub mod metric;
/// Metric reduction into report tables.
pub mod reducer;
/// Flat-file result sink.
pub mod sink;
/// SQLite-backed grouped array store.
pub mod store;
/// Report tables and CSV export.
pub mod table;

pub use archive::ArtifactSelector;
pub use directive::{reduce_metric, Aggregation, Directive, Op, Prune};
pub use metric::{MetricSource, MetricSpec};
pub use reducer::{DataLocation, MetricReducer, Reduction};
pub use sink::FileSink;
pub use store::{Dimension, GroupStore};
pub use table::{Cell, Table};
