use std::fs;
use std::path::{Path, PathBuf};

use explan_core::errors::{ErrorInfo, ExplanError};
use explan_core::serde::{from_json_slice, to_canonical_json_bytes};
use serde_json::Value;
use tracing::warn;

use crate::metric::MetricSource;

fn io_error(code: &str, path: &Path, err: impl ToString) -> ExplanError {
    ExplanError::Data(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
    )
}

/// One JSON file per `(setting, metric)`: `<identifier>_<metric>.<extension>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSink {
    dir: PathBuf,
    extension: String,
}

impl FileSink {
    /// Sink rooted at `dir` using the `json` extension.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extension: "json".to_string(),
        }
    }

    /// Uses another file extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Directory holding the artifacts.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File extension, without the dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// File name of an artifact.
    pub fn file_name(&self, identifier: &str, metric: &str) -> String {
        format!("{identifier}_{metric}.{}", self.extension)
    }

    /// Path of an artifact.
    pub fn path(&self, identifier: &str, metric: &str) -> PathBuf {
        self.dir.join(self.file_name(identifier, metric))
    }

    /// Writes `data` as canonical JSON; NaN becomes `null`.
    pub fn write(&self, identifier: &str, metric: &str, data: &[f64]) -> Result<PathBuf, ExplanError> {
        fs::create_dir_all(&self.dir)
            .map_err(|err| io_error("explan_data.sink_dir", &self.dir, err))?;
        let path = self.path(identifier, metric);
        let bytes = to_canonical_json_bytes(&data)?;
        fs::write(&path, bytes).map_err(|err| io_error("explan_data.sink_write", &path, err))?;
        Ok(path)
    }

    /// Writes an arbitrary JSON payload.
    pub fn write_value(&self, identifier: &str, metric: &str, value: &Value) -> Result<PathBuf, ExplanError> {
        fs::create_dir_all(&self.dir)
            .map_err(|err| io_error("explan_data.sink_dir", &self.dir, err))?;
        let path = self.path(identifier, metric);
        let bytes = to_canonical_json_bytes(value)?;
        fs::write(&path, bytes).map_err(|err| io_error("explan_data.sink_write", &path, err))?;
        Ok(path)
    }

    /// Reads an artifact back as a flat vector.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn read(&self, identifier: &str, metric: &str) -> Result<Option<Vec<f64>>, ExplanError> {
        let path = self.path(identifier, metric);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|err| io_error("explan_data.sink_read", &path, err))?;
        let value: Value = from_json_slice(&bytes)
            .map_err(|err| io_error("explan_data.sink_decode", &path, &err.info().message))?;
        let mut flat = Vec::new();
        flatten(&value, &mut flat).map_err(|kind| {
            ExplanError::Data(
                ErrorInfo::new("explan_data.sink_payload", "payload is not numeric")
                    .with_context("path", path.display().to_string())
                    .with_context("found", kind),
            )
        })?;
        Ok(Some(flat))
    }
}

/// Flattens numbers and nested arrays; `null` reads as NaN.
pub(crate) fn flatten(value: &Value, out: &mut Vec<f64>) -> Result<(), &'static str> {
    match value {
        Value::Number(number) => {
            out.push(number.as_f64().unwrap_or(f64::NAN));
            Ok(())
        }
        Value::Null => {
            out.push(f64::NAN);
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(|item| flatten(item, out)),
        Value::Bool(_) => Err("bool"),
        Value::String(_) => Err("string"),
        Value::Object(_) => Err("object"),
    }
}

impl MetricSource for FileSink {
    fn fetch(&self, identifier: &str, metric: &str) -> Option<Vec<f64>> {
        match self.read(identifier, metric) {
            Ok(data) => data.filter(|values| !values.is_empty()),
            Err(err) => {
                warn!(identifier, metric, "unreadable metric data: {err}");
                None
            }
        }
    }
}
