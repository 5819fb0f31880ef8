use std::path::{Path, PathBuf};

use explan_core::errors::{ErrorInfo, ExplanError};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::metric::MetricSource;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS arrays (
    grp TEXT NOT NULL,
    name TEXT NOT NULL,
    capacity INTEGER,
    PRIMARY KEY (grp, name)
);
CREATE TABLE IF NOT EXISTS array_values (
    grp TEXT NOT NULL,
    name TEXT NOT NULL,
    pos INTEGER NOT NULL,
    value REAL,
    PRIMARY KEY (grp, name, pos)
);
"#;

fn sqlite_error(code: &str, message: &str, err: rusqlite::Error) -> ExplanError {
    ExplanError::Data(ErrorInfo::new(code, message).with_hint(err.to_string()))
}

fn array_error(code: &str, message: &str, group: &str, name: &str) -> ExplanError {
    ExplanError::Data(
        ErrorInfo::new(code, message)
            .with_context("group", group)
            .with_context("array", name),
    )
}

/// Shape of a stored array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dimension {
    /// Pre-sized and zero-filled; values are set in place.
    Fixed(usize),
    /// Starts empty and grows by appending.
    Growable,
}

/// Grouped structured store: one group per setting identifier holding one
/// numeric array per metric, kept in a single SQLite file.
///
/// NaN values are stored as SQL `NULL`.
#[derive(Debug)]
pub struct GroupStore {
    path: PathBuf,
    conn: Connection,
}

impl GroupStore {
    /// Opens (or creates) the store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExplanError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                ExplanError::Data(
                    ErrorInfo::new("explan_data.store_dir", err.to_string())
                        .with_context("path", parent.display().to_string()),
                )
            })?;
        }
        let conn = Connection::open(&path)
            .map_err(|err| sqlite_error("explan_data.store_open", "failed to open group store", err))?;
        conn.execute_batch(SCHEMA)
            .map_err(|err| sqlite_error("explan_data.store_schema", "failed to ensure store schema", err))?;
        Ok(Self { path, conn })
    }

    /// Opens an existing store without creating or migrating it.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, ExplanError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|err| sqlite_error("explan_data.store_open", "failed to open group store", err))?;
        Ok(Self { path, conn })
    }

    /// Location of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn capacity(&self, group: &str, name: &str) -> Result<Option<Option<usize>>, ExplanError> {
        self.conn
            .query_row(
                "SELECT capacity FROM arrays WHERE grp = ?1 AND name = ?2",
                params![group, name],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()
            .map(|found| found.map(|capacity| capacity.map(|c| c as usize)))
            .map_err(|err| sqlite_error("explan_data.store_query", "failed to look up array", err))
    }

    fn len(&self, group: &str, name: &str) -> Result<usize, ExplanError> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM array_values WHERE grp = ?1 AND name = ?2",
                params![group, name],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count as usize)
            .map_err(|err| sqlite_error("explan_data.store_query", "failed to count values", err))
    }

    /// Creates an array; fixed arrays are zero-filled.
    pub fn create_array(&mut self, group: &str, name: &str, dimension: Dimension) -> Result<(), ExplanError> {
        if self.capacity(group, name)?.is_some() {
            return Err(array_error(
                "explan_data.array_exists",
                "array already exists",
                group,
                name,
            ));
        }
        let capacity = match dimension {
            Dimension::Fixed(size) => Some(size as i64),
            Dimension::Growable => None,
        };
        let tx = self
            .conn
            .transaction()
            .map_err(|err| sqlite_error("explan_data.store_transaction", "failed to start transaction", err))?;
        tx.execute(
            "INSERT INTO arrays (grp, name, capacity) VALUES (?1, ?2, ?3)",
            params![group, name, capacity],
        )
        .map_err(|err| sqlite_error("explan_data.store_insert", "failed to create array", err))?;
        if let Dimension::Fixed(size) = dimension {
            for pos in 0..size {
                tx.execute(
                    "INSERT INTO array_values (grp, name, pos, value) VALUES (?1, ?2, ?3, 0.0)",
                    params![group, name, pos as i64],
                )
                .map_err(|err| sqlite_error("explan_data.store_insert", "failed to fill array", err))?;
            }
        }
        tx.commit()
            .map_err(|err| sqlite_error("explan_data.store_commit", "failed to commit array", err))
    }

    /// Replaces the contents of an array, creating a growable one if missing.
    ///
    /// Fixed arrays accept at most their capacity; remaining slots are zeroed.
    pub fn write(&mut self, group: &str, name: &str, data: &[f64]) -> Result<(), ExplanError> {
        let capacity = match self.capacity(group, name)? {
            Some(capacity) => capacity,
            None => {
                self.create_array(group, name, Dimension::Growable)?;
                None
            }
        };
        if let Some(capacity) = capacity {
            if data.len() > capacity {
                return Err(array_error(
                    "explan_data.array_capacity",
                    "data exceeds the array capacity",
                    group,
                    name,
                ));
            }
        }
        let tx = self
            .conn
            .transaction()
            .map_err(|err| sqlite_error("explan_data.store_transaction", "failed to start transaction", err))?;
        tx.execute(
            "DELETE FROM array_values WHERE grp = ?1 AND name = ?2",
            params![group, name],
        )
        .map_err(|err| sqlite_error("explan_data.store_delete", "failed to clear array", err))?;
        let total = capacity.unwrap_or(data.len());
        for pos in 0..total {
            let value = data.get(pos).copied().unwrap_or(0.0);
            tx.execute(
                "INSERT INTO array_values (grp, name, pos, value) VALUES (?1, ?2, ?3, ?4)",
                params![group, name, pos as i64, stored(value)],
            )
            .map_err(|err| sqlite_error("explan_data.store_insert", "failed to write value", err))?;
        }
        tx.commit()
            .map_err(|err| sqlite_error("explan_data.store_commit", "failed to commit array", err))
    }

    /// Sets one element in place.
    pub fn set(&mut self, group: &str, name: &str, position: usize, value: f64) -> Result<(), ExplanError> {
        if self.capacity(group, name)?.is_none() {
            return Err(array_error("explan_data.unknown_array", "unknown array", group, name));
        }
        if position >= self.len(group, name)? {
            return Err(ExplanError::Data(
                ErrorInfo::new("explan_data.array_range", "position out of range")
                    .with_context("group", group)
                    .with_context("array", name)
                    .with_context("position", position.to_string()),
            ));
        }
        self.conn
            .execute(
                "UPDATE array_values SET value = ?4 WHERE grp = ?1 AND name = ?2 AND pos = ?3",
                params![group, name, position as i64, stored(value)],
            )
            .map_err(|err| sqlite_error("explan_data.store_update", "failed to set value", err))?;
        Ok(())
    }

    /// Appends to a growable array, creating it if missing.
    pub fn append(&mut self, group: &str, name: &str, value: f64) -> Result<(), ExplanError> {
        match self.capacity(group, name)? {
            None => self.create_array(group, name, Dimension::Growable)?,
            Some(Some(_)) => {
                return Err(array_error(
                    "explan_data.array_fixed",
                    "cannot append to a fixed-size array",
                    group,
                    name,
                ))
            }
            Some(None) => {}
        }
        let pos = self.len(group, name)?;
        self.conn
            .execute(
                "INSERT INTO array_values (grp, name, pos, value) VALUES (?1, ?2, ?3, ?4)",
                params![group, name, pos as i64, stored(value)],
            )
            .map_err(|err| sqlite_error("explan_data.store_insert", "failed to append value", err))?;
        Ok(())
    }

    /// Reads an array; `Ok(None)` when it does not exist.
    pub fn read(&self, group: &str, name: &str) -> Result<Option<Vec<f64>>, ExplanError> {
        if self.capacity(group, name)?.is_none() {
            return Ok(None);
        }
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM array_values WHERE grp = ?1 AND name = ?2 ORDER BY pos")
            .map_err(|err| sqlite_error("explan_data.store_query", "failed to prepare read", err))?;
        let rows = stmt
            .query_map(params![group, name], |row| row.get::<_, Option<f64>>(0))
            .map_err(|err| sqlite_error("explan_data.store_query", "failed to read array", err))?;
        let mut values = Vec::new();
        for row in rows {
            let value =
                row.map_err(|err| sqlite_error("explan_data.store_query", "failed to read value", err))?;
            values.push(value.unwrap_or(f64::NAN));
        }
        Ok(Some(values))
    }

    /// Group names, sorted.
    pub fn groups(&self) -> Result<Vec<String>, ExplanError> {
        self.strings("SELECT DISTINCT grp FROM arrays ORDER BY grp", params![])
    }

    /// Array names of `group`, sorted.
    pub fn arrays(&self, group: &str) -> Result<Vec<String>, ExplanError> {
        self.strings(
            "SELECT name FROM arrays WHERE grp = ?1 ORDER BY name",
            params![group],
        )
    }

    fn strings(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<String>, ExplanError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|err| sqlite_error("explan_data.store_query", "failed to prepare listing", err))?;
        let rows = stmt
            .query_map(args, |row| row.get::<_, String>(0))
            .map_err(|err| sqlite_error("explan_data.store_query", "failed to list", err))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|err| sqlite_error("explan_data.store_query", "failed to list", err))
    }

    /// Removes a group and its arrays; returns whether it existed.
    pub fn remove_group(&mut self, group: &str) -> Result<bool, ExplanError> {
        let tx = self
            .conn
            .transaction()
            .map_err(|err| sqlite_error("explan_data.store_transaction", "failed to start transaction", err))?;
        tx.execute("DELETE FROM array_values WHERE grp = ?1", params![group])
            .map_err(|err| sqlite_error("explan_data.store_delete", "failed to remove values", err))?;
        let removed = tx
            .execute("DELETE FROM arrays WHERE grp = ?1", params![group])
            .map_err(|err| sqlite_error("explan_data.store_delete", "failed to remove group", err))?;
        tx.commit()
            .map_err(|err| sqlite_error("explan_data.store_commit", "failed to commit removal", err))?;
        Ok(removed > 0)
    }
}

fn stored(value: f64) -> Option<f64> {
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}

impl MetricSource for GroupStore {
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
