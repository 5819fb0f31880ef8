use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use explan_core::errors::{ErrorInfo, ExplanError};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::plan::Plan;
use crate::setting::{BoxError, OnError, Setting};

fn io_error(code: &str, path: &Path, err: impl ToString) -> ExplanError {
    ExplanError::Data(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
    )
}

/// Append-only log of failed settings.
///
/// Each failure becomes one block: a timestamped header naming the setting
/// followed by the error and its causes, one per line.
#[derive(Debug)]
pub struct ErrorLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl ErrorLog {
    /// Opens (or creates) the log, creating missing parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExplanError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|err| io_error("explan_plan.error_log_dir", parent, err))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| io_error("explan_plan.error_log_open", &path, err))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Location of the log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one failure block.
    pub fn record(&self, identifier: &str, chain: &[String]) -> Result<(), ExplanError> {
        let mut block = format!("[{}] setting {identifier:?} failed\n", Utc::now().to_rfc3339());
        for (depth, line) in chain.iter().enumerate() {
            if depth == 0 {
                block.push_str(&format!("  error: {line}\n"));
            } else {
                block.push_str(&format!("  caused by: {line}\n"));
            }
        }
        let mut file = self.file.lock().map_err(|_| {
            ExplanError::Data(
                ErrorInfo::new("explan_plan.error_log_poisoned", "error log lock poisoned")
                    .with_context("path", self.path.display().to_string()),
            )
        })?;
        file.write_all(block.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|err| io_error("explan_plan.error_log_write", &self.path, err))
    }
}

/// Options governing [`Plan::perform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformOptions {
    /// Number of worker threads; `1` runs sequentially in enumeration order.
    pub concurrency: usize,
    /// When set, failures are logged there and the run continues.
    pub error_log: Option<PathBuf>,
    /// Emit a progress event every this many settings (sequential mode, `0` disables).
    pub progress_interval: usize,
}

impl Default for PerformOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            error_log: None,
            progress_interval: 0,
        }
    }
}

impl PerformOptions {
    /// Runs on `threads` workers.
    pub fn concurrent(mut self, threads: usize) -> Self {
        self.concurrency = threads;
        self
    }

    /// Records failures in `path` instead of aborting.
    pub fn logging_errors_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_log = Some(path.into());
        self
    }

    /// Reports progress every `interval` settings.
    pub fn with_progress(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }
}

impl Plan {
    /// Calls `function(setting, collaborator)` for every active setting.
    ///
    /// Without an error log the first failure aborts the run and is returned.
    /// With one, failures are recorded and counted; the count is returned.
    /// Concurrent runs make no promise about invocation order.
    pub fn perform<C, F, E>(
        &mut self,
        function: F,
        collaborator: &C,
        opts: &PerformOptions,
    ) -> Result<usize, ExplanError>
    where
        C: Sync + ?Sized,
        F: Fn(&Setting, &C) -> Result<(), E> + Sync,
        E: Into<BoxError>,
    {
        let log = opts.error_log.as_deref().map(ErrorLog::open).transpose()?;
        let on_error = match &log {
            Some(log) => OnError::Record(Some(log)),
            None => OnError::Raise,
        };
        let settings = self.settings()?;
        let total = settings.len();
        info!(total, concurrency = opts.concurrency.max(1), "performing plan");

        let failures = if opts.concurrency <= 1 {
            let mut failures = 0usize;
            for (done, setting) in settings.iter().enumerate() {
                if setting.run(&function, collaborator, on_error)? {
                    failures += 1;
                }
                let done = done + 1;
                if opts.progress_interval > 0 && (done % opts.progress_interval == 0 || done == total)
                {
                    info!(done, total, failures, "progress");
                }
            }
            failures
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(opts.concurrency)
                .build()
                .map_err(|err| {
                    ExplanError::Execution(ErrorInfo::new("explan_plan.thread_pool", err.to_string()))
                })?;
            let failures = AtomicUsize::new(0);
            pool.install(|| {
                settings.par_iter().try_for_each(|setting| {
                    if setting.run(&function, collaborator, on_error)? {
                        failures.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok::<(), ExplanError>(())
                })
            })?;
            failures.into_inner()
        };
        debug!(total, failures, "plan performed");
        self.finish_pass();
        Ok(failures)
    }
}
