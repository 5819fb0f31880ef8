use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use explan_core::errors::{ErrorInfo, ExplanError};
use explan_plan::ident::IdentifierOptions;
use explan_plan::setting::Setting;
use walkdir::WalkDir;

use crate::store::GroupStore;

/// Enumerates the stored artifacts of a selection, or their complement, for
/// archival or cleanup. Nothing is moved or deleted here.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactSelector<'a> {
    settings: &'a [Setting],
    encoding: &'a IdentifierOptions,
}

impl<'a> ArtifactSelector<'a> {
    /// Selector over `settings`, keyed with `encoding`.
    pub fn new(settings: &'a [Setting], encoding: &'a IdentifierOptions) -> Self {
        Self { settings, encoding }
    }

    /// Identifiers of the selected settings.
    pub fn identifiers(&self) -> BTreeSet<String> {
        self.settings
            .iter()
            .map(|setting| setting.identifier(self.encoding))
            .collect()
    }

    /// Files of `dir` with `extension` written for `metrics` of the selection.
    ///
    /// A file matches when its name is exactly `<identifier>_<metric>` plus
    /// the extension. With `reverse`, returns the other files carrying the
    /// extension instead. Paths are sorted.
    ///
    /// `metrics` must not be empty: an identifier hiding a defaulted factor
    /// is a prefix of the identifiers that show it, so file names alone
    /// cannot tell which setting wrote them.
    pub fn files(
        &self,
        dir: &Path,
        extension: &str,
        metrics: &[&str],
        reverse: bool,
    ) -> Result<Vec<PathBuf>, ExplanError> {
        if metrics.is_empty() {
            return Err(ExplanError::Data(
                ErrorInfo::new("explan_data.archive_metrics", "no metric names given")
                    .with_context("path", dir.display().to_string())
                    .with_hint("pass the metric names written by the plan"),
            ));
        }
        let stems: BTreeSet<String> = self
            .identifiers()
            .iter()
            .flat_map(|identifier| {
                metrics
                    .iter()
                    .map(move |metric| format!("{identifier}_{metric}"))
            })
            .collect();
        let suffix = format!(".{extension}");
        let mut matched = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                ExplanError::Data(
                    ErrorInfo::new("explan_data.archive_walk", err.to_string())
                        .with_context("path", dir.display().to_string()),
                )
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            let Some(stem) = name.strip_suffix(&suffix) else {
                continue;
            };
            if stems.contains(stem) != reverse {
                matched.push(entry.into_path());
            }
        }
        Ok(matched)
    }

    /// Groups of `store` belonging to the selection (or, with `reverse`, the
    /// other groups). Names are sorted.
    pub fn groups(&self, store: &GroupStore, reverse: bool) -> Result<Vec<String>, ExplanError> {
        let identifiers = self.identifiers();
        Ok(store
            .groups()?
            .into_iter()
            .filter(|group| identifiers.contains(group) != reverse)
            .collect())
    }
}
