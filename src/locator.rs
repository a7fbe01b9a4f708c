// src/locator.rs

use crate::analyzer::{self, AnalyzeOptions};
use crate::error::{Error, Result};
use crate::model::{AnalysisOutcome, LocatorReport, SubRepository};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Whether `path` is itself the root of a repository
pub fn is_repository(path: &Path) -> bool {
    analyzer::open_repository(path).is_ok()
}

/// Hidden entries and well-known system folders are never inspected
fn is_hidden_or_system(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('$') || name == "System Volume Information"
}

/// Immediate child directories that are repositories, sorted by name.
///
/// Only one level deep. A child that cannot be opened is left out.
pub fn find_sub_repositories(base: &Path) -> Vec<SubRepository> {
    let entries = match fs::read_dir(base) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("Cannot scan {} for sub-repositories: {}", base.display(), err);
            return Vec::new();
        }
    };

    let mut found: Vec<SubRepository> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            if is_hidden_or_system(&name) {
                return None;
            }
            let path = entry.path();
            if !is_repository(&path) {
                return None;
            }
            Some(SubRepository {
                relative_path: name.clone().into(),
                name,
                path,
            })
        })
        .collect();
    found.sort_by(|a, b| a.name.cmp(&b.name));
    found
}

/// Analyzes `path` if it is a repository, otherwise reports the sub-repositories below it.
///
/// Fails only when `path` does not exist; an unopenable repository becomes a
/// [`LocatorReport`] carrying the original failure text.
pub fn locate(path: &Path, options: &AnalyzeOptions) -> Result<AnalysisOutcome> {
    if !path.exists() {
        return Err(Error::not_found(path.display().to_string()));
    }

    match analyzer::analyze(path, options) {
        Ok(snapshot) => Ok(AnalysisOutcome::Repository(Box::new(snapshot))),
        Err(err) => {
            debug!("{} is not an analyzable repository: {}", path.display(), err);
            let subs = find_sub_repositories(path);
            Ok(AnalysisOutcome::NotRepository(LocatorReport::new(
                subs,
                Some(err.to_string()),
            )))
        }
    }
}
