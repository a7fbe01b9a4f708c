// src/worktree.rs

use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Version-control metadata directory, never part of the file statistics
pub const METADATA_DIR: &str = ".git";

/// Extensions whose files contribute to the approximate line count
pub const SOURCE_EXTENSIONS: &[&str] = &[
    ".js", ".ts", ".jsx", ".tsx", ".py", ".java", ".c", ".cpp", ".cs", ".php", ".rb", ".go", ".rs",
];

/// File statistics of the checked-out tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeSummary {
    pub file_count: usize,
    pub extension_histogram: BTreeMap<String, usize>,
    pub approximate_line_count: usize,
}

/// Lowercased extension with its leading dot, e.g. `.rs`
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e.to_lowercase()))
}

pub fn is_source_file(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext.as_str()))
}

/// Every regular file below `root`, skipping the metadata directory
pub fn list_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != METADATA_DIR)
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Skipping unreadable tree entry: {}", err);
                None
            }
        })
        .filter(|entry| !entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .collect()
}

/// Newline-delimited segments of a text file; binary or unreadable files count 0
pub fn count_lines(path: &Path) -> usize {
    match fs::read_to_string(path) {
        Ok(content) => content.matches('\n').count() + 1,
        Err(_) => 0,
    }
}

pub fn summarize(root: &Path, bar: &ProgressBar) -> TreeSummary {
    let files = list_files(root);

    let mut extension_histogram = BTreeMap::new();
    for file in &files {
        if let Some(ext) = extension_of(file) {
            *extension_histogram.entry(ext).or_insert(0) += 1;
        }
    }

    let sources: Vec<&PathBuf> = files.iter().filter(|f| is_source_file(f)).collect();
    bar.set_length(sources.len() as u64);
    bar.set_message("Counting lines");
    let approximate_line_count = sources
        .par_iter()
        .progress_with(bar.clone())
        .map(|path| count_lines(path))
        .sum();

    TreeSummary {
        file_count: files.len(),
        extension_histogram,
        approximate_line_count,
    }
}
