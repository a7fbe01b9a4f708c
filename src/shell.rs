// src/shell.rs

use crate::archive::SUPPORTED_EXTENSIONS;
use crate::model::{AnalysisOutcome, LocatorReport, RepositorySnapshot};
use std::fmt::Write as _;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Mutex;

/// Named set of extensions offered by a file picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFilter {
    pub name: String,
    /// Extensions with their leading dot; `*` accepts anything
    pub extensions: Vec<String>,
}

impl FileFilter {
    pub fn archives() -> Self {
        Self {
            name: "Compressed archives".to_string(),
            extensions: SUPPORTED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn accepts(&self, path: &std::path::Path) -> bool {
        if self.extensions.iter().any(|e| e == "*") {
            return true;
        }
        let name = path.to_string_lossy().to_lowercase();
        self.extensions.iter().any(|e| name.ends_with(&e.to_lowercase()))
    }
}

/// Host capability for folder and file selection
pub trait HostDialogs {
    fn pick_folder(&self) -> Option<PathBuf>;
    fn pick_file(&self, filters: &[FileFilter]) -> Option<PathBuf>;
}

/// Dialogs answered on a terminal: an empty answer cancels
pub struct TerminalDialogs<R, W> {
    io: Mutex<(R, W)>,
}

impl<R: BufRead, W: Write> TerminalDialogs<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            io: Mutex::new((input, output)),
        }
    }

    fn prompt(&self, question: &str) -> Option<String> {
        let mut io = self.io.lock().ok()?;
        let (input, output) = &mut *io;
        write!(output, "{}: ", question).ok()?;
        output.flush().ok()?;
        let mut line = String::new();
        input.read_line(&mut line).ok()?;
        let answer = line.trim();
        if answer.is_empty() {
            None
        } else {
            Some(answer.to_string())
        }
    }

    fn say(&self, message: &str) {
        if let Ok(mut io) = self.io.lock() {
            let _ = writeln!(io.1, "{}", message);
        }
    }
}

impl<R: BufRead, W: Write> HostDialogs for TerminalDialogs<R, W> {
    fn pick_folder(&self) -> Option<PathBuf> {
        self.prompt("Project folder").map(PathBuf::from)
    }

    fn pick_file(&self, filters: &[FileFilter]) -> Option<PathBuf> {
        let hint: Vec<String> = filters.iter().flat_map(|f| f.extensions.clone()).collect();
        let question = format!("Project archive ({})", hint.join(" "));
        loop {
            let path = PathBuf::from(self.prompt(&question)?);
            if filters.is_empty() || filters.iter().any(|f| f.accepts(&path)) {
                return Some(path);
            }
            self.say("Unsupported file type, try again or leave empty to cancel.");
        }
    }
}

/// Text summary of an analysis outcome
pub fn render_outcome(outcome: &AnalysisOutcome) -> String {
    match outcome {
        AnalysisOutcome::Repository(snapshot) => render_snapshot(snapshot),
        AnalysisOutcome::NotRepository(report) => render_report(report),
    }
}

fn render_snapshot(s: &RepositorySnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Git Repository Analysis ===");
    let _ = writeln!(out, "Branch:      {}", s.current_branch.as_deref().unwrap_or("(detached)"));
    if let Some(tracking) = &s.status.tracking {
        let _ = writeln!(
            out,
            "Tracking:    {} (ahead {}, behind {})",
            tracking, s.status.ahead, s.status.behind
        );
    }
    let _ = writeln!(
        out,
        "Changes:     {} staged, {} modified, {} deleted, {} untracked",
        s.status.staged, s.status.modified, s.status.deleted, s.status.not_added
    );
    let _ = writeln!(out, "Commits:     {}", s.total_commit_count);
    let _ = writeln!(out, "Branches:    {}", s.branch_count);
    let _ = writeln!(
        out,
        "Tags:        {}{}",
        s.tag_count,
        s.latest_tag.as_deref().map(|t| format!(" (latest {})", t)).unwrap_or_default()
    );
    let _ = writeln!(out, "Authors:     {}", s.stats.unique_author_count);
    let _ = writeln!(out, "Files:       {}", s.stats.file_count);
    let _ = writeln!(out, "Lines:       ~{}", s.stats.approximate_line_count);
    if let (Some(first), Some(last)) = (s.stats.first_commit_at, s.stats.last_commit_at) {
        let _ = writeln!(
            out,
            "History:     {} .. {}",
            first.format("%Y-%m-%d"),
            last.format("%Y-%m-%d")
        );
    }

    if !s.stats.file_extension_histogram.is_empty() {
        let mut kinds: Vec<(&String, &usize)> = s.stats.file_extension_histogram.iter().collect();
        kinds.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        let top: Vec<String> = kinds.iter().take(8).map(|(e, n)| format!("{} {}", e, n)).collect();
        let _ = writeln!(out, "File types:  {}", top.join(", "));
    }

    if !s.branch_list.is_empty() {
        let _ = writeln!(out, "\nBranches:");
        for branch in &s.branch_list {
            let current = s.current_branch.as_deref() == Some(branch.as_str());
            let marker = if current { "*" } else { " " };
            let _ = writeln!(out, " {} {}", marker, branch);
        }
    }

    if !s.commits.is_empty() {
        let _ = writeln!(out, "\nRecent commits:");
        for c in &s.commits {
            let _ = writeln!(
                out,
                "  {} {} {:<24} +{} -{} ({} files) {}",
                c.short_hash,
                c.authored_at.format("%Y-%m-%d"),
                truncate(&c.author_name, 24),
                c.insertions,
                c.deletions,
                c.files_changed,
                c.message
            );
        }
    }
    out
}

fn render_report(report: &LocatorReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", report.message);
    if let Some(error) = &report.error {
        let _ = writeln!(out, "Reason: {}", error);
    }
    for sub in &report.sub_repositories {
        let _ = writeln!(out, "  {}  {}", sub.name, sub.path.display());
    }
    out
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
