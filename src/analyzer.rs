// src/analyzer.rs

use crate::error::Result;
use crate::model::*;
use crate::worktree;
use chrono::{DateTime, TimeZone, Utc};
use git2::{
    BranchType, Commit, DiffOptions, ErrorCode, Oid, Patch, Repository, RepositoryOpenFlags,
    Status, StatusOptions,
};
use indicatif::ProgressBar;
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::Path;
use tracing::debug;

/// Default number of commits carried in a snapshot
pub const DEFAULT_COMMIT_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub commit_limit: usize,
    /// Draw progress bars on stderr
    pub show_progress: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            commit_limit: DEFAULT_COMMIT_LIMIT,
            show_progress: false,
        }
    }
}

impl AnalyzeOptions {
    pub fn with_limit(commit_limit: usize) -> Self {
        Self {
            commit_limit,
            ..Self::default()
        }
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if self.show_progress {
            ProgressBar::new(len)
        } else {
            ProgressBar::hidden()
        }
    }
}

/// Opens `path` only if it is itself a repository root; parents are not searched
pub fn open_repository(path: &Path) -> Result<Repository> {
    let repo = Repository::open_ext(path, RepositoryOpenFlags::NO_SEARCH, &[] as &[&OsStr])?;
    Ok(repo)
}

/// One entry of the all-refs history walk
#[derive(Debug, Clone, Copy)]
struct HistoryEntry {
    oid: Oid,
    author_time: i64,
    commit_time: i64,
}

pub fn analyze(repo_path: &Path, options: &AnalyzeOptions) -> Result<RepositorySnapshot> {
    let repo = open_repository(repo_path)?;
    debug!("Analyzing repository at: {}", repo_path.display());

    let current_branch = current_branch(&repo)?;
    let status = working_tree_status(&repo, current_branch.clone())?;
    let branch_list = list_branches(&repo)?;
    let tag_list = list_tags(&repo)?;
    let latest_tag = latest_tag(&repo, &tag_list);

    // 1. Walk every commit reachable from any ref or HEAD
    let mut history = Vec::new();
    let mut author_emails = BTreeSet::new();
    let mut revwalk = repo.revwalk()?;
    revwalk.push_glob("*")?;
    if let Err(err) = revwalk.push_head() {
        // Unborn HEAD in an empty repository
        debug!("HEAD not pushed to history walk: {}", err);
    }
    revwalk.set_sorting(git2::Sort::TIME)?;

    for oid in revwalk {
        let oid = oid?;
        let commit = repo.find_commit(oid)?;
        if let Some(email) = commit.author().email() {
            author_emails.insert(email.to_string());
        }
        history.push(HistoryEntry {
            oid,
            author_time: commit.author().when().seconds(),
            commit_time: commit.time().seconds(),
        });
    }

    let first_commit_at = history.iter().map(|h| h.author_time).min().and_then(timestamp);
    let last_commit_at = history.iter().map(|h| h.author_time).max().and_then(timestamp);
    let total_commit_count = history.len();

    // 2. Newest commits by author time, diffed against their first parent
    history.sort_by(|a, b| {
        b.author_time
            .cmp(&a.author_time)
            .then(b.commit_time.cmp(&a.commit_time))
            .then(a.oid.cmp(&b.oid))
    });
    history.truncate(options.commit_limit);

    let bar = options.progress_bar(history.len() as u64);
    bar.set_message("Analyzing commits");
    let mut commits = Vec::with_capacity(history.len());
    for entry in &history {
        let commit = repo.find_commit(entry.oid)?;
        commits.push(commit_record(&repo, &commit));
        bar.inc(1);
    }
    bar.finish_and_clear();

    // 3. Independent pass over the checked-out files
    let tree = match repo.workdir() {
        Some(workdir) => {
            let bar = options.progress_bar(0);
            let summary = worktree::summarize(workdir, &bar);
            bar.finish_and_clear();
            summary
        }
        None => worktree::TreeSummary::default(),
    };

    let stats = RepositoryStats {
        unique_author_count: author_emails.len(),
        unique_author_emails: author_emails,
        file_count: tree.file_count,
        file_extension_histogram: tree.extension_histogram,
        approximate_line_count: tree.approximate_line_count,
        first_commit_at,
        last_commit_at,
    };

    Ok(RepositorySnapshot {
        is_repository: true,
        current_branch,
        status,
        branch_count: branch_list.len(),
        branch_list,
        tag_count: tag_list.len(),
        tag_list,
        latest_tag,
        total_commit_count,
        commits,
        stats,
        analyzed_at: Utc::now(),
    })
}

fn timestamp(seconds: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0).single()
}

fn commit_record(repo: &Repository, commit: &Commit) -> CommitRecord {
    let author = commit.author();
    let record = CommitRecord::new(
        commit.id().to_string(),
        commit.summary().unwrap_or("").to_string(),
        author.name().unwrap_or("Unknown").to_string(),
        author.email().unwrap_or("").to_string(),
        timestamp(author.when().seconds()).unwrap_or_default(),
    );

    // Root commits and parents missing from a shallow clone count as zero
    match diff_against_first_parent(repo, commit) {
        Ok(deltas) => record.with_deltas(deltas),
        Err(err) => {
            debug!("No diff statistics for {}: {}", commit.id(), err);
            record
        }
    }
}

fn diff_against_first_parent(repo: &Repository, commit: &Commit) -> Result<Vec<FileDelta>> {
    let parent_tree = commit.parent(0)?.tree()?;
    let current_tree = commit.tree()?;

    let mut diff_opts = DiffOptions::new();
    diff_opts.include_untracked(false);
    diff_opts.ignore_filemode(true);

    let diff =
        repo.diff_tree_to_tree(Some(&parent_tree), Some(&current_tree), Some(&mut diff_opts))?;

    let mut deltas = Vec::with_capacity(diff.deltas().len());
    for (idx, delta) in diff.deltas().enumerate() {
        let path = match delta.status() {
            git2::Delta::Deleted => delta.old_file().path(),
            _ => delta.new_file().path(),
        };
        let path = path.map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();

        let (insertions, deletions) = match Patch::from_diff(&diff, idx)? {
            Some(patch) => {
                let (_, additions, removals) = patch.line_stats()?;
                (additions, removals)
            }
            None => (0, 0),
        };
        deltas.push(FileDelta { path, insertions, deletions });
    }
    Ok(deltas)
}

/// Short name of the branch HEAD points at, including an unborn branch
fn current_branch(repo: &Repository) -> Result<Option<String>> {
    match repo.head() {
        Ok(head) if head.is_branch() => Ok(head.shorthand().map(String::from)),
        Ok(_) => Ok(None),
        Err(err) if err.code() == ErrorCode::UnbornBranch || err.code() == ErrorCode::NotFound => {
            let head = repo.find_reference("HEAD")?;
            Ok(head
                .symbolic_target()
                .map(|target| target.trim_start_matches("refs/heads/").to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

fn working_tree_status(repo: &Repository, current: Option<String>) -> Result<WorkingTreeStatus> {
    let mut status = WorkingTreeStatus {
        current,
        ..Default::default()
    };

    if let Some(branch_name) = status.current.clone() {
        if let Ok(branch) = repo.find_branch(&branch_name, BranchType::Local) {
            if let Ok(upstream) = branch.upstream() {
                status.tracking = upstream.name().ok().flatten().map(String::from);
                let targets = (branch.get().target(), upstream.get().target());
                if let (Some(local), Some(remote)) = targets {
                    let (ahead, behind) = repo.graph_ahead_behind(local, remote)?;
                    status.ahead = ahead;
                    status.behind = behind;
                }
            }
        }
    }

    if repo.is_bare() {
        return Ok(status);
    }

    let mut opts = StatusOptions::new();
    opts.include_untracked(true).recurse_untracked_dirs(true);
    for entry in repo.statuses(Some(&mut opts))?.iter() {
        let s = entry.status();
        if s.intersects(
            Status::INDEX_NEW
                | Status::INDEX_MODIFIED
                | Status::INDEX_DELETED
                | Status::INDEX_RENAMED
                | Status::INDEX_TYPECHANGE,
        ) {
            status.staged += 1;
        }
        if s.contains(Status::INDEX_NEW) {
            status.created += 1;
        }
        if s.contains(Status::WT_MODIFIED) {
            status.modified += 1;
        }
        if s.intersects(Status::WT_DELETED | Status::INDEX_DELETED) {
            status.deleted += 1;
        }
        if s.contains(Status::WT_NEW) {
            status.not_added += 1;
        }
    }
    Ok(status)
}

/// Local branches, then remote-tracking branches as `remotes/<remote>/<name>`
fn list_branches(repo: &Repository) -> Result<Vec<String>> {
    let mut local = BTreeSet::new();
    let mut remote = BTreeSet::new();
    for branch in repo.branches(None)? {
        let (branch, kind) = branch?;
        if branch.get().symbolic_target().is_some() {
            continue;
        }
        let Some(name) = branch.name()? else { continue };
        match kind {
            BranchType::Local => local.insert(name.to_string()),
            BranchType::Remote => remote.insert(format!("remotes/{}", name)),
        };
    }
    Ok(local.into_iter().chain(remote).collect())
}

fn list_tags(repo: &Repository) -> Result<Vec<String>> {
    let names = repo.tag_names(None)?;
    let unique: BTreeSet<String> = names.iter().flatten().map(String::from).collect();
    Ok(unique.into_iter().collect())
}

/// The tag whose target commit is newest
fn latest_tag(repo: &Repository, tags: &[String]) -> Option<String> {
    tags.iter()
        .filter_map(|name| {
            let reference = repo.find_reference(&format!("refs/tags/{}", name)).ok()?;
            let commit = reference.peel_to_commit().ok()?;
            Some((commit.time().seconds(), name))
        })
        .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(a.1)))
        .map(|(_, name)| name.clone())
}
