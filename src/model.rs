// src/model.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use uuid::Uuid;

/// Number of hex characters in a short hash
pub const SHORT_HASH_LEN: usize = 7;

/// Line delta of a single file within one commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDelta {
    pub path: String,
    pub insertions: usize,
    pub deletions: usize,
}

/// One commit, diffed against its first parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    pub full_hash: String,
    pub short_hash: String,
    /// First line of the commit message
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub authored_at: DateTime<Utc>,
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
    pub per_file_deltas: Vec<FileDelta>,
}

impl CommitRecord {
    /// A record with zeroed diff statistics
    pub fn new(
        full_hash: String,
        message: String,
        author_name: String,
        author_email: String,
        authored_at: DateTime<Utc>,
    ) -> Self {
        let short_hash = short_hash(&full_hash).to_string();
        Self {
            full_hash,
            short_hash,
            message,
            author_name,
            author_email,
            authored_at,
            files_changed: 0,
            insertions: 0,
            deletions: 0,
            per_file_deltas: Vec::new(),
        }
    }

    /// Replaces the diff statistics with the given per-file deltas
    pub fn with_deltas(mut self, deltas: Vec<FileDelta>) -> Self {
        self.files_changed = deltas.len();
        self.insertions = deltas.iter().map(|d| d.insertions).sum();
        self.deletions = deltas.iter().map(|d| d.deletions).sum();
        self.per_file_deltas = deltas;
        self
    }
}

pub fn short_hash(full_hash: &str) -> &str {
    let end = full_hash
        .char_indices()
        .nth(SHORT_HASH_LEN)
        .map_or(full_hash.len(), |(i, _)| i);
    &full_hash[..end]
}

/// Working tree status at the time of analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingTreeStatus {
    pub current: Option<String>,
    pub tracking: Option<String>,
    pub ahead: usize,
    pub behind: usize,
    pub staged: usize,
    pub modified: usize,
    pub deleted: usize,
    pub created: usize,
    pub not_added: usize,
}

/// Repository-wide aggregates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryStats {
    pub unique_author_count: usize,
    pub unique_author_emails: BTreeSet<String>,
    /// Files in the working tree, metadata directory excluded
    pub file_count: usize,
    pub file_extension_histogram: BTreeMap<String, usize>,
    pub approximate_line_count: usize,
    pub first_commit_at: Option<DateTime<Utc>>,
    pub last_commit_at: Option<DateTime<Utc>>,
}

/// Result of one successful analysis pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySnapshot {
    pub is_repository: bool,
    pub current_branch: Option<String>,
    pub status: WorkingTreeStatus,
    pub branch_list: Vec<String>,
    pub branch_count: usize,
    pub tag_list: Vec<String>,
    pub tag_count: usize,
    pub latest_tag: Option<String>,
    pub total_commit_count: usize,
    /// Most recent first, bounded by the commit limit
    pub commits: Vec<CommitRecord>,
    pub stats: RepositoryStats,
    pub analyzed_at: DateTime<Utc>,
}

/// A child directory that is itself a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubRepository {
    pub name: String,
    pub path: PathBuf,
    pub relative_path: PathBuf,
}

/// Outcome when the requested path is not a repository root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatorReport {
    pub is_repository: bool,
    pub has_sub_repositories: bool,
    pub sub_repositories: Vec<SubRepository>,
    pub message: String,
    /// Why the path itself could not be opened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LocatorReport {
    pub fn new(sub_repositories: Vec<SubRepository>, error: Option<String>) -> Self {
        let has_sub_repositories = !sub_repositories.is_empty();
        let message = if has_sub_repositories {
            "Git repositories found in subdirectories".to_string()
        } else {
            "No valid Git repository found".to_string()
        };
        Self {
            is_repository: false,
            has_sub_repositories,
            sub_repositories,
            message,
            error,
        }
    }
}

/// Either a full snapshot or the locator fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisOutcome {
    Repository(Box<RepositorySnapshot>),
    NotRepository(LocatorReport),
}

impl AnalysisOutcome {
    pub fn is_repository(&self) -> bool {
        matches!(self, AnalysisOutcome::Repository(_))
    }

    pub fn snapshot(&self) -> Option<&RepositorySnapshot> {
        match self {
            AnalysisOutcome::Repository(snapshot) => Some(&**snapshot),
            AnalysisOutcome::NotRepository(_) => None,
        }
    }

    pub fn commit_count(&self) -> usize {
        self.snapshot().map_or(0, |s| s.commits.len())
    }
}

/// A repository cloned from a remote platform into the clone cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClonedRepositoryHandle {
    pub id: Uuid,
    pub local_path: PathBuf,
    pub display_name: String,
    pub shallow: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginType {
    Github,
    Manual,
    Guest,
}

/// Authenticated principal, as persisted in the identity file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub login_type: LoginType,
}

/// Identity as exposed to the presentation layer: never carries the token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIdentity {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub login_type: LoginType,
}

impl From<&UserIdentity> for PublicIdentity {
    fn from(identity: &UserIdentity) -> Self {
        Self {
            id: identity.id.clone(),
            username: identity.username.clone(),
            display_name: identity.display_name.clone(),
            email: identity.email.clone(),
            avatar_url: identity.avatar_url.clone(),
            login_type: identity.login_type,
        }
    }
}
