// src/clone.rs

use crate::error::{Error, Result};
use crate::model::ClonedRepositoryHandle;
use chrono::{DateTime, Utc};
use git2::build::RepoBuilder;
use git2::FetchOptions;
use reqwest::Url;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// An entry currently present in the clone cache
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedClone {
    pub name: String,
    pub path: PathBuf,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Directory owning every cloned repository
#[derive(Debug, Clone)]
pub struct CloneCache {
    root: PathBuf,
}

impl CloneCache {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Clones `clone_url` into a fresh directory; depth 1 unless `full`.
    ///
    /// With a token, it is embedded in the URL's authority for private access.
    /// Local sources are always cloned in full, the local transport has no
    /// shallow fetch.
    pub fn clone_repository(
        &self,
        clone_url: &str,
        repo_name: &str,
        access_token: Option<&str>,
        full: bool,
    ) -> Result<ClonedRepositoryHandle> {
        fs::create_dir_all(&self.root)?;
        let id = Uuid::new_v4();
        let local_path = self.root.join(format!("{}-{}", sanitize_name(repo_name), id));
        let url = authenticated_url(clone_url, access_token)?;
        let full = full || is_local_source(clone_url);

        info!(
            "Cloning {} into {} ({})",
            clone_url,
            local_path.display(),
            if full { "full" } else { "shallow, depth 1" }
        );

        let mut fetch = FetchOptions::new();
        if !full {
            fetch.depth(1);
        }
        let result = RepoBuilder::new().fetch_options(fetch).clone(&url, &local_path);

        if let Err(err) = result {
            if local_path.exists() {
                if let Err(cleanup) = fs::remove_dir_all(&local_path) {
                    warn!("Could not remove partial clone {}: {}", local_path.display(), cleanup);
                }
            }
            return Err(Error::upstream(format!(
                "could not clone {}: {}",
                repo_name,
                redact(err.message(), access_token)
            )));
        }

        info!("Cloned {} into {}", repo_name, local_path.display());
        Ok(ClonedRepositoryHandle {
            id,
            local_path,
            display_name: repo_name.to_string(),
            shallow: !full,
        })
    }

    /// Removes one clone; `false` when it is already gone
    pub fn cleanup(&self, clone_path: &Path) -> Result<bool> {
        if !clone_path.exists() {
            return Ok(false);
        }
        let root = self.root.canonicalize()?;
        let target = clone_path.canonicalize()?;
        if target == root || !target.starts_with(&root) {
            return Err(Error::validation(format!(
                "{} is not inside the clone cache",
                clone_path.display()
            )));
        }
        fs::remove_dir_all(&target)?;
        info!("Removed clone {}", target.display());
        Ok(true)
    }

    /// Removes every entry; a failure on one entry does not stop the sweep
    pub fn cleanup_all(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        let mut cleaned = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let removed = match entry.file_type() {
                Ok(t) if t.is_dir() => fs::remove_dir_all(&path),
                _ => fs::remove_file(&path),
            };
            match removed {
                Ok(()) => cleaned += 1,
                Err(err) => warn!("Could not remove {}: {}", path.display(), err),
            }
        }
        info!("Swept {} entries from the clone cache", cleaned);
        Ok(cleaned)
    }

    pub fn list(&self) -> Result<Vec<CachedClone>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut clones: Vec<CachedClone> = entries
            .flatten()
            .filter_map(|entry| {
                let metadata = entry.metadata().ok()?;
                if !metadata.is_dir() {
                    return None;
                }
                Some(CachedClone {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    path: entry.path(),
                    modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
                })
            })
            .collect();
        clones.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clones)
    }
}

/// A `file://` URL or an existing path on this machine
pub fn is_local_source(clone_url: &str) -> bool {
    clone_url.starts_with("file://") || Path::new(clone_url).exists()
}

/// Keeps directory names to a portable character set
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "repository".to_string()
    } else {
        cleaned
    }
}

/// Embeds the token as the user part of an `https` URL; other URLs pass through
pub fn authenticated_url(clone_url: &str, access_token: Option<&str>) -> Result<String> {
    let Some(token) = access_token.filter(|t| !t.is_empty()) else {
        return Ok(clone_url.to_string());
    };
    if !clone_url.starts_with("https://") {
        return Ok(clone_url.to_string());
    }
    let mut url = Url::parse(clone_url)
        .map_err(|e| Error::validation(format!("invalid clone URL {}: {}", clone_url, e)))?;
    url.set_username(token)
        .map_err(|_| Error::validation(format!("cannot embed credentials in {}", clone_url)))?;
    Ok(url.into())
}

fn redact(message: &str, token: Option<&str>) -> String {
    match token.filter(|t| !t.is_empty()) {
        Some(token) => message.replace(token, "***"),
        None => message.to_string(),
    }
}
