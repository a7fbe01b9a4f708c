//! Clone cache lifecycle

use crate::fixtures::{self, EPOCH};
use git_version_analyzer::analyzer::AnalyzeOptions;
use git_version_analyzer::clone::CloneCache;
use git_version_analyzer::locator::locate;
use git_version_analyzer::Error;
use tempfile::TempDir;

#[test]
fn test_full_clone_of_local_repository() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("origin");
    let repo = fixtures::linear_history(&source, 3);
    fixtures::commit_on_side_branch(&repo, "feature", EPOCH + 48 * 3600);
    let cache = CloneCache::new(temp_dir.path().join("clones"));

    let handle = cache
        .clone_repository(source.to_str().unwrap(), "origin", None, true)
        .unwrap();

    assert!(!handle.shallow);
    assert_eq!(handle.display_name, "origin");
    assert!(handle.local_path.starts_with(cache.root()));

    let outcome = locate(&handle.local_path, &AnalyzeOptions::default()).unwrap();
    let snapshot = outcome.snapshot().unwrap();
    // Remote-tracking refs carry the side branch into the count
    assert_eq!(snapshot.total_commit_count, 4);
    assert!(snapshot
        .branch_list
        .contains(&"remotes/origin/feature".to_string()));

    assert_eq!(cache.list().unwrap().len(), 1);
    assert!(cache.cleanup(&handle.local_path).unwrap());
    assert!(!handle.local_path.exists());
}

#[test]
fn test_shallow_request_for_local_source_clones_in_full() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("origin");
    fixtures::linear_history(&source, 3);
    let cache = CloneCache::new(temp_dir.path().join("clones"));

    let handle = cache
        .clone_repository(source.to_str().unwrap(), "origin", None, false)
        .unwrap();

    assert!(!handle.shallow);
    let outcome = locate(&handle.local_path, &AnalyzeOptions::default()).unwrap();
    assert_eq!(outcome.snapshot().unwrap().total_commit_count, 3);
}

#[test]
fn test_failed_clone_leaves_nothing_behind() {
    let temp_dir = TempDir::new().unwrap();
    let cache = CloneCache::new(temp_dir.path().join("clones"));

    let err = cache
        .clone_repository(
            temp_dir.path().join("does-not-exist").to_str().unwrap(),
            "ghost",
            None,
            true,
        )
        .unwrap_err();

    assert!(matches!(err, Error::Upstream(_)));
    assert!(cache.list().unwrap().is_empty());
}

#[test]
fn test_cleanup_all_sweeps_every_clone() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("origin");
    fixtures::linear_history(&source, 1);
    let cache = CloneCache::new(temp_dir.path().join("clones"));
    for name in ["one", "two"] {
        cache
            .clone_repository(source.to_str().unwrap(), name, None, true)
            .unwrap();
    }

    assert_eq!(cache.cleanup_all().unwrap(), 2);
    assert!(cache.list().unwrap().is_empty());
}

#[test]
#[ignore = "requires network access to github.com"]
fn test_shallow_clone_has_single_commit() {
    let temp_dir = TempDir::new().unwrap();
    let cache = CloneCache::new(temp_dir.path());

    let handle = cache
        .clone_repository("https://github.com/octocat/Hello-World.git", "Hello-World", None, false)
        .unwrap();

    assert!(handle.shallow);
    let outcome = locate(&handle.local_path, &AnalyzeOptions::default()).unwrap();
    let snapshot = outcome.snapshot().unwrap();
    assert_eq!(snapshot.total_commit_count, 1);
    // Parent is missing from a depth-1 clone
    assert_eq!(snapshot.commits[0].files_changed, 0);
}
