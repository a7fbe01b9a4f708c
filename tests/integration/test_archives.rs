//! Archive extraction feeding the analyzer

use crate::fixtures::{self, EPOCH};
use git_version_analyzer::analyzer::AnalyzeOptions;
use git_version_analyzer::archive::{self, ArchiveExtractor, ArchiveKind, ExtractionResult};
use git_version_analyzer::locator::locate;
use git_version_analyzer::Error;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_zip_upload_analyzes_all_refs() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("source");
    let repo = fixtures::linear_history(&source, 3);
    fixtures::commit_on_side_branch(&repo, "feature", EPOCH + 24 * 3600);
    let expected = fixtures::reachable_commit_count(&repo);
    let zip = fixtures::zip_dir(&source, &temp_dir.path().join("project.zip"));

    let extractor = ArchiveExtractor::new(temp_dir.path().join("extracted"));
    let extraction = extractor.extract(&zip, "upload1").unwrap();

    assert_eq!(extraction.kind, ArchiveKind::Zip);
    assert_eq!(extraction.extracted_path, temp_dir.path().join("extracted/extracted_upload1"));
    let outcome = locate(&extraction.extracted_path, &AnalyzeOptions::default()).unwrap();
    let snapshot = outcome.snapshot().expect("extracted tree is a repository");
    assert_eq!(snapshot.total_commit_count, expected);
    assert_eq!(snapshot.commits[0].message, "Side work");
}

#[test]
fn test_tar_gz_extraction() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("source");
    fixtures::linear_history(&source, 2);
    let tarball = fixtures::tar_gz_dir(&source, &temp_dir.path().join("project.tar.gz"));

    let extractor = ArchiveExtractor::new(temp_dir.path().join("extracted"));
    let extraction = extractor.extract(&tarball, "t1").unwrap();

    assert_eq!(extraction.kind, ArchiveKind::TarGz);
    assert!(extraction.extracted_path.join("src/lib.rs").exists());
    let outcome = locate(&extraction.extracted_path, &AnalyzeOptions::default()).unwrap();
    assert_eq!(outcome.commit_count(), 2);
}

#[test]
fn test_archive_of_several_projects_lists_them() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("source");
    fixtures::linear_history(&source.join("api"), 1);
    fixtures::linear_history(&source.join("web"), 1);
    let zip = fixtures::zip_dir(&source, &temp_dir.path().join("projects.zip"));

    let extraction = ArchiveExtractor::new(temp_dir.path().join("out"))
        .extract(&zip, "multi")
        .unwrap();
    let outcome = locate(&extraction.extracted_path, &AnalyzeOptions::default()).unwrap();

    assert!(!outcome.is_repository());
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["hasSubRepositories"], true);
    assert_eq!(json["subRepositories"][0]["name"], "api");
    assert_eq!(json["subRepositories"][1]["name"], "web");
}

#[test]
fn test_corrupt_zip_is_rejected_and_cleaned_up() {
    let temp_dir = TempDir::new().unwrap();
    let bogus = temp_dir.path().join("broken.zip");
    fs::write(&bogus, b"this is not a zip archive").unwrap();
    let extractor = ArchiveExtractor::new(temp_dir.path().join("out"));

    let result = extractor.extract(&bogus, "bad");

    let err = result.as_ref().unwrap_err();
    assert!(matches!(err, Error::Extraction(_)));
    assert_eq!(err.status_code(), 400);
    assert!(!extractor.destination("bad").exists());

    let wire = ExtractionResult::from(&result);
    assert!(!wire.success);
    assert!(wire.error.is_some());
}

#[test]
fn test_unsupported_type_is_validation_error() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("notes.txt");
    fs::write(&file, b"hello").unwrap();

    let err = ArchiveExtractor::new(temp_dir.path())
        .extract(&file, "x")
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn test_archive_info_and_cleanup() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("Project.ZIP");
    fs::write(&file, vec![0u8; 2048]).unwrap();

    let info = archive::archive_info(&file).unwrap();
    assert_eq!(info.name, "Project.ZIP");
    assert_eq!(info.size, 2048);
    assert_eq!(info.size_formatted, "2 KB");
    assert_eq!(info.extension, ".zip");
    assert!(info.supported);

    let extracted = temp_dir.path().join("extracted_1");
    fs::create_dir_all(extracted.join("nested")).unwrap();
    assert!(archive::cleanup_extracted(&extracted).unwrap());
    assert!(!archive::cleanup_extracted(&extracted).unwrap());
}
