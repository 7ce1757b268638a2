use std::path::Path;
use std::process::Command;

use kiln_build::GitInfo;
use kiln_core::{TagFormat, TagValues, VcsInfo};
use tempfile::TempDir;

fn git(dir: &Path, args: &[&str]) {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
}

/// Initialize a git repo with one commit on branch `topic`.
fn init_git_project(dir: &Path) {
    std::fs::write(dir.join("kiln.toml"), "[functions]\n").unwrap();
    git(dir, &["init"]);
    git(dir, &["config", "user.email", "test@test.com"]);
    git(dir, &["config", "user.name", "Test"]);
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", "init"]);
    git(dir, &["checkout", "-b", "topic"]);
}

#[test]
fn reads_revision_and_branch() {
    let tmp = TempDir::new().unwrap();
    init_git_project(tmp.path());
    let info = GitInfo::new(tmp.path());

    let revision = info.revision();
    assert!(revision.len() >= 7, "short sha expected, got {revision:?}");
    assert!(revision.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(info.branch(), "topic");
}

#[test]
fn outside_a_repository_values_are_empty() {
    let tmp = TempDir::new().unwrap();
    let info = GitInfo::new(tmp.path());

    assert_eq!(info.revision(), "");
    assert_eq!(info.branch(), "");
}

#[test]
fn sha_format_fails_without_repository() {
    let tmp = TempDir::new().unwrap();
    let info = GitInfo::new(tmp.path());

    assert!(TagValues::for_format(TagFormat::Sha, &info).is_err());
    assert!(TagValues::for_format(TagFormat::Default, &info).is_ok());
}

#[test]
fn branch_format_resolves_from_repository() {
    let tmp = TempDir::new().unwrap();
    init_git_project(tmp.path());
    let info = GitInfo::new(tmp.path());

    let values = TagValues::for_format(TagFormat::BranchAndSha, &info).unwrap();
    let image = values.resolve(TagFormat::BranchAndSha, "acme/hello:1.0");

    assert!(image.starts_with("acme/hello:1.0-topic-"));
    assert!(image.ends_with(&values.revision));
}
