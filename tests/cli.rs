//! Command line surface tests.

use assert_cmd::Command;
use predicates::prelude::*;

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("kodegen_bundler_package").unwrap();
    cmd.env_remove("RELEASE_VERSION");
    cmd
}

#[test]
fn test_help_describes_entry_points() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("secondary"))
        .stdout(predicate::str::contains("--skip-release"));
}

#[test]
fn test_package_is_required() {
    bin()
        .assert()
        .failure()
        .stderr(predicate::str::contains("--package"));
}

#[test]
fn test_zero_jobs_is_rejected() {
    bin()
        .args(["--package", "material", "--jobs", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--jobs must be at least 1"));
}

#[test]
fn test_invalid_release_version_is_rejected() {
    bin()
        .args(["-p", "material", "--release-version", "two"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid release version"));
}

#[test]
fn test_missing_project_fails() {
    let dir = tempfile::tempdir().unwrap();
    bin()
        .args(["-p", "material", "--project-root"])
        .arg(dir.path().join("missing"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}
