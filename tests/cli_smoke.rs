//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;

#[test]
fn cli_help_lists_the_storage_flags() {
    let mut cmd = cargo_bin_cmd!("stackclone");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(contains("--storage-type"))
        .stdout(contains("--snapshots"));
}

#[test]
fn cli_rejects_a_missing_volume_id() {
    let mut cmd = cargo_bin_cmd!("stackclone");
    cmd.env_remove("RUST_LOG")
        .assert()
        .failure()
        .code(1)
        .stderr(contains("source volume id must be set"));
}

#[test]
fn cli_rejects_unknown_storage_types() {
    let mut cmd = cargo_bin_cmd!("stackclone");
    cmd.args(["-t", "swift", "-v", "vol-1"])
        .assert()
        .failure()
        .stderr(contains("swift"));
}
