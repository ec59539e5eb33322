//! End-to-end tests for the `svn-ops completions` command.

mod common;
use common::prelude::*;

#[test]
fn test_completions_help_lists_shells() {
    let mut cmd = cargo_bin_cmd!("svn-ops");
    cmd.arg("completions")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Generate shell completion scripts"))
        .stdout(predicate::str::contains("bash"))
        .stdout(predicate::str::contains("powershell"));
}

#[test]
fn test_completions_bash_mentions_subcommands() {
    let mut cmd = cargo_bin_cmd!("svn-ops");
    cmd.arg("completions")
        .arg("bash")
        .assert()
        .success()
        .stdout(predicate::str::contains("_svn-ops()"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("--parallel"));
}

#[test]
fn test_completions_fish() {
    let mut cmd = cargo_bin_cmd!("svn-ops");
    cmd.arg("completions")
        .arg("fish")
        .assert()
        .success()
        .stdout(predicate::str::contains("complete -c svn-ops"));
}

#[test]
fn test_completions_rejects_unknown_shell() {
    let mut cmd = cargo_bin_cmd!("svn-ops");
    cmd.arg("completions").arg("tcsh").assert().failure().code(2);
}
