//! CLI smoke tests.

use assert_cmd::Command;
use predicates::prelude::*;

fn husk(root: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("husk").unwrap();
    cmd.env("HUSK_ROOT", root)
        .env("HUSK_RUNTIME_DIR", root.join("run"))
        .env_remove("HUSK_EXEC_PID")
        .env_remove("HUSK_EXEC_CMD");
    cmd
}

#[test]
fn help_lists_commands() {
    let tmp = tempfile::tempdir().unwrap();
    husk(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("network"))
        .stdout(predicate::str::contains("init").not());
}

#[test]
fn stop_unknown_container_fails() {
    let tmp = tempfile::tempdir().unwrap();
    husk(tmp.path())
        .args(["stop", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn exec_unknown_container_fails() {
    let tmp = tempfile::tempdir().unwrap();
    husk(tmp.path())
        .args(["exec", "ghost", "ls"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn exec_with_empty_target_falls_through_to_guard() {
    let tmp = tempfile::tempdir().unwrap();
    // An empty pid means no re-entry, but the guard still sees the variable.
    husk(tmp.path())
        .env("HUSK_EXEC_PID", "")
        .args(["exec", "ghost", "ls"])
        .assert()
        .success();
}

#[test]
fn ps_on_empty_root() {
    let tmp = tempfile::tempdir().unwrap();
    husk(tmp.path())
        .arg("ps")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("ID\tNAME"));
}

#[test]
fn remove_unknown_network_fails() {
    let tmp = tempfile::tempdir().unwrap();
    husk(tmp.path())
        .args(["network", "rm", "br9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("br9"));
}

#[test]
fn network_ls_on_empty_root() {
    let tmp = tempfile::tempdir().unwrap();
    husk(tmp.path())
        .args(["network", "ls"])
        .assert()
        .success()
        .stdout(predicate::str::contains("NAME"));
}

#[test]
fn ps_reads_records_from_runtime_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = tmp.path().join("elsewhere");
    let record = runtime.join("containers").join("web");
    std::fs::create_dir_all(&record).unwrap();
    std::fs::write(
        record.join("config.json"),
        r#"{"pid":"","id":"1234567890","name":"web","command":"top","createTime":"2024-01-01 00:00:00","status":"stopped","volume":"","portMapping":[],"network":"","ipAddress":""}"#,
    )
    .unwrap();

    husk(tmp.path())
        .env("HUSK_RUNTIME_DIR", &runtime)
        .arg("ps")
        .assert()
        .success()
        .stdout(predicate::str::contains("web"));
}
