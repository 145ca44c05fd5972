use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write_set(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("set.json");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_resolve_simple_set() {
    let dir = TempDir::new().unwrap();
    let set = write_set(
        &dir,
        r#"[
            {"name": "util.text", "version": "1.2.0", "exports": ["util.text@1.2"]},
            {"name": "app", "version": "1.0.0", "imports": ["util.text@[1.0,2.0)"]}
        ]"#,
    );

    let mut cmd = Command::cargo_bin("modweave").unwrap();
    cmd.arg("--modules")
        .arg(&set)
        .assert()
        .success()
        .stdout(predicate::str::contains("resolved 2 of 2 modules"))
        .stdout(predicate::str::contains("[ok] app@1.0.0"));
}

#[test]
fn test_missing_capability_is_diagnosed() {
    let dir = TempDir::new().unwrap();
    let set = write_set(
        &dir,
        r#"[{"name": "app", "version": "1.0.0", "imports": ["does.not.exist"]}]"#,
    );

    let mut cmd = Command::cargo_bin("modweave").unwrap();
    cmd.arg("--modules")
        .arg(&set)
        .assert()
        .success()
        .stdout(predicate::str::contains("resolved 0 of 1 modules"))
        .stdout(predicate::str::contains("no capability matches"));
}

#[test]
fn test_mandatory_trigger_failure_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let set = write_set(
        &dir,
        r#"[{"name": "app", "version": "1.0.0", "imports": ["does.not.exist"]}]"#,
    );

    let mut cmd = Command::cargo_bin("modweave").unwrap();
    cmd.arg("--modules")
        .arg(&set)
        .arg("--trigger")
        .arg("app")
        .arg("--mandatory-triggers")
        .assert()
        .failure()
        .stdout(predicate::str::contains("resolution failed"));
}

#[test]
fn test_json_output() {
    let dir = TempDir::new().unwrap();
    let set = write_set(
        &dir,
        r#"[
            {"name": "lib", "version": "2.0.0", "exports": ["lib.api@2.0"]},
            {"name": "app", "version": "1.0.0", "imports": ["lib.api"]}
        ]"#,
    );

    let mut cmd = Command::cargo_bin("modweave").unwrap();
    let output = cmd
        .arg("--modules")
        .arg(&set)
        .arg("--json")
        .assert()
        .success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();

    let modules = json["modules"].as_array().unwrap();
    assert_eq!(modules.len(), 2);
    assert!(modules.iter().all(|m| m["resolved"] == true));
    assert_eq!(json["failure"], serde_json::Value::Null);
}

#[test]
fn test_bad_input_is_an_error() {
    let dir = TempDir::new().unwrap();
    let set = write_set(&dir, "not json at all");

    let mut cmd = Command::cargo_bin("modweave").unwrap();
    cmd.arg("--modules").arg(&set).assert().failure();
}
