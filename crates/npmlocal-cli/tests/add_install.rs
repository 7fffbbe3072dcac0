//! Integration tests for `npmlocal add` and `npmlocal install`.

use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-q", "-p", "npmlocal-cli", "--bin", "npmlocal", "--"]);
    cmd
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

/// `app` consumes `lib`, whose entry point lives in `dist/`.
fn create_workspace(root: &Path) {
    write(
        &root.join("app/package.json"),
        "{\n  \"name\": \"app\",\n  \"version\": \"0.1.0\"\n}\n",
    );
    write(
        &root.join("lib/package.json"),
        r#"{"name": "lib", "version": "1.0.0", "main": "dist/index.js"}"#,
    );
    write(&root.join("lib/dist/index.js"), "module.exports = 42;\n");
}

#[test]
fn test_add_copy_json() {
    let dir = tempdir().unwrap();
    create_workspace(dir.path());

    let output = cargo_bin()
        .args(["--json", "add", "copy:lib", "-p", "app", "--cwd"])
        .arg(dir.path())
        .output()
        .expect("Failed to run npmlocal add");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "add failed: {stdout}");

    let json: Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|_| panic!("stdout should be valid JSON: {stdout}"));
    assert_eq!(json["ok"], true);
    assert_eq!(json["installed"], 1);
    assert_eq!(json["dependencies"][0]["name"], "lib");
    assert_eq!(json["dependencies"][0]["status"], "installed");
    assert_eq!(json["dependencies"][0]["mode"], "copy");

    assert_eq!(
        fs::read_to_string(dir.path().join("app/node_modules/lib/dist/index.js")).unwrap(),
        "module.exports = 42;\n"
    );
    let app = read_json(&dir.path().join("app/package.json"));
    assert!(app["local"]["dependencies"]["lib"]
        .as_str()
        .unwrap()
        .starts_with("copy:"));
    let lib = read_json(&dir.path().join("lib/package.json"));
    assert!(lib["local"]["usedBy"]["app"].is_string());
}

#[test]
fn test_add_twice_skips() {
    let dir = tempdir().unwrap();
    create_workspace(dir.path());

    for _ in 0..2 {
        let status = cargo_bin()
            .args(["add", "copy:lib", "-p", "app", "--cwd"])
            .arg(dir.path())
            .status()
            .expect("Failed to run npmlocal add");
        assert!(status.success());
    }

    let output = cargo_bin()
        .args(["add", "copy:lib", "-p", "app", "--cwd"])
        .arg(dir.path())
        .output()
        .expect("Failed to run npmlocal add");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("already installed with the latest version 1.0.0"),
        "unexpected output: {stdout}"
    );
}

#[test]
fn test_install_from_package_json() {
    let dir = tempdir().unwrap();
    create_workspace(dir.path());

    let status = cargo_bin()
        .args(["add", "copy:lib", "-p", "app", "--cwd"])
        .arg(dir.path())
        .status()
        .expect("Failed to run npmlocal add");
    assert!(status.success());
    fs::remove_dir_all(dir.path().join("app/node_modules")).unwrap();

    let output = cargo_bin()
        .args(["--json", "install", "-p", "app", "--cwd"])
        .arg(dir.path())
        .output()
        .expect("Failed to run npmlocal install");
    assert!(output.status.success());

    let json: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["installed"], 1);
    assert!(dir.path().join("app/node_modules/lib/dist/index.js").exists());
}

#[test]
fn test_skipped_dependency_exits_zero() {
    let dir = tempdir().unwrap();
    create_workspace(dir.path());

    let output = cargo_bin()
        .args(["--json", "add", "missing", "-p", "app", "--cwd"])
        .arg(dir.path())
        .output()
        .expect("Failed to run npmlocal add");

    assert!(output.status.success());
    let json: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["skipped"], 1);
    assert_eq!(json["dependencies"][0]["status"], "skipped");
}

#[test]
fn test_missing_project_json_error() {
    let dir = tempdir().unwrap();

    let output = cargo_bin()
        .args(["--json", "add", "lib", "--cwd"])
        .arg(dir.path())
        .output()
        .expect("Failed to run npmlocal add");

    assert!(!output.status.success());
    let json: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"]["code"], "NO_PACKAGE_JSON");
}

#[test]
fn test_bad_spec_is_rejected() {
    let dir = tempdir().unwrap();
    create_workspace(dir.path());

    let output = cargo_bin()
        .args(["--json", "add", "move:lib", "-p", "app", "--cwd"])
        .arg(dir.path())
        .output()
        .expect("Failed to run npmlocal add");

    assert!(!output.status.success());
    let json: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["error"]["code"], "BAD_ARGUMENT");
    assert!(!dir.path().join("app/node_modules").exists());
}

#[test]
fn test_watch_and_json_conflict() {
    let dir = tempdir().unwrap();
    create_workspace(dir.path());

    let output = cargo_bin()
        .args(["--json", "add", "lib", "-w", "-p", "app", "--cwd"])
        .arg(dir.path())
        .output()
        .expect("Failed to run npmlocal add");

    assert_eq!(output.status.code(), Some(2));
}
