use assert_cmd::Command;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_parse_output_prints_normalized_summary() {
    let temp = TempDir::new().unwrap();
    let log = temp.path().join("run.log");
    fs::write(&log, "==== 3 passed, 1 failed, 2 warnings in 0.50s ====\n").unwrap();

    let output = Command::cargo_bin("syncforge")
        .unwrap()
        .args(["parse-output", "--runner", "pytest", "--exit-code", "1"])
        .arg(&log)
        .output()
        .unwrap();

    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["summary"]["passed"], 3);
    assert_eq!(parsed["summary"]["failed"], 1);
    assert_eq!(parsed["summary"]["warning"], 2);
    assert_eq!(parsed["summary"]["total"], 6);
    assert_eq!(parsed["grade"], 0);
}

#[test]
fn test_missing_log_fails() {
    let temp = TempDir::new().unwrap();
    Command::cargo_bin("syncforge")
        .unwrap()
        .args(["parse-output", "--runner", "unittest"])
        .arg(temp.path().join("absent.log"))
        .assert()
        .failure();
}

#[test]
fn test_mine_rejects_id_with_range() {
    Command::cargo_bin("syncforge")
        .unwrap()
        .args(["mine", "--registry", "repos.json", "--repo-id", "2", "--start", "1"])
        .assert()
        .failure();
}
