//! CLI integration tests using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const BANK: &str = "../../item-banks/cognitive-core.toml";

fn adaptest() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("adaptest").unwrap();
    cmd.env_remove("ADAPTEST_SCORE_MIN")
        .env_remove("ADAPTEST_SCORE_MAX")
        .env_remove("ADAPTEST_SEED");
    cmd
}

#[test]
fn validate_sample_bank() {
    adaptest()
        .arg("validate")
        .arg("--bank")
        .arg(BANK)
        .assert()
        .success()
        .stdout(predicate::str::contains("Cognitive Core (24 items, normal-ogive metric)"))
        .stdout(predicate::str::contains("logical_reasoning: 6"))
        .stdout(predicate::str::contains("All item banks valid"));
}

#[test]
fn validate_directory() {
    adaptest()
        .arg("validate")
        .arg("--bank")
        .arg("../../item-banks")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cognitive Core"));
}

#[test]
fn validate_rejects_bad_answer_key() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(
        &path,
        r#"
[bank]
id = "bad"
name = "Bad"

[[items]]
id = "q1"
domain = "verbal"
difficulty = 0.0
discrimination = 1.0
options = ["a", "b"]
correct_answer = "c"
"#,
    )
    .unwrap();

    adaptest()
        .arg("validate")
        .arg("--bank")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn validate_nonexistent_file() {
    adaptest()
        .arg("validate")
        .arg("--bank")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn score_midpoint() {
    let dir = TempDir::new().unwrap();
    adaptest()
        .current_dir(dir.path())
        .arg("score")
        .arg("--theta")
        .arg("0")
        .assert()
        .success()
        .stdout(predicate::str::contains("Scaled score: 575"))
        .stdout(predicate::str::contains("Percentile: 50"))
        .stdout(predicate::str::contains("Placement: immersion"));
}

#[test]
fn score_negative_theta_with_band() {
    let dir = TempDir::new().unwrap();
    adaptest()
        .current_dir(dir.path())
        .arg("score")
        .arg("--theta")
        .arg("-1.5")
        .arg("--se")
        .arg("0.3")
        .assert()
        .success()
        .stdout(predicate::str::contains("95% band"))
        .stdout(predicate::str::contains("Placement: foundation"));
}

#[test]
fn score_uses_config_scale() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("scale.toml");
    std::fs::write(&config, "[scale]\nscore_min = 0\nscore_max = 800\n").unwrap();

    adaptest()
        .arg("score")
        .arg("--theta")
        .arg("0")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Scaled score: 400"));
}

#[test]
fn score_rejects_env_override_garbage() {
    let dir = TempDir::new().unwrap();
    adaptest()
        .current_dir(dir.path())
        .env("ADAPTEST_SCORE_MIN", "low")
        .arg("score")
        .arg("--theta")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ADAPTEST_SCORE_MIN"));
}

#[test]
fn simulate_writes_report() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("sim.json");

    adaptest()
        .current_dir(dir.path())
        .arg("simulate")
        .arg("--bank")
        .arg(std::fs::canonicalize(BANK).unwrap())
        .arg("--sessions")
        .arg("40")
        .arg("--min-items")
        .arg("4")
        .arg("--max-items")
        .arg("10")
        .arg("--seed")
        .arg("7")
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Mean items"))
        .stdout(predicate::str::contains("Stop reason"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(json["summary"]["sessions"], 40);
    assert_eq!(json["records"].as_array().unwrap().len(), 40);
    assert_eq!(json["bank_id"], "cognitive-core");
}

#[test]
fn simulate_rejects_invalid_session_config() {
    let dir = TempDir::new().unwrap();
    adaptest()
        .current_dir(dir.path())
        .arg("simulate")
        .arg("--bank")
        .arg(std::fs::canonicalize(BANK).unwrap())
        .arg("--min-items")
        .arg("12")
        .arg("--max-items")
        .arg("6")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid session configuration"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    adaptest()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created adaptest.toml"))
        .stdout(predicate::str::contains("Created item-banks/example.toml"));

    assert!(dir.path().join("adaptest.toml").exists());
    assert!(dir.path().join("item-banks/example.toml").exists());

    // The generated files are usable by the other commands.
    adaptest()
        .current_dir(dir.path())
        .arg("validate")
        .arg("--bank")
        .arg("item-banks/example.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("Example Bank (8 items"));

    adaptest()
        .current_dir(dir.path())
        .arg("score")
        .arg("--theta")
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("Scaled score: 644"));
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    adaptest()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();

    adaptest()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn help_output() {
    adaptest()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("IRT-based adaptive testing engine"));
}

#[test]
fn version_output() {
    adaptest()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("adaptest"));
}
