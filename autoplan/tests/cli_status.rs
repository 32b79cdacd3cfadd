//! CLI tests: spawn the autoplan binary and check exit codes and persisted state.

use std::fs;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde_json::{Value, json};

use autoplan::exit_codes;
use autoplan::io::config::Settings;
use autoplan::io::run_state::RunStore;
use autoplan::test_support::write_sample_records;

fn autoplan(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_autoplan"))
        .current_dir(dir)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .expect("spawn autoplan")
}

fn store(dir: &Path) -> RunStore {
    RunStore::new(dir.join(Settings::default().state_dir))
}

fn write_plan(dir: &Path, plan: Value) {
    fs::write(dir.join("plan.json"), plan.to_string()).expect("write plan");
}

#[test]
fn status_of_unknown_run_exits_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = autoplan(temp.path(), &["status", "--run-id", "run-missing"]);
    assert_eq!(output.status.code(), Some(exit_codes::NOT_FOUND));
}

#[test]
fn run_with_plan_file_then_status() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_plan(
        temp.path(),
        json!({"plan": {"summary": "s", "steps": [
            {"name": "x", "tool": "echo", "parameters": {"v": 1}}
        ]}}),
    );

    let output = autoplan(
        temp.path(),
        &["run", "--task", "t", "--plan-file", "plan.json", "--run-id", "run-cli", "--yes"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let outcome: Value = serde_json::from_slice(&output.stdout).expect("outcome json");
    assert_eq!(outcome["run_id"], json!("run-cli"));
    assert_eq!(outcome["steps"][0]["payload"], json!({"v": 1}));

    let status = autoplan(temp.path(), &["status", "--run-id", "run-cli"]);
    assert_eq!(status.status.code(), Some(exit_codes::OK));
    let state: Value = serde_json::from_slice(&status.stdout).expect("state json");
    assert_eq!(state["steps"].as_array().map(Vec::len), Some(1));
}

#[test]
fn failing_step_exits_step_failed_and_resume_retries() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_plan(
        temp.path(),
        json!({"plan": {"summary": "s", "steps": [
            {"name": "ok", "tool": "echo"},
            {"name": "load", "tool": "load_records", "parameters": {"path": "later.json"}}
        ]}}),
    );

    let output = autoplan(
        temp.path(),
        &["run", "--task", "t", "--plan-file", "plan.json", "--run-id", "run-f", "--yes"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::STEP_FAILED));

    fs::rename(write_sample_records(temp.path()), temp.path().join("later.json"))
        .expect("provide dataset");
    let resumed = autoplan(temp.path(), &["resume", "--run-id", "run-f"]);
    assert_eq!(resumed.status.code(), Some(exit_codes::OK));

    let state = store(temp.path()).load("run-f").expect("load");
    let names: Vec<&str> = state.steps.iter().map(|r| r.step_name.as_str()).collect();
    assert_eq!(names, vec!["ok", "load", "load"]);
}

#[test]
fn locked_run_exits_locked_until_holder_releases() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_plan(
        temp.path(),
        json!({"plan": {"summary": "s", "steps": [{"name": "x", "tool": "echo"}]}}),
    );
    let output = autoplan(
        temp.path(),
        &["run", "--task", "t", "--plan-file", "plan.json", "--run-id", "run-l", "--yes"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let held = store(temp.path()).lock("run-l").expect("lock");
    let locked = autoplan(temp.path(), &["resume", "--run-id", "run-l"]);
    assert_eq!(locked.status.code(), Some(exit_codes::LOCKED));

    drop(held);
    let resumed = autoplan(temp.path(), &["resume", "--run-id", "run-l"]);
    assert_eq!(resumed.status.code(), Some(exit_codes::OK));
}

#[test]
fn declined_plan_exits_aborted() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = autoplan(temp.path(), &["run", "--task", "t"]);
    assert_eq!(output.status.code(), Some(exit_codes::ABORTED));
    assert!(store(temp.path()).list().expect("list").is_empty());
}

#[test]
fn invalid_plan_file_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_plan(temp.path(), json!({"plan": {"summary": "s", "steps": [{"name": "x"}]}}));
    let output = autoplan(temp.path(), &["plan", "--task", "t", "--plan-file", "plan.json"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}
