#![allow(clippy::single_match_else)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use ulid::Ulid;

fn demos_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos")
}

fn temp_workspace(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("axon-cli-{name}-{}", Ulid::new()));
    if let Err(err) = fs::create_dir_all(&dir) {
        panic!("failed to create temp workspace {}: {err}", dir.display());
    }
    dir
}

fn axon(args: &[&str]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_axon"));
    command.args(args).env("RUST_LOG", "off");
    match command.output() {
        Ok(output) => output,
        Err(err) => panic!("failed to run axon {args:?}: {err}"),
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

fn stdout_lines(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| match serde_json::from_str::<Value>(line) {
            Ok(value) => value,
            Err(err) => panic!("stdout line is not JSON ({err}): {line}"),
        })
        .collect()
}

fn demo_run(workspace: &Path, extra: &[&str]) -> Output {
    let csv = path_arg(&demos_dir().join("schema.csv"));
    let script = path_arg(&demos_dir().join("replies.yaml"));
    let output_dir = path_arg(&workspace.join("out"));
    let memory = path_arg(&workspace.join("memory.json"));
    let mut args = vec![
        "run",
        "--schema-csv",
        csv.as_str(),
        "--script",
        script.as_str(),
        "--output-dir",
        output_dir.as_str(),
        "--memory",
        memory.as_str(),
    ];
    args.extend_from_slice(extra);
    axon(&args)
}

#[test]
fn help_lists_subcommands() {
    let output = axon(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for subcommand in ["run", "history", "context"] {
        assert!(stdout.contains(subcommand), "help is missing `{subcommand}`");
    }
}

#[test]
fn scripted_run_writes_all_artifacts_and_one_history_record() {
    let workspace = temp_workspace("run");
    let output = demo_run(&workspace, &[]);
    assert!(
        output.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 1);
    let summary = &lines[0];
    assert_eq!(summary["final_state"], "done");
    assert_eq!(summary["persisted"], true);
    assert_eq!(summary["artifacts"].as_array().map(Vec::len), Some(4));

    let out = workspace.join("out");
    for name in [
        "migration_plan.md",
        "schema.sql",
        "validation_queries.sql",
        "optimization_suggestions.sql",
    ] {
        assert!(out.join(name).is_file(), "missing artifact {name}");
    }
    let ddl = fs::read_to_string(out.join("schema.sql")).unwrap_or_default();
    assert!(ddl.contains("CREATE TABLE orders"));

    let memory = path_arg(&workspace.join("memory.json"));
    let history = axon(&["history", "--memory", memory.as_str()]);
    assert!(history.status.success());
    let records = stdout_lines(&history);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["run_id"], summary["run_id"]);
    assert_eq!(
        records[0]["source_analysis"]["relationships"][0]["from_table"],
        "orders"
    );
}

#[test]
fn empty_schema_aborts_with_nonzero_exit_and_no_artifacts() {
    let workspace = temp_workspace("empty");
    let csv = workspace.join("empty.csv");
    if let Err(err) = fs::write(&csv, "table_name,column_name,data_type\n") {
        panic!("failed to write empty csv: {err}");
    }
    let csv = path_arg(&csv);
    let output_dir = path_arg(&workspace.join("out"));
    let memory = path_arg(&workspace.join("memory.json"));
    let output = axon(&[
        "run",
        "--schema-csv",
        csv.as_str(),
        "--output-dir",
        output_dir.as_str(),
        "--memory",
        memory.as_str(),
    ]);

    assert!(!output.status.success());
    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["final_state"], "aborted");
    assert!(!workspace.join("out").exists());

    let history = axon(&["history", "--memory", memory.as_str()]);
    assert!(stdout_lines(&history).is_empty());
}

#[test]
fn mock_model_output_is_not_an_analysis_and_aborts() {
    let workspace = temp_workspace("mock");
    let output_dir = path_arg(&workspace.join("out"));
    let memory = path_arg(&workspace.join("memory.json"));
    let output = axon(&[
        "run",
        "--output-dir",
        output_dir.as_str(),
        "--memory",
        memory.as_str(),
    ]);

    assert!(!output.status.success());
    let lines = stdout_lines(&output);
    assert_eq!(lines[0]["final_state"], "aborted");
    let reason = lines[0]["abort_reason"].as_str().unwrap_or_default();
    assert!(reason.contains("Failed to parse JSON"), "unexpected reason {reason}");
}

#[test]
fn context_command_reflects_history() {
    let workspace = temp_workspace("context");
    let memory = path_arg(&workspace.join("memory.json"));

    let empty = axon(&["context", "--memory", memory.as_str()]);
    assert!(empty.status.success());
    assert_eq!(
        String::from_utf8_lossy(&empty.stdout).trim(),
        "No previous runs available for context."
    );

    let first = demo_run(&workspace, &[]);
    let second = demo_run(&workspace, &["--context", "full"]);
    assert!(first.status.success() && second.status.success());
    let first_id = stdout_lines(&first)[0]["run_id"].as_str().unwrap_or_default().to_string();
    let second_id = stdout_lines(&second)[0]["run_id"].as_str().unwrap_or_default().to_string();

    let latest = axon(&["context", "--memory", memory.as_str()]);
    let latest = String::from_utf8_lossy(&latest.stdout).to_string();
    assert!(latest.contains(&second_id));
    assert!(!latest.contains(&first_id));

    let full = axon(&["context", "--memory", memory.as_str(), "--mode", "full"]);
    let full = String::from_utf8_lossy(&full.stdout).to_string();
    assert!(full.contains(&first_id) && full.contains(&second_id));
}

#[test]
fn events_flag_streams_state_transitions() {
    let workspace = temp_workspace("events");
    let output = demo_run(&workspace, &["--events"]);
    assert!(output.status.success());

    let lines = stdout_lines(&output);
    let entered: Vec<&str> = lines
        .iter()
        .filter(|line| line["status"] == "entered")
        .filter_map(|line| line["state"].as_str())
        .collect();
    assert_eq!(entered.first().copied(), Some("idle"));
    assert_eq!(entered.last().copied(), Some("done"));
    assert!(entered.contains(&"persisting"));

    let summary = lines.last().cloned().unwrap_or_default();
    assert_eq!(summary["final_state"], "done");
}

#[test]
fn config_file_and_flag_validation() {
    let workspace = temp_workspace("config");
    let config = workspace.join("axon.yaml");
    let yaml = format!(
        "output_dir: {}\nartifacts:\n  transform: ddl.sql\n",
        workspace.join("from-config").display()
    );
    if let Err(err) = fs::write(&config, yaml) {
        panic!("failed to write config: {err}");
    }
    let config = path_arg(&config);
    let csv = path_arg(&demos_dir().join("schema.csv"));
    let script = path_arg(&demos_dir().join("replies.yaml"));
    let output = axon(&[
        "run",
        "--config",
        config.as_str(),
        "--schema-csv",
        csv.as_str(),
        "--script",
        script.as_str(),
    ]);
    assert!(output.status.success());
    assert!(workspace.join("from-config").join("ddl.sql").is_file());
    assert!(workspace.join("from-config").join("memory.json").is_file());

    let bad = demo_run(&workspace, &["--context", "everything"]);
    assert!(!bad.status.success());
    assert!(String::from_utf8_lossy(&bad.stderr).contains("unsupported context mode"));
}

#[test]
fn log_file_receives_the_same_lines_as_stderr() {
    let workspace = temp_workspace("log-file");
    let log_file = workspace.join("axon.log");
    let csv = path_arg(&demos_dir().join("schema.csv"));
    let script = path_arg(&demos_dir().join("replies.yaml"));
    let output_dir = path_arg(&workspace.join("out"));
    let memory = path_arg(&workspace.join("memory.json"));
    let log_arg = path_arg(&log_file);

    let output = match Command::new(env!("CARGO_BIN_EXE_axon"))
        .args([
            "--log-file",
            log_arg.as_str(),
            "run",
            "--schema-csv",
            csv.as_str(),
            "--script",
            script.as_str(),
            "--output-dir",
            output_dir.as_str(),
            "--memory",
            memory.as_str(),
        ])
        .env_remove("RUST_LOG")
        .output()
    {
        Ok(output) => output,
        Err(err) => panic!("failed to run axon: {err}"),
    };
    assert!(output.status.success());

    let logged = fs::read_to_string(&log_file).unwrap_or_default();
    assert!(logged.contains("pipeline run started"), "log file: {logged}");
    assert!(logged.contains("saved run to memory"));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("pipeline run started"), "stderr: {stderr}");

    // stdout stays machine-readable.
    assert_eq!(stdout_lines(&output).len(), 1);
}
