#![cfg(unix)]

mod common;

use common::Project;
use predicates::prelude::*;
use serde_json::Value;
use std::path::PathBuf;

fn stdout_json(output: std::process::Output) -> Value {
    assert!(output.status.success(), "mdk failed: {}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

fn create(project: &Project, name: &str) -> Value {
    let output = project
        .mdk()
        .args(["--json", "create", name])
        .output()
        .expect("run mdk create");
    stdout_json(output)
}

#[test]
fn test_help_lists_commands() {
    let project = Project::new();
    project
        .mdk()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run-to"))
        .stdout(predicate::str::contains("serve"));
}

#[test]
fn test_create_then_list() {
    let project = Project::new();
    let workflow = create(&project, "lysozyme");

    assert_eq!(workflow["name"], "lysozyme");
    let root_dir = PathBuf::from(workflow["root_dir"].as_str().expect("root_dir"));
    let workflows_dir = project.workflows_dir().canonicalize().expect("workflows dir");
    assert!(root_dir.starts_with(workflows_dir));
    assert!(root_dir.join(".workflow.json").is_file());

    let listed = stdout_json(
        project
            .mdk()
            .args(["--json", "list"])
            .output()
            .expect("run mdk list"),
    );
    let listed = listed.as_array().expect("array");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], workflow["id"]);
}

#[test]
fn test_show_accepts_name_or_id() {
    let project = Project::new();
    let workflow = create(&project, "lysozyme");
    let id = workflow["id"].as_str().expect("id").to_string();

    project
        .mdk()
        .args(["show", "lysozyme"])
        .assert()
        .success()
        .stdout(predicate::str::contains(id.as_str()));

    project.mdk().args(["show", id.as_str()]).assert().success();
}

#[test]
fn test_unknown_workflow_fails() {
    let project = Project::new();
    project
        .mdk()
        .args(["show", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope"));
}

#[test]
fn test_rename_requires_a_change() {
    let project = Project::new();
    create(&project, "lysozyme");

    project
        .mdk()
        .args(["rename", "lysozyme"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to change"));

    project
        .mdk()
        .args(["rename", "lysozyme", "--name", "hen-lysozyme"])
        .assert()
        .success();
    project.mdk().args(["show", "hen-lysozyme"]).assert().success();
}

#[test]
fn test_advance_out_of_order_is_refused() {
    let project = Project::new();
    create(&project, "lysozyme");

    project
        .mdk()
        .args(["advance", "lysozyme", "equilibrate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("minimize"));
}

#[test]
fn test_run_to_produce_records_every_stage() {
    let project = Project::new();
    create(&project, "lysozyme");

    let records = stdout_json(
        project
            .mdk()
            .args(["--json", "run-to", "lysozyme", "produce", "--set", "production.nsteps=100"])
            .output()
            .expect("run mdk run-to"),
    );
    let stages: Vec<&str> = records
        .as_array()
        .expect("array")
        .iter()
        .map(|record| record["stage_name"].as_str().expect("stage_name"))
        .collect();
    assert_eq!(stages, ["prepare", "minimize", "equilibrate", "produce"]);

    let workflow = stdout_json(
        project
            .mdk()
            .args(["--json", "show", "lysozyme"])
            .output()
            .expect("run mdk show"),
    );
    assert_eq!(workflow["stage_status"]["produce"]["status"], "SUCCEEDED");

    project
        .mdk()
        .args(["logs", "lysozyme", "--stage", "minimize"])
        .assert()
        .success()
        .stdout(predicate::str::contains("$ "));

    project
        .mdk()
        .args(["analyze", "lysozyme", "rmsd"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mean"));
}

#[test]
fn test_artifacts_export_and_import() {
    let project = Project::new();
    create(&project, "lysozyme");
    project
        .mdk()
        .args(["run-to", "lysozyme", "equilibrate"])
        .assert()
        .success();

    let listing = stdout_json(
        project
            .mdk()
            .args(["--json", "artifacts", "lysozyme", "--stage", "equilibrate", "--checkpoints"])
            .output()
            .expect("run mdk artifacts"),
    );
    let files: Vec<&str> = listing[0]["files"]
        .as_array()
        .expect("files")
        .iter()
        .map(|file| file["path"].as_str().expect("path"))
        .collect();
    assert_eq!(files, ["npt/npt.cpt", "nvt/nvt.cpt"]);

    let export_file = project.dir.path().join("lysozyme.json");
    let export_arg = export_file.display().to_string();
    project
        .mdk()
        .args(["export", "lysozyme", export_arg.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported"));
    assert!(export_file.is_file());

    let imported = stdout_json(
        project
            .mdk()
            .args(["--json", "import", export_arg.as_str()])
            .output()
            .expect("run mdk import"),
    );
    assert_eq!(imported["name"], "lysozyme");
    assert_eq!(imported["stage_status"]["prepare"]["status"], "NOT_STARTED");
    assert_eq!(imported["params"]["system"]["structure_file"], "protein.pdb");
}

#[test]
fn test_params_shows_override() {
    let project = Project::new();
    create(&project, "lysozyme");

    let preview = stdout_json(
        project
            .mdk()
            .args(["--json", "params", "lysozyme", "minimize", "--set", "minimization.nsteps=1234"])
            .output()
            .expect("run mdk params"),
    );
    assert_eq!(preview["stage"], "minimize");
    assert_eq!(preview["effective"]["minimization"]["nsteps"], 1234);
    assert_eq!(preview["effective"]["system"]["structure_file"], "protein.pdb");
}

#[test]
fn test_session_prints_script() {
    let project = Project::new();
    let workflow = create(&project, "lysozyme");
    let root_dir = PathBuf::from(workflow["root_dir"].as_str().expect("root_dir"));
    std::fs::write(root_dir.join("conf.gro"), "fake\n").expect("write structure");

    project
        .mdk()
        .args(["session", "lysozyme", "conf.gro"])
        .assert()
        .success()
        .stdout(predicate::str::contains("conf.gro"));
}

#[test]
fn test_templates_lists_default() {
    let project = Project::new();
    project
        .mdk()
        .arg("templates")
        .assert()
        .success()
        .stdout(predicate::str::contains("default"));
}

#[test]
fn test_delete_keeps_files_unless_purged() {
    let project = Project::new();
    let kept = create(&project, "kept");
    let purged = create(&project, "purged");

    project.mdk().args(["delete", "kept"]).assert().success();
    project.mdk().args(["delete", "purged", "--purge"]).assert().success();

    assert!(PathBuf::from(kept["root_dir"].as_str().expect("root_dir")).exists());
    assert!(!PathBuf::from(purged["root_dir"].as_str().expect("root_dir")).exists());

    let listed = stdout_json(
        project
            .mdk()
            .args(["--json", "list"])
            .output()
            .expect("run mdk list"),
    );
    assert_eq!(listed.as_array().map(Vec::len), Some(0));
}

#[test]
fn test_serve_answers_one_event_per_op() {
    let project = Project::new();
    let input = concat!(
        r#"{"type":"createWorkflow","payload":{"name":"served"}}"#,
        "\n",
        "not json\n",
        r#"{"type":"shutdown"}"#,
        "\n",
    );

    let output = project
        .mdk()
        .arg("serve")
        .write_stdin(input)
        .output()
        .expect("run mdk serve");
    assert!(output.status.success());

    let events: Vec<Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("event is JSON"))
        .collect();
    let mut kinds: Vec<&str> = events
        .iter()
        .map(|event| event["type"].as_str().expect("type"))
        .collect();
    kinds.sort_unstable();
    assert_eq!(kinds, ["error", "workflowCreated"]);

    let error = events
        .iter()
        .find(|event| event["type"] == "error")
        .expect("error event");
    assert_eq!(error["payload"]["kind"], "PARSE_ERROR");
}
