//! Restart behaviour: stages left RUNNING by a crashed process.
//!
//! A crash is simulated by marking a stage RUNNING through the handle and
//! then opening a fresh store on the same workspace.

#![cfg(unix)]

mod common;

use common::*;
use mdk_core::pipeline::{AdvanceOptions, PipelineCoordinator};
use mdk_core::workflow::store::INTERRUPTED;
use mdk_core::workflow::WorkflowStore;
use mdk_protocol::{StageName, StageState, StageStatus};
use serde_json::Value;
use std::sync::Arc;

#[tokio::test]
async fn test_interrupted_stage_is_failed_on_restart() {
    let ws = TestWorkspace::new();

    let id = {
        let coordinator = ws.coordinator().await;
        let workflow = coordinator.store().create("crashy", None, None).await.expect("create");
        coordinator
            .run_to(workflow.id, StageName::Minimize, Value::Null)
            .await
            .expect("run_to minimize");

        let handle = coordinator.store().handle(workflow.id).await.expect("handle");
        handle
            .mutate(|wf| {
                wf.stage_status.insert(StageName::Equilibrate, StageState::running(1));
            })
            .await
            .expect("mark running");
        workflow.id
    };

    let store = Arc::new(
        WorkflowStore::open(Arc::clone(&ws.config))
            .await
            .expect("reopen"),
    );
    let workflow = store.get(id).await.expect("get");
    let state = &workflow.stage_status[&StageName::Equilibrate];
    assert_eq!(state.status, StageStatus::Failed);
    assert_eq!(state.detail.as_deref(), Some(INTERRUPTED));
    assert_stage_status(&workflow, StageName::Minimize, StageStatus::Succeeded);

    // The fix was written back, not just applied in memory.
    let again = WorkflowStore::open(Arc::clone(&ws.config)).await.expect("reopen");
    assert_stage_status(&again.get(id).await.expect("get"), StageName::Equilibrate, StageStatus::Failed);

    // The interrupted stage can simply be advanced again.
    let coordinator = PipelineCoordinator::new(Arc::clone(&ws.config), store);
    let record = coordinator
        .advance(id, StageName::Equilibrate, AdvanceOptions::new())
        .await
        .expect("equilibrate after restart");
    assert_eq!(record.status, StageStatus::Succeeded);
    // Attempt 1 was interrupted without a record; its number is not reused.
    assert_eq!(record.attempt, 2);
    assert_eq!(
        record.stdout_path,
        std::path::PathBuf::from("logs/equilibrate-2.stdout.log")
    );
    assert_stage_status(
        &coordinator.store().get(id).await.expect("get"),
        StageName::Equilibrate,
        StageStatus::Succeeded,
    );
}

#[tokio::test]
async fn test_running_stage_with_record_adopts_its_status() {
    let ws = TestWorkspace::new();

    let id = {
        let coordinator = ws.coordinator().await;
        let workflow = coordinator.store().create("late write", None, None).await.expect("create");
        let record = coordinator
            .advance(workflow.id, StageName::Prepare, AdvanceOptions::new())
            .await
            .expect("prepare");

        // The record was written but the final status update was lost.
        let handle = coordinator.store().handle(workflow.id).await.expect("handle");
        handle
            .mutate(|wf| {
                wf.stage_status
                    .insert(StageName::Prepare, StageState::running(record.attempt));
            })
            .await
            .expect("mark running");
        workflow.id
    };

    let store = WorkflowStore::open(Arc::clone(&ws.config)).await.expect("reopen");
    let workflow = store.get(id).await.expect("get");
    assert_stage_status(&workflow, StageName::Prepare, StageStatus::Succeeded);
    assert_eq!(workflow.stage_status[&StageName::Prepare].detail, None);
}

#[tokio::test]
async fn test_acquire_reconciles_stale_running_stage() {
    let ws = TestWorkspace::new();
    let store = ws.store().await;
    let workflow = store.create("stale", None, None).await.expect("create");

    let handle = store.handle(workflow.id).await.expect("handle");
    handle
        .mutate(|wf| {
            wf.stage_status.insert(StageName::Prepare, StageState::running(1));
        })
        .await
        .expect("mark running");

    let guard = store.acquire(workflow.id).await.expect("acquire");
    let snapshot = guard.snapshot().await;
    assert_stage_status(&snapshot, StageName::Prepare, StageStatus::Failed);
    assert!(snapshot.running_stage().is_none());
}

#[tokio::test]
async fn test_retry_after_interruption_uses_fresh_attempt_number() {
    let ws = TestWorkspace::new();
    let coordinator = ws.coordinator().await;
    let workflow = coordinator.store().create("fresh number", None, None).await.expect("create");

    let handle = coordinator.store().handle(workflow.id).await.expect("handle");
    handle
        .mutate(|wf| {
            wf.stage_status.insert(StageName::Prepare, StageState::running(1));
        })
        .await
        .expect("mark running");
    std::fs::create_dir_all(workflow.root_dir.join("logs")).expect("mkdir");
    std::fs::write(
        workflow.root_dir.join("logs/prepare-1.stdout.log"),
        "output of the lost attempt\n",
    )
    .expect("write");

    let record = coordinator
        .advance(workflow.id, StageName::Prepare, AdvanceOptions::new())
        .await
        .expect("prepare");
    assert_eq!(record.attempt, 2);
    assert_eq!(
        record.stdout_path,
        std::path::PathBuf::from("logs/prepare-2.stdout.log")
    );
    let lost = std::fs::read_to_string(workflow.root_dir.join("logs/prepare-1.stdout.log"))
        .expect("read");
    assert_eq!(lost, "output of the lost attempt\n");
}
