// SPDX-License-Identifier: GPL-3.0-only

mod common;

use storage_contracts::RemoteResult;
use storage_planner::error::ExecutorError;
use storage_planner::{ApplyOutcome, EngineError, ExecutorState};
use storage_testing::ScriptedBackend;
use storage_testing::fixtures::{self, DiskBuilder};
use storage_types::{DeviceId, Size};

use common::{context_on, ext4_partition, start};

async fn session_with_one_action(backend: &ScriptedBackend) -> storage_planner::PlanningSession {
    backend.set_devices(DiskBuilder::msdos("sda", Size::from_gib(10)).build());
    let mut session = start(backend).await;
    let context = context_on(&mut session, "sda").await;
    session
        .add_device(ext4_partition(&context, Size::from_gib(2)))
        .await
        .expect("add");
    session
}

#[tokio::test]
async fn commit_reports_progress_and_empties_queue() {
    let backend = ScriptedBackend::new();
    backend.apply_progress(["Creating partition sda1", "Creating ext4 on sda1"]);
    let mut session = session_with_one_action(&backend).await;
    backend.stage_devices(
        DiskBuilder::msdos("sda", Size::from_gib(10))
            .primary("sda1", Size::from_gib(2))
            .format_last(fixtures::filesystem("ext4", None))
            .build(),
    );

    let mut progress = Vec::new();
    let outcome = session
        .apply(|message| progress.push(message.to_string()))
        .await
        .expect("apply");

    let ApplyOutcome::Committed { applied } = outcome else {
        panic!("apply did not commit");
    };
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].description, "add 2 GiB ext4 partition");
    assert_eq!(progress, vec!["Creating partition sda1", "Creating ext4 on sda1"]);
    assert!(!session.has_pending_actions());
    assert_eq!(session.executor_state(), ExecutorState::Committed);
    assert!(session.graph().get(&DeviceId::new("sda1")).is_some());
    assert_eq!(backend.apply_count(), 1);
}

#[tokio::test]
async fn refusal_rolls_back_and_keeps_queue() {
    let backend = ScriptedBackend::new();
    backend.apply_result(RemoteResult::refused("Failed to commit changes to disk."));
    let mut session = session_with_one_action(&backend).await;

    let outcome = session.apply(|_| {}).await.expect("apply");

    assert_eq!(
        outcome,
        ApplyOutcome::RolledBack {
            message: "Failed to commit changes to disk.".to_string()
        }
    );
    assert_eq!(session.pending_actions().len(), 1);
    assert_eq!(session.executor_state(), ExecutorState::RolledBack);
    assert!(!session.is_terminated());

    let retry = session.apply(|_| {}).await.expect("retry");
    assert!(matches!(retry, ApplyOutcome::Committed { .. }));
    assert_eq!(backend.apply_count(), 2);
}

#[tokio::test]
async fn fault_surfaces_exception_and_traceback() {
    let backend = ScriptedBackend::new();
    backend.apply_result(RemoteResult::fault(
        "PartitionException: Unable to allocate requested partition scheme.",
        "Traceback (most recent call last):\n  ...",
    ));
    let mut session = session_with_one_action(&backend).await;

    let err = session.apply(|_| {}).await.expect_err("fault");

    match err {
        EngineError::RemoteFault(fault) => {
            assert!(fault.exception.starts_with("PartitionException"));
            assert!(fault.traceback.starts_with("Traceback"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(session.pending_actions().len(), 1);
    assert!(!session.is_terminated());
}

#[tokio::test]
async fn nothing_to_apply_skips_backend() {
    let backend = ScriptedBackend::new();
    backend.set_devices(DiskBuilder::gpt("sda", Size::from_gib(1)).build());
    let mut session = start(&backend).await;

    assert_eq!(
        session.apply(|_| {}).await,
        Err(EngineError::Executor(ExecutorError::NothingToApply))
    );
    assert_eq!(backend.apply_count(), 0);
    assert_eq!(session.executor_state(), ExecutorState::Idle);
}

#[tokio::test]
async fn lost_connection_during_apply_is_fatal() {
    let backend = ScriptedBackend::new();
    let mut session = session_with_one_action(&backend).await;
    backend.disconnect();

    let err = session.apply(|_| {}).await.expect_err("disconnected");

    assert!(err.is_fatal());
    assert!(session.is_terminated());
}
