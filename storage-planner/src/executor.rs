// SPDX-License-Identifier: GPL-3.0-only

//! Apply coordinator
//!
//! Runs the backend transaction on a worker task and hands progress text to
//! the caller while it runs. The worker is always joined before returning.

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use storage_contracts::{BackendClient, RemoteFailure};
use storage_types::PendingAction;

use crate::error::{EngineError, ExecutorError, Result};
use crate::model::DeviceModel;
use crate::queue::ActionQueue;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutorState {
    #[default]
    Idle,
    Running,
    Committed,
    RolledBack,
}

/// How a finished apply ended, short of a backend fault
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Everything was applied; the queue is empty and the model refreshed
    Committed { applied: Vec<PendingAction> },
    /// The backend refused and reset its side; the queue is kept
    RolledBack { message: String },
}

#[derive(Debug)]
pub struct Executor {
    state: ExecutorState,
    progress_capacity: usize,
}

impl Executor {
    pub fn new(progress_capacity: usize) -> Self {
        Self {
            state: ExecutorState::Idle,
            progress_capacity: progress_capacity.max(1),
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// Apply every queued action as one backend transaction
    ///
    /// A backend fault comes back as [`EngineError::RemoteFault`]; like a
    /// refusal it leaves the queue untouched.
    pub async fn apply<F>(
        &mut self,
        client: &BackendClient,
        queue: &mut ActionQueue,
        model: &mut DeviceModel,
        mut progress: F,
    ) -> Result<ApplyOutcome>
    where
        F: FnMut(&str),
    {
        if self.state == ExecutorState::Running {
            return Err(ExecutorError::AlreadyRunning.into());
        }
        if queue.is_empty() {
            return Err(ExecutorError::NothingToApply.into());
        }

        self.state = ExecutorState::Running;
        info!(actions = queue.len(), "applying queued actions");

        let (tx, mut rx) = mpsc::channel(self.progress_capacity);
        let worker_client = client.clone();
        let worker = tokio::spawn(async move { worker_client.apply_all(tx).await });

        while let Some(message) = rx.recv().await {
            progress(&message);
        }

        let result = match worker.await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                self.state = ExecutorState::RolledBack;
                error!(%err, "apply call failed");
                return Err(err.into());
            }
            Err(err) => {
                self.state = ExecutorState::RolledBack;
                error!(%err, "apply worker did not finish");
                return Err(EngineError::Diverged(format!("apply worker failed: {err}")));
            }
        };

        match result.into_outcome() {
            Ok(_) => {
                self.state = ExecutorState::Committed;
                let applied = queue.drain();
                info!(applied = applied.len(), "apply committed");
                model.refresh(client).await?;
                Ok(ApplyOutcome::Committed { applied })
            }
            Err(RemoteFailure::Refused(message)) => {
                self.state = ExecutorState::RolledBack;
                warn!(%message, "apply rolled back");
                Ok(ApplyOutcome::RolledBack { message })
            }
            Err(RemoteFailure::Fault(fault)) => {
                self.state = ExecutorState::RolledBack;
                error!(exception = %fault.exception, "apply raised on the backend");
                Err(EngineError::RemoteFault(fault))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use storage_contracts::RemoteResult;
    use storage_testing::{ScriptedBackend, fixtures::DiskBuilder};
    use storage_types::{ActionId, ActionKind, Size};

    use super::*;

    async fn setup(backend: &ScriptedBackend) -> (BackendClient, ActionQueue, DeviceModel) {
        backend.set_devices(DiskBuilder::msdos("sda", Size::from_gib(4)).build());
        let client = backend.connect().await.expect("connect");
        let mut queue = ActionQueue::new();
        queue
            .append(
                ActionKind::Add,
                "add 1 GiB ext4 partition",
                vec![ActionId::new("a1")],
                vec![],
            )
            .expect("append");
        (client, queue, DeviceModel::new())
    }

    #[tokio::test]
    async fn commit_clears_queue_and_refreshes_once() {
        let backend = ScriptedBackend::new();
        backend.apply_progress(["creating sda1", "formatting sda1"]);
        let (client, mut queue, mut model) = setup(&backend).await;
        let mut executor = Executor::new(1);

        let mut seen = Vec::new();
        let outcome = executor
            .apply(&client, &mut queue, &mut model, |m| seen.push(m.to_string()))
            .await
            .expect("apply");

        assert!(matches!(outcome, ApplyOutcome::Committed { ref applied } if applied.len() == 1));
        assert_eq!(seen, vec!["creating sda1", "formatting sda1"]);
        assert!(queue.is_empty());
        assert_eq!(model.refresh_count(), 1);
        assert_eq!(executor.state(), ExecutorState::Committed);
    }

    #[tokio::test]
    async fn fault_keeps_queue_without_refresh() {
        let backend = ScriptedBackend::new();
        backend.apply_result(RemoteResult::fault("PartedException", "Traceback (most recent call last)"));
        let (client, mut queue, mut model) = setup(&backend).await;
        let mut executor = Executor::new(4);

        let err = executor
            .apply(&client, &mut queue, &mut model, |_| {})
            .await
            .expect_err("fault");

        match err {
            EngineError::RemoteFault(fault) => {
                assert_eq!(fault.exception, "PartedException");
                assert_eq!(fault.traceback, "Traceback (most recent call last)");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(queue.len(), 1);
        assert_eq!(model.refresh_count(), 0);
        assert!(backend.calls_to("reset-all").is_empty());
        assert_eq!(executor.state(), ExecutorState::RolledBack);
    }

    #[tokio::test]
    async fn empty_queue_is_not_applied() {
        let backend = ScriptedBackend::new();
        let client = backend.connect().await.expect("connect");
        let mut executor = Executor::new(4);

        let err = executor
            .apply(&client, &mut ActionQueue::new(), &mut DeviceModel::new(), |_| {})
            .await
            .expect_err("nothing to apply");
        assert_eq!(err, EngineError::Executor(ExecutorError::NothingToApply));
        assert_eq!(backend.apply_count(), 0);
    }
}
