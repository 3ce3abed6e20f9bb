// SPDX-License-Identifier: GPL-3.0-only

//! Ordered list of accepted actions
//!
//! Entries are only ever appended at the tail and removed from the tail, so
//! the backend can always undo the most recent unit of work.

use chrono::Utc;
use tracing::{debug, error, info};

use storage_contracts::{BackendClient, RemoteFailure, RemoteMethod};
use storage_types::{ActionId, ActionKind, DeviceId, PendingAction};

use crate::error::{EngineError, QueueError, Result};

#[derive(Debug, Default)]
pub struct ActionQueue {
    entries: Vec<PendingAction>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an accepted action behind everything already queued
    pub fn append(
        &mut self,
        kind: ActionKind,
        description: impl Into<String>,
        backend_action_ids: Vec<ActionId>,
        result_devices: Vec<DeviceId>,
    ) -> Result<&PendingAction, QueueError> {
        if let Some(duplicate) = backend_action_ids
            .iter()
            .find(|id| self.entries.iter().any(|e| e.backend_action_ids.contains(id)))
        {
            return Err(QueueError::DuplicateActionId(duplicate.clone()));
        }

        let sequence = self.entries.last().map_or(1, |last| last.sequence + 1);
        let action = PendingAction {
            sequence,
            kind,
            description: description.into(),
            backend_action_ids,
            result_devices,
            scheduled_at: Utc::now(),
        };

        info!(sequence, kind = kind.as_str(), description = %action.description, "action queued");
        self.entries.push(action);

        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Drop the most recent action and cancel it on the backend
    ///
    /// The entry stays removed even when the cancel fails; that failure is
    /// fatal for the session.
    pub async fn undo(&mut self, client: &BackendClient) -> Result<PendingAction> {
        let action = self.entries.pop().ok_or(QueueError::EmptyQueue)?;
        debug!(sequence = action.sequence, ids = ?action.backend_action_ids, "cancelling action");

        let result = client
            .call(&RemoteMethod::CancelActions {
                ids: action.backend_action_ids.clone(),
            })
            .await?;

        match result.into_outcome() {
            Ok(_) => {
                info!(sequence = action.sequence, description = %action.description, "action undone");
                Ok(action)
            }
            Err(failure) => {
                let reason = describe(&failure);
                error!(sequence = action.sequence, %reason, "backend failed to cancel action");
                Err(EngineError::Diverged(reason))
            }
        }
    }

    /// Reset every scheduled action on the backend, then empty the queue
    pub async fn clear(&mut self, client: &BackendClient) -> Result<()> {
        let outcome = client.call(&RemoteMethod::ResetAll).await;
        let dropped = self.entries.len();
        self.entries.clear();

        match outcome?.into_outcome() {
            Ok(_) => {
                info!(dropped, "action queue cleared");
                Ok(())
            }
            Err(failure) => {
                let reason = describe(&failure);
                error!(%reason, "backend failed to reset pending actions");
                Err(EngineError::Diverged(reason))
            }
        }
    }

    /// Forget all entries without telling the backend
    pub(crate) fn drain(&mut self) -> Vec<PendingAction> {
        std::mem::take(&mut self.entries)
    }

    /// Entries in sequence order
    pub fn list(&self) -> &[PendingAction] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&PendingAction> {
        self.entries.last()
    }

    /// Every backend id, in queue order
    pub fn action_ids(&self) -> Vec<ActionId> {
        self.entries
            .iter()
            .flat_map(|e| e.backend_action_ids.iter().cloned())
            .collect()
    }
}

fn describe(failure: &RemoteFailure) -> String {
    match failure {
        RemoteFailure::Refused(message) => message.clone(),
        RemoteFailure::Fault(fault) => fault.exception.clone(),
    }
}
