// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use thiserror::Error;

use storage_contracts::{ClientError, RemoteFault};
use storage_types::DeviceId;

/// Device graph construction and lookup errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("device {0} not found")]
    NotFound(DeviceId),

    #[error("device {0} listed more than once")]
    DuplicateDevice(DeviceId),

    #[error("device {device} refers to unknown parent {parent}")]
    DanglingParent { device: DeviceId, parent: DeviceId },

    #[error("disk {0} must not have parents")]
    DiskWithParents(DeviceId),

    #[error("device {0} has no parents")]
    MissingParents(DeviceId),

    #[error("parent references of {0} form a cycle")]
    Cycle(DeviceId),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("no actions to undo")]
    EmptyQueue,

    #[error("backend action {0} is already queued")]
    DuplicateActionId(storage_types::ActionId),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("there are no pending actions to apply")]
    NothingToApply,

    #[error("an apply is already running")]
    AlreadyRunning,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("invalid config {path:?}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Errors surfaced by the planning session
///
/// Validation rejections and backend refusals are not errors; they come back
/// as operation outcomes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Backend raised an exception; exception and traceback are verbatim
    #[error("backend fault: {}", .0.exception)]
    RemoteFault(RemoteFault),

    /// The backend answered a query it must always serve with a refusal
    #[error("backend refused {method}: {message}")]
    QueryRefused {
        method: &'static str,
        message: String,
    },

    /// Another planner instance already owns the backend
    #[error("storage planner is already running")]
    AlreadyRunning,

    /// The backend failed to drop actions the local queue already dropped
    #[error("pending actions diverged from the backend: {0}")]
    Diverged(String),

    /// Connectivity was lost earlier; backend state is unknown
    #[error("planning session terminated after losing the backend")]
    Terminated,

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("malformed backend payload for {method}: {reason}")]
    Payload {
        method: &'static str,
        reason: String,
    },
}

impl EngineError {
    /// Errors after which the session can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Terminated | Self::Diverged(_) => true,
            Self::Client(err) => err.is_connectivity_loss(),
            _ => false,
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
