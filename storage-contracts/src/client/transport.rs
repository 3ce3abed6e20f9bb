// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::error::ClientError;
use crate::protocol::{RemoteResult, SessionSecret};

/// Channel to the privileged backend
///
/// Implementations only move requests and replies. Serialization of calls
/// and the handshake policy live in [`BackendClient`](super::BackendClient).
#[async_trait]
pub trait BackendTransport: Send + Sync {
    /// Present the session secret; `Ok(false)` means it was rejected
    async fn authenticate(&self, secret: &SessionSecret) -> Result<bool, ClientError>;

    /// One request/response call
    async fn call(&self, method: &str, args: Value) -> Result<RemoteResult, ClientError>;

    /// Execute every scheduled action, reporting status text as it goes
    async fn apply_all(&self, progress: mpsc::Sender<String>)
    -> Result<RemoteResult, ClientError>;
}
