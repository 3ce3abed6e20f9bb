// SPDX-License-Identifier: GPL-3.0-only

//! zbus transport to the privileged planner backend

use async_trait::async_trait;
use futures_util::{FutureExt, Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;
use zbus::proxy;

use super::connection::{BusKind, shared_connection};
use super::error::ClientError;
use super::transport::BackendTransport;
use crate::protocol::{RemoteResult, SessionSecret};

/// D-Bus proxy interface of the planner backend
#[proxy(
    interface = "org.storage.Planner.Backend",
    default_service = "org.storage.Planner.Backend",
    default_path = "/org/storage/Planner/Backend"
)]
pub trait PlannerBackend {
    /// Present the session secret
    async fn authenticate(&self, secret: &str) -> zbus::Result<bool>;

    /// Request/response call, returns a JSON-encoded RemoteResult
    #[zbus(name = "Call")]
    async fn call_method(&self, method: &str, args_json: &str) -> zbus::Result<String>;

    /// Apply every scheduled action, returns a JSON-encoded RemoteResult
    async fn apply_all(&self) -> zbus::Result<String>;

    /// Status text emitted while ApplyAll runs
    #[zbus(signal)]
    async fn apply_progress(&self, message: &str) -> zbus::Result<()>;
}

/// Transport over D-Bus
pub struct DbusTransport {
    proxy: PlannerBackendProxy<'static>,
}

impl DbusTransport {
    /// Create a transport on the bus named by `STORAGE_PLANNER_BUS`
    pub async fn new() -> Result<Self, ClientError> {
        Self::on_bus(BusKind::from_env()).await
    }

    /// Create a transport bound to the shared connection of `bus`
    pub async fn on_bus(bus: BusKind) -> Result<Self, ClientError> {
        let conn = shared_connection(bus).await?;

        let proxy = PlannerBackendProxy::new(conn).await.map_err(|e| {
            ClientError::Connection(format!("Failed to create planner backend proxy: {}", e))
        })?;

        Ok(Self { proxy })
    }

    /// Get the underlying proxy for signal subscriptions
    pub fn proxy(&self) -> &PlannerBackendProxy<'static> {
        &self.proxy
    }
}

fn parse_result(json: &str) -> Result<RemoteResult, ClientError> {
    serde_json::from_str(json)
        .map_err(|e| ClientError::ParseError(format!("Failed to parse backend reply: {}", e)))
}

#[async_trait]
impl BackendTransport for DbusTransport {
    async fn authenticate(&self, secret: &SessionSecret) -> Result<bool, ClientError> {
        Ok(self.proxy.authenticate(secret.expose()).await?)
    }

    async fn call(&self, method: &str, args: Value) -> Result<RemoteResult, ClientError> {
        let args_json = serde_json::to_string(&args)?;
        let reply = self.proxy.call_method(method, &args_json).await?;
        parse_result(&reply)
    }

    async fn apply_all(
        &self,
        progress: mpsc::Sender<String>,
    ) -> Result<RemoteResult, ClientError> {
        // Subscribe before the call so no early status is missed
        let updates = self.proxy.receive_apply_progress().await?;
        let messages = updates.filter_map(|signal| async move {
            match signal.args() {
                Ok(args) => Some(args.message.to_string()),
                Err(e) => {
                    warn!("malformed apply progress signal: {}", e);
                    None
                }
            }
        });
        tokio::pin!(messages);

        let apply = self.proxy.apply_all();
        tokio::pin!(apply);

        let reply = loop {
            tokio::select! {
                biased;
                Some(message) = messages.next() => forward(&progress, message).await,
                reply = &mut apply => break reply?,
            }
        };

        // Signals delivered before the reply but not yet polled
        forward_ready(&mut messages, &progress).await;

        parse_result(&reply)
    }
}

async fn forward(progress: &mpsc::Sender<String>, message: String) {
    if progress.send(message).await.is_err() {
        warn!("apply progress receiver dropped");
    }
}

/// Forward every message the stream can yield without waiting
async fn forward_ready<S>(messages: &mut S, progress: &mpsc::Sender<String>) -> usize
where
    S: Stream<Item = String> + Unpin,
{
    let mut forwarded = 0;
    while let Some(Some(message)) = messages.next().now_or_never() {
        forward(progress, message).await;
        forwarded += 1;
    }
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_result_reports_bad_json() {
        let err = parse_result("not json").unwrap_err();
        assert!(matches!(err, ClientError::ParseError(_)));
    }

    #[test]
    fn parse_result_reads_envelope() {
        let result = parse_result(r#"{"success": false, "message": "busy"}"#).expect("parse");
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("busy"));
    }

    #[tokio::test]
    async fn queued_progress_is_forwarded_after_reply() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut messages = futures_util::stream::iter(["Committing", "Done"])
            .map(String::from)
            .chain(futures_util::stream::pending());

        assert_eq!(forward_ready(&mut messages, &tx).await, 2);
        drop(tx);

        let mut received = Vec::new();
        while let Some(message) = rx.recv().await {
            received.push(message);
        }
        assert_eq!(received, vec!["Committing", "Done"]);
    }
}
