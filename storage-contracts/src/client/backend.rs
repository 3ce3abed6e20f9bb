// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use super::error::ClientError;
use super::transport::BackendTransport;
use crate::protocol::{APPLY_ALL, RemoteMethod, RemoteResult, SessionSecret};

struct Inner {
    transport: Arc<dyn BackendTransport>,
    /// Held for the whole duration of a call, one call in flight at a time
    call_lock: Mutex<()>,
}

/// Authenticated, serialized connection to the privileged backend
///
/// Cloning is cheap and every clone shares the same call lock.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient").finish_non_exhaustive()
    }
}

impl BackendClient {
    /// Run the handshake once and return a client ready for calls
    pub async fn connect(
        transport: Arc<dyn BackendTransport>,
        secret: SessionSecret,
    ) -> Result<Self, ClientError> {
        if secret.is_empty() {
            warn!("refusing to contact backend without a session secret");
            return Err(ClientError::MissingSecret);
        }

        if !transport.authenticate(&secret).await? {
            warn!("backend rejected the session secret");
            return Err(ClientError::AuthenticationRejected);
        }

        info!("authenticated to planner backend");

        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                call_lock: Mutex::new(()),
            }),
        })
    }

    /// Synchronous request/response call
    pub async fn call(&self, method: &RemoteMethod) -> Result<RemoteResult, ClientError> {
        let args = method.arguments()?;
        let _guard = self.inner.call_lock.lock().await;

        debug!(method = method.name(), "backend call");
        let result = self.inner.transport.call(method.name(), args).await?;
        debug!(
            method = method.name(),
            success = result.success,
            actions = result.actions.len(),
            "backend reply"
        );

        Ok(result)
    }

    /// Long-running apply of the whole backend transaction
    ///
    /// Status text is forwarded to `progress` while the call runs. A reply
    /// with `success == false` means the backend already reset its own
    /// scheduled actions.
    pub async fn apply_all(
        &self,
        progress: mpsc::Sender<String>,
    ) -> Result<RemoteResult, ClientError> {
        let _guard = self.inner.call_lock.lock().await;

        info!(method = APPLY_ALL, "starting backend apply");
        let result = self.inner.transport.apply_all(progress).await?;
        info!(method = APPLY_ALL, success = result.success, "backend apply finished");

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;

    struct SlowTransport {
        accept: bool,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl SlowTransport {
        fn new(accept: bool) -> Self {
            Self {
                accept,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BackendTransport for SlowTransport {
        async fn authenticate(&self, _secret: &SessionSecret) -> Result<bool, ClientError> {
            Ok(self.accept)
        }

        async fn call(&self, _method: &str, _args: Value) -> Result<RemoteResult, ClientError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(RemoteResult::ok())
        }

        async fn apply_all(
            &self,
            progress: mpsc::Sender<String>,
        ) -> Result<RemoteResult, ClientError> {
            let _ = progress.send("working".to_string()).await;
            Ok(RemoteResult::ok())
        }
    }

    #[tokio::test]
    async fn missing_secret_fails_before_handshake() {
        let err = BackendClient::connect(Arc::new(SlowTransport::new(true)), SessionSecret::new(""))
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::MissingSecret);
    }

    #[tokio::test]
    async fn rejected_secret_fails_connect() {
        let err = BackendClient::connect(
            Arc::new(SlowTransport::new(false)),
            SessionSecret::new("wrong"),
        )
        .await
        .unwrap_err();
        assert_eq!(err, ClientError::AuthenticationRejected);
    }

    #[tokio::test]
    async fn calls_are_serialized() {
        let transport = Arc::new(SlowTransport::new(true));
        let client = BackendClient::connect(transport.clone(), SessionSecret::new("s"))
            .await
            .expect("connect");

        let mut handles = Vec::new();
        for _ in 0..4 {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                client.call(&RemoteMethod::GetDisks).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("call");
        }

        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn apply_forwards_progress() {
        let client = BackendClient::connect(Arc::new(SlowTransport::new(true)), SessionSecret::new("s"))
            .await
            .expect("connect");
        let (tx, mut rx) = mpsc::channel(4);

        let result = client.apply_all(tx).await.expect("apply");

        assert!(result.success);
        assert_eq!(rx.recv().await.as_deref(), Some("working"));
    }
}
