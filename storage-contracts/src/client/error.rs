// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

/// Errors raised before a [`RemoteResult`](crate::RemoteResult) is obtained
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("D-Bus connection error: {0}")]
    Connection(String),

    #[error("D-Bus method call error: {0}")]
    MethodCall(String),

    #[error("Backend not available (is the planner backend running?)")]
    ServiceNotAvailable,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("No session secret available, backend calls are not possible")]
    MissingSecret,

    #[error("Backend rejected the session secret")]
    AuthenticationRejected,
}

impl ClientError {
    /// The backend state is unknown after this error
    pub fn is_connectivity_loss(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::MethodCall(_) | Self::ServiceNotAvailable
        )
    }
}

/// Error name prefix of failures raised by the planner backend itself
const BACKEND_ERROR_PREFIX: &str = "org.storage.Planner.Backend.Error.";

impl From<zbus::fdo::Error> for ClientError {
    fn from(err: zbus::fdo::Error) -> Self {
        use zbus::fdo::Error as Fdo;

        match err {
            Fdo::AccessDenied(msg) | Fdo::AuthFailed(msg) => ClientError::PermissionDenied(msg),
            Fdo::ServiceUnknown(_) | Fdo::NameHasNoOwner(_) => ClientError::ServiceNotAvailable,
            Fdo::InvalidArgs(msg) | Fdo::InvalidSignature(msg) => ClientError::InvalidArgument(msg),
            Fdo::NoReply(msg) | Fdo::Timeout(msg) | Fdo::Disconnected(msg) => {
                ClientError::Connection(msg)
            }
            other => ClientError::MethodCall(other.to_string()),
        }
    }
}

impl From<zbus::Error> for ClientError {
    fn from(err: zbus::Error) -> Self {
        match err {
            zbus::Error::FDO(fdo) => (*fdo).into(),
            zbus::Error::MethodError(name, detail, _) => {
                let detail = detail.unwrap_or_default();
                match name.as_str().strip_prefix(BACKEND_ERROR_PREFIX) {
                    Some("NotAuthenticated") => ClientError::AuthenticationRejected,
                    Some("InvalidArguments") => ClientError::InvalidArgument(detail),
                    _ => ClientError::MethodCall(format!("{name}: {detail}")),
                }
            }
            other => ClientError::Connection(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::ParseError(err.to_string())
    }
}
