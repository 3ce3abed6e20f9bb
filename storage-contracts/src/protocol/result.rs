// SPDX-License-Identifier: GPL-3.0-only

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use storage_types::ActionId;

/// Envelope returned by every backend call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteResult {
    pub success: bool,
    /// User-facing reason of a non-exceptional failure
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub exception: Option<String>,
    #[serde(default)]
    pub traceback: Option<String>,
    /// Actions scheduled by a successful scheduling call
    #[serde(default)]
    pub actions: Vec<ActionId>,
    /// Payload of query calls
    #[serde(default)]
    pub value: Option<Value>,
}

/// Backend-side exception, carried verbatim
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{exception}")]
pub struct RemoteFault {
    pub exception: String,
    pub traceback: String,
}

/// Why a [`RemoteResult`] did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteFailure {
    /// Expected failure with a message for the user
    #[error("{0}")]
    Refused(String),

    /// Unexpected backend failure
    #[error("remote fault: {0}")]
    Fault(RemoteFault),
}

impl RemoteResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
            exception: None,
            traceback: None,
            actions: Vec::new(),
            value: None,
        }
    }

    pub fn with_value(value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::ok()
        }
    }

    pub fn scheduled(actions: Vec<ActionId>) -> Self {
        Self {
            actions,
            ..Self::ok()
        }
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::ok()
        }
    }

    pub fn fault(exception: impl Into<String>, traceback: impl Into<String>) -> Self {
        Self {
            success: false,
            exception: Some(exception.into()),
            traceback: Some(traceback.into()),
            ..Self::ok()
        }
    }

    /// Split into success or one of the two failure classes
    ///
    /// An exception always wins over a message. A failure with neither is
    /// reported as a refusal with a generic message.
    pub fn into_outcome(self) -> Result<RemoteResult, RemoteFailure> {
        if self.success {
            return Ok(self);
        }

        if let Some(exception) = self.exception {
            return Err(RemoteFailure::Fault(RemoteFault {
                exception,
                traceback: self.traceback.unwrap_or_default(),
            }));
        }

        Err(RemoteFailure::Refused(
            self.message
                .unwrap_or_else(|| "Operation failed".to_string()),
        ))
    }

    /// Decode the query payload
    pub fn decode_value<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(self.value.clone().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_is_classified_as_fault() {
        let result = RemoteResult::fault("BlivetError: boom", "Traceback ...");
        match result.into_outcome() {
            Err(RemoteFailure::Fault(fault)) => {
                assert_eq!(fault.exception, "BlivetError: boom");
                assert_eq!(fault.traceback, "Traceback ...");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn message_without_exception_is_refusal() {
        let outcome = RemoteResult::refused("Device is busy").into_outcome();
        assert_eq!(
            outcome,
            Err(RemoteFailure::Refused("Device is busy".to_string()))
        );
    }

    #[test]
    fn missing_fields_default_when_parsing() {
        let parsed: RemoteResult =
            serde_json::from_str(r#"{"success": true, "actions": ["7"]}"#).expect("parse");
        assert!(parsed.success);
        assert_eq!(parsed.actions, vec![ActionId::new("7")]);
        assert_eq!(parsed.value, None);
    }

    #[test]
    fn decode_value_reads_payload() {
        let result = RemoteResult::with_value(serde_json::json!(["ext4", "xfs"]));
        let filesystems: Vec<String> = result.decode_value().expect("decode");
        assert_eq!(filesystems, vec!["ext4", "xfs"]);
    }
}
