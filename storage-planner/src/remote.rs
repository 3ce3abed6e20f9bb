// SPDX-License-Identifier: GPL-3.0-only

//! Query helpers over the backend client

use serde::de::DeserializeOwned;
use tracing::{error, warn};

use storage_contracts::{BackendClient, RemoteFailure, RemoteMethod};

use crate::error::{EngineError, Result};

/// Call a query method and decode its payload
///
/// Queries have no user-facing failure mode, so a refusal is an error here.
pub(crate) async fn query<T: DeserializeOwned>(
    client: &BackendClient,
    method: RemoteMethod,
) -> Result<T> {
    let name = method.name();
    let result = client.call(&method).await?;

    match result.into_outcome() {
        Ok(result) => result.decode_value().map_err(|e| EngineError::Payload {
            method: name,
            reason: e.to_string(),
        }),
        Err(RemoteFailure::Fault(fault)) => {
            error!(method = name, exception = %fault.exception, "backend fault");
            Err(EngineError::RemoteFault(fault))
        }
        Err(RemoteFailure::Refused(message)) => {
            warn!(method = name, %message, "backend refused query");
            Err(EngineError::QueryRefused {
                method: name,
                message,
            })
        }
    }
}
