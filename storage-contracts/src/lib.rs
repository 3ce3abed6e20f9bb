// SPDX-License-Identifier: GPL-3.0-only

//! Request/response contract with the privileged planner backend

pub mod client;
pub mod protocol;

pub use client::{BackendClient, BackendTransport, BusKind, ClientError, DbusTransport};
pub use protocol::{
    APPLY_ALL, RemoteFailure, RemoteFault, RemoteMethod, RemoteResult, SessionSecret,
};
