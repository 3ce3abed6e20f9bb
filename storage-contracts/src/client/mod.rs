// SPDX-License-Identifier: GPL-3.0-only

//! Backend client and its transports

pub mod backend;
pub mod connection;
pub mod dbus;
pub mod error;
pub mod transport;

pub use backend::BackendClient;
pub use connection::BusKind;
pub use dbus::{DbusTransport, PlannerBackendProxy};
pub use error::ClientError;
pub use transport::BackendTransport;
