// SPDX-License-Identifier: GPL-3.0-only

//! Bus selection for the planner backend
//!
//! The backend normally lives on the system bus. Setting
//! `STORAGE_PLANNER_BUS=session` targets a backend started on the session bus
//! instead, which is how an unprivileged development backend is reached.

use std::sync::OnceLock;

use zbus::Connection;

use super::error::ClientError;

/// Environment variable selecting the bus
pub const BUS_ENV: &str = "STORAGE_PLANNER_BUS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    System,
    Session,
}

impl BusKind {
    /// `session` selects the session bus, anything else the system bus
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "session" | "user" => Self::Session,
            _ => Self::System,
        }
    }

    pub fn from_env() -> Self {
        std::env::var(BUS_ENV)
            .map(|value| Self::parse(&value))
            .unwrap_or(Self::System)
    }

    fn cell(self) -> &'static OnceLock<Connection> {
        static SYSTEM: OnceLock<Connection> = OnceLock::new();
        static SESSION: OnceLock<Connection> = OnceLock::new();
        match self {
            Self::System => &SYSTEM,
            Self::Session => &SESSION,
        }
    }
}

/// Connection to `bus`, opened on first use and reused afterwards
pub async fn shared_connection(bus: BusKind) -> Result<&'static Connection, ClientError> {
    let cell = bus.cell();
    if let Some(conn) = cell.get() {
        return Ok(conn);
    }

    let opened = match bus {
        BusKind::System => Connection::system().await,
        BusKind::Session => Connection::session().await,
    };
    let conn = opened
        .map_err(|e| ClientError::Connection(format!("Failed to connect to {bus:?} bus: {e}")))?;

    // A concurrent caller may have stored its connection first
    let _ = cell.set(conn);

    cell.get().ok_or_else(|| {
        ClientError::Connection(format!("Failed to initialize shared {bus:?} bus connection"))
    })
}
